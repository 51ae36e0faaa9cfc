use nalgebra as na;
use num_traits::Float;

pub fn gauss<F: Float>(x: F, c: F) -> F {
    let two = F::one() + F::one();

    (-((x * x) / (two * c * c))).exp()
}

/// Similarity transform moving the centroid to the origin with a mean
/// distance of sqrt(2) (Hartley normalization).
pub fn normalize_points(pts: &[na::Point2<f64>]) -> (na::Matrix3<f64>, Vec<na::Point2<f64>>) {
    let n = pts.len() as f64;
    let centroid = pts
        .iter()
        .fold(na::Vector2::zeros(), |acc: na::Vector2<f64>, p| acc + p.coords)
        / n;

    let mean_dist = pts
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = na::Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );

    let normalized = pts
        .iter()
        .map(|p| na::Point2::from((p.coords - centroid) * s))
        .collect();

    (t, normalized)
}

/// Circular distance between two OpenCV hues (0..180).
pub fn hue_distance(a: u8, b: u8) -> u8 {
    let d = (a as i16 - b as i16).unsigned_abs() as u8;

    d.min(180u8.saturating_sub(d))
}
