//! Image-to-pitch projective mapping.
//!
//! The homography is estimated with the normalized Direct Linear Transform
//! over all correspondences (least squares for more than four points).

use nalgebra as na;
use ndarray::{Array2, ArrayView2};
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
};

use crate::error::Error;
use crate::math::normalize_points;

const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewTransformer {
    m: Option<na::Matrix3<f64>>,
}

impl ViewTransformer {
    pub fn new() -> Self {
        Self { m: None }
    }

    /// Build a transformer straight from point correspondences.
    pub fn from_points(source: ArrayView2<'_, f32>, target: ArrayView2<'_, f32>) -> Result<Self, Error> {
        let mut vt = Self::new();
        vt.compute(source, target)?;

        Ok(vt)
    }

    #[inline]
    pub fn is_computed(&self) -> bool {
        self.m.is_some()
    }

    #[inline]
    pub fn matrix(&self) -> Option<&na::Matrix3<f64>> {
        self.m.as_ref()
    }

    /// Estimates the mapping `source -> target`. On failure the previously
    /// stored matrix (if any) is left untouched.
    pub fn compute(&mut self, source: ArrayView2<'_, f32>, target: ArrayView2<'_, f32>) -> Result<(), Error> {
        if source.dim() != target.dim() {
            return Err(Error::ShapeMismatch(source.dim(), target.dim()));
        }

        if source.ncols() != 2 {
            return Err(Error::NotPlanar(source.ncols()));
        }

        if source.nrows() < MIN_CORRESPONDENCES {
            return Err(Error::TooFewPoints(source.nrows()));
        }

        let src: Vec<_> = source
            .outer_iter()
            .map(|r| na::Point2::new(r[0] as f64, r[1] as f64))
            .collect();

        let dst: Vec<_> = target
            .outer_iter()
            .map(|r| na::Point2::new(r[0] as f64, r[1] as f64))
            .collect();

        self.m = Some(estimate_homography(&src, &dst)?);

        Ok(())
    }

    /// Maps a batch of `(n, 2)` image points into pitch space.
    pub fn transform_points(&self, points: ArrayView2<'_, f32>) -> Result<Array2<f32>, Error> {
        if points.is_empty() {
            return Ok(Array2::zeros((0, 2)));
        }

        let m = self.m.as_ref().ok_or(Error::NotCalibrated)?;

        if points.ncols() != 2 {
            return Err(Error::NotPlanar(points.ncols()));
        }

        let mut out = Array2::zeros((points.nrows(), 2));
        for (src, mut dst) in points.outer_iter().zip(out.outer_iter_mut()) {
            let p = project(m, na::Point2::new(src[0] as f64, src[1] as f64));

            dst[0] = p.x as f32;
            dst[1] = p.y as f32;
        }

        Ok(out)
    }

    pub fn transform_point(&self, p: na::Point2<f32>) -> Result<na::Point2<f32>, Error> {
        let m = self.m.as_ref().ok_or(Error::NotCalibrated)?;
        let p = project(m, na::Point2::new(p.x as f64, p.y as f64));

        Ok(na::Point2::new(p.x as f32, p.y as f32))
    }

    /// Perspective warp of a whole image, for visualization only.
    pub fn transform_image(&self, image: &Mat, size: (i32, i32)) -> Result<Mat, Error> {
        let m = self.m.as_ref().ok_or(Error::NotCalibrated)?;

        let rows = [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ];
        let h = Mat::from_slice_2d(&rows)?;

        let mut out = Mat::default();
        imgproc::warp_perspective(
            image,
            &mut out,
            &h,
            Size::new(size.0, size.1),
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            core::Scalar::default(),
        )?;

        Ok(out)
    }
}

#[inline]
fn project(m: &na::Matrix3<f64>, p: na::Point2<f64>) -> na::Point2<f64> {
    let v = m * na::Vector3::new(p.x, p.y, 1.0);

    if v.z.abs() < 1e-15 {
        return na::Point2::new(f64::NAN, f64::NAN);
    }

    na::Point2::new(v.x / v.z, v.y / v.z)
}

fn estimate_homography(src: &[na::Point2<f64>], dst: &[na::Point2<f64>]) -> Result<na::Matrix3<f64>, Error> {
    let n = src.len();

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = na::DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i].x, src_n[i].y);
        let (dx, dy) = (dst_n[i].x, dst_n[i].y);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of the smallest eigenvalue of AᵀA
    let eig = na::SymmetricEigen::new(a.transpose() * &a);

    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[i]
            .abs()
            .partial_cmp(&eig.eigenvalues[j].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // a second (near) null direction means the points do not pin down h
    let largest = eig.eigenvalues[order[8]].abs().max(f64::EPSILON);
    if eig.eigenvalues[order[1]].abs() / largest < 1e-10 {
        return Err(Error::DegenerateGeometry);
    }

    let h = eig.eigenvectors.column(order[0]);
    let h_norm = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse().ok_or(Error::DegenerateGeometry)?;
    let m = t_dst_inv * h_norm * t_src;

    let scale = m[(2, 2)];
    let m = if scale.abs() > 1e-15 { m / scale } else { m };

    if !m.iter().all(|x| x.is_finite()) || m.determinant().abs() < 1e-12 {
        return Err(Error::DegenerateGeometry);
    }

    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn approx_eq(a: &Array2<f32>, b: &Array2<f32>, tol: f32) -> bool {
        a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn reproduces_targets() {
        let source = array![
            [100.0f32, 500.0],
            [1180.0, 520.0],
            [900.0, 180.0],
            [350.0, 170.0],
            [640.0, 300.0],
        ];
        let target = array![
            [0.0f32, 6800.0],
            [10500.0, 6800.0],
            [10500.0, 0.0],
            [0.0, 0.0],
            [5250.0, 3400.0],
        ];

        // fifth target is not on the exact homography of the first four, so
        // only check the four-point case for exactness
        let vt = ViewTransformer::from_points(
            source.slice(ndarray::s![0..4, ..]),
            target.slice(ndarray::s![0..4, ..]),
        )
        .unwrap();
        let mapped = vt
            .transform_points(source.slice(ndarray::s![0..4, ..]))
            .unwrap();
        assert!(approx_eq(&mapped, &target.slice(ndarray::s![0..4, ..]).to_owned(), 0.5));
    }

    #[test]
    fn least_squares_on_consistent_points() {
        // target = affine(source), so every correspondence is exact
        let source = array![
            [10.0f32, 10.0],
            [200.0, 15.0],
            [210.0, 190.0],
            [5.0, 180.0],
            [100.0, 100.0],
            [150.0, 60.0],
        ];
        let target = source.mapv(|v| v * 2.0 + 7.0);

        let vt = ViewTransformer::from_points(source.view(), target.view()).unwrap();
        let mapped = vt.transform_points(source.view()).unwrap();

        assert!(approx_eq(&mapped, &target, 1e-2));
    }

    #[test]
    fn rejects_three_points() {
        let pts = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]];

        let err = ViewTransformer::from_points(pts.view(), pts.view()).unwrap_err();
        assert!(matches!(err, Error::TooFewPoints(3)));
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let a = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let b = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]];

        assert!(matches!(
            ViewTransformer::from_points(a.view(), b.view()),
            Err(Error::ShapeMismatch(..))
        ));
    }

    #[test]
    fn rejects_non_planar_points() {
        let a = Array2::<f32>::zeros((5, 3));

        assert!(matches!(
            ViewTransformer::from_points(a.view(), a.view()),
            Err(Error::NotPlanar(3))
        ));
    }

    #[test]
    fn rejects_collinear_points() {
        let a = array![[0.0f32, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];

        assert!(matches!(
            ViewTransformer::from_points(a.view(), a.view()),
            Err(Error::DegenerateGeometry)
        ));
    }

    #[test]
    fn empty_batch_maps_to_empty() {
        let vt = ViewTransformer::new();
        let out = vt.transform_points(Array2::<f32>::zeros((0, 2)).view()).unwrap();

        assert_eq!(out.dim(), (0, 2));
    }

    #[test]
    fn transform_before_compute_fails() {
        let vt = ViewTransformer::new();
        let pts = array![[1.0f32, 2.0]];

        assert!(matches!(vt.transform_points(pts.view()), Err(Error::NotCalibrated)));
        assert!(matches!(
            vt.transform_point(na::Point2::new(1.0, 2.0)),
            Err(Error::NotCalibrated)
        ));
    }

    #[test]
    fn failed_compute_keeps_previous_matrix() {
        let square = array![[0.0f32, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let mut vt = ViewTransformer::from_points(square.view(), square.view()).unwrap();
        let before = vt.clone();

        let few = array![[0.0f32, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert!(vt.compute(few.view(), few.view()).is_err());
        assert_eq!(vt, before);
    }

    #[test]
    fn warps_image_by_translation() {
        let source = array![[0.0f32, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let target = array![[5.0f32, 3.0], [15.0, 3.0], [15.0, 13.0], [5.0, 13.0]];
        let vt = ViewTransformer::from_points(source.view(), target.view()).unwrap();

        let mut img = Mat::new_rows_cols_with_default(20, 20, core::CV_8UC1, core::Scalar::all(0.0)).unwrap();
        *img.at_2d_mut::<u8>(2, 2).unwrap() = 255;

        let out = vt.transform_image(&img, (24, 16)).unwrap();
        assert_eq!((out.cols(), out.rows()), (24, 16));

        // (x 2, y 2) lands on (x 7, y 5)
        assert!(*out.at_2d::<u8>(5, 7).unwrap() > 200);
        assert_eq!(*out.at_2d::<u8>(2, 2).unwrap(), 0);
    }

    #[test]
    fn image_warp_needs_calibration() {
        let img = Mat::new_rows_cols_with_default(4, 4, core::CV_8UC1, core::Scalar::all(0.0)).unwrap();

        assert!(matches!(
            ViewTransformer::new().transform_image(&img, (4, 4)),
            Err(Error::NotCalibrated)
        ));
    }
}
