use nalgebra as na;
use opencv::{
    core::{self, Mat, Point, Scalar, Size},
    imgproc,
    prelude::*,
};

use crate::annotate::put_text;
use crate::color::Color;
use crate::config::RenderConfig;
use crate::detection::EntityClass;
use crate::error::Error;
use crate::history::MovementHistory;
use crate::pitch::PitchConfiguration;

pub const PITCH_GREEN: Color = Color::rgb(34, 139, 34);
pub const PLACEHOLDER_TEXT: &str = "No Keypoints Detected";

const SPOT_RADIUS: i32 = 4;

#[inline]
pub fn canvas_size(pitch: &PitchConfiguration, render: &RenderConfig) -> (i32, i32) {
    (
        (pitch.length * render.scale) as i32 + 2 * render.padding,
        (pitch.width * render.scale) as i32 + 2 * render.padding,
    )
}

/// Pitch centimeters to canvas pixels.
#[inline]
pub fn to_canvas(p: &na::Point2<f32>, render: &RenderConfig) -> Point {
    Point::new(
        (p.x * render.scale) as i32 + render.padding,
        (p.y * render.scale) as i32 + render.padding,
    )
}

/// Empty pitch diagram at canvas resolution.
pub fn draw_pitch(pitch: &PitchConfiguration, render: &RenderConfig) -> Result<Mat, Error> {
    let (w, h) = canvas_size(pitch, render);
    let mut img = Mat::new_rows_cols_with_default(h, w, core::CV_8UC3, PITCH_GREEN.to_scalar())?;

    let white = Color::WHITE.to_scalar();
    let vertices = pitch.vertices();

    for &(a, b) in pitch.edges() {
        imgproc::line(
            &mut img,
            to_canvas(&vertices[a - 1], render),
            to_canvas(&vertices[b - 1], render),
            white,
            render.line_thickness,
            imgproc::LINE_8,
            0,
        )?;
    }

    let half_w = pitch.width / 2.0;
    let centre = to_canvas(&na::Point2::new(pitch.length / 2.0, half_w), render);
    imgproc::circle(
        &mut img,
        centre,
        (pitch.centre_circle_radius * render.scale) as i32,
        white,
        render.line_thickness,
        imgproc::LINE_AA,
        0,
    )?;

    let left_spot = to_canvas(&na::Point2::new(pitch.penalty_spot_distance, half_w), render);
    let right_spot = to_canvas(
        &na::Point2::new(pitch.length - pitch.penalty_spot_distance, half_w),
        render,
    );

    for spot in [left_spot, right_spot] {
        imgproc::circle(&mut img, spot, SPOT_RADIUS, white, -1, imgproc::LINE_AA, 0)?;
    }

    let arc = (pitch.penalty_arc_radius * render.scale) as i32;
    for (spot, start, end) in [(left_spot, -50.0, 50.0), (right_spot, 130.0, 230.0)] {
        imgproc::ellipse(
            &mut img,
            spot,
            Size::new(arc, arc),
            0.0,
            start,
            end,
            white,
            render.line_thickness,
            imgproc::LINE_AA,
            0,
        )?;
    }

    Ok(img)
}

/// One entity to place on the radar, already in pitch space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarEntity {
    pub class: EntityClass,
    pub track_id: Option<u32>,
    pub position: na::Point2<f32>,
    pub color: Color,
}

#[derive(Debug, Clone, Default)]
pub struct RadarRenderer {
    pitch: PitchConfiguration,
    render: RenderConfig,
}

impl RadarRenderer {
    pub fn new(pitch: PitchConfiguration, render: RenderConfig) -> Self {
        Self { pitch, render }
    }

    #[inline]
    pub fn output_size(&self) -> (i32, i32) {
        (self.render.radar_width, self.render.radar_height)
    }

    pub fn render(&self, entities: &[RadarEntity], history: Option<&MovementHistory>) -> Result<Mat, Error> {
        let mut img = draw_pitch(&self.pitch, &self.render)?;

        if let Some(history) = history.filter(|_| self.render.draw_trails) {
            for e in entities {
                if let Some(id) = e.track_id {
                    self.trail(&mut img, history, e.class, id, e.color)?;
                }
            }
        }

        for e in entities {
            if !e.position.x.is_finite() || !e.position.y.is_finite() || !self.pitch.contains(&e.position) {
                continue;
            }

            let radius = match e.class {
                EntityClass::Ball => self.render.ball_radius,
                _ => self.render.marker_radius,
            };

            let center = to_canvas(&e.position, &self.render);
            imgproc::circle(&mut img, center, radius, e.color.to_scalar(), -1, imgproc::LINE_AA, 0)?;
            imgproc::circle(
                &mut img,
                center,
                radius,
                Color::BLACK.to_scalar(),
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }

        let (w, h) = self.output_size();
        let mut out = Mat::default();
        imgproc::resize(&img, &mut out, Size::new(w, h), 0.0, 0.0, imgproc::INTER_LINEAR)?;

        Ok(out)
    }

    fn trail(&self, img: &mut Mat, history: &MovementHistory, class: EntityClass, id: u32, color: Color) -> Result<(), Error> {
        let Some(points) = history.trail(class, id) else {
            return Ok(());
        };

        if points.len() < 2 {
            return Ok(());
        }

        let pts: Vec<_> = points.iter().collect();
        for pair in pts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if !self.pitch.contains(a) || !self.pitch.contains(b) {
                continue;
            }

            imgproc::line(
                img,
                to_canvas(a, &self.render),
                to_canvas(b, &self.render),
                color.to_scalar(),
                2,
                imgproc::LINE_8,
                0,
            )?;
        }

        Ok(())
    }

    /// "No calibration" frame over `background`, or over black when there is
    /// no earlier radar.
    pub fn placeholder(&self, background: Option<&Mat>) -> Result<Mat, Error> {
        let (w, h) = self.output_size();

        let mut img = match background {
            Some(bg) if bg.cols() == w && bg.rows() == h => bg.try_clone()?,
            _ => Mat::new_rows_cols_with_default(h, w, core::CV_8UC3, Scalar::all(0.0))?,
        };

        put_text(&mut img, PLACEHOLDER_TEXT, Point::new(50, h / 2), 1.0, Color::WHITE, 2)?;

        Ok(img)
    }
}
