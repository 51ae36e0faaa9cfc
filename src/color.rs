use opencv::{
    core::{self, Mat, Scalar, Vec3b},
    imgproc,
    prelude::*,
};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// 8-bit RGB color.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl From<[u8; 3]> for Color {
    fn from(c: [u8; 3]) -> Self {
        Color::rgb(c[0], c[1], c[2])
    }
}

impl From<Color> for [u8; 3] {
    fn from(c: Color) -> Self {
        [c.r, c.g, c.b]
    }
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// OpenCV drawing color (BGR order).
    #[inline]
    pub fn to_scalar(self) -> Scalar {
        Scalar::new(self.b as f64, self.g as f64, self.r as f64, 0.0)
    }

    #[inline]
    pub fn from_bgr(px: Vec3b) -> Self {
        Self::rgb(px[2], px[1], px[0])
    }

    pub fn distance(&self, other: &Color) -> f32 {
        let dr = self.r as f32 - other.r as f32;
        let dg = self.g as f32 - other.g as f32;
        let db = self.b as f32 - other.b as f32;

        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// OpenCV HSV triple: hue in 0..180, saturation and value in 0..256.
    pub fn to_hsv(self) -> Result<[u8; 3], Error> {
        let px = convert_pixel(self.to_scalar(), imgproc::COLOR_BGR2HSV)?;

        Ok([px[0], px[1], px[2]])
    }

    pub fn from_hsv(hsv: [u8; 3]) -> Result<Self, Error> {
        let px = convert_pixel(
            Scalar::new(hsv[0] as f64, hsv[1] as f64, hsv[2] as f64, 0.0),
            imgproc::COLOR_HSV2BGR,
        )?;

        Ok(Self::from_bgr(px))
    }

    #[inline]
    pub fn hue(self) -> Result<u8, Error> {
        Ok(self.to_hsv()?[0])
    }
}

fn convert_pixel(value: Scalar, code: i32) -> Result<Vec3b, Error> {
    let src = Mat::new_rows_cols_with_default(1, 1, core::CV_8UC3, value)?;
    let mut dst = Mat::default();
    imgproc::cvt_color_def(&src, &mut dst, code)?;

    Ok(*dst.at_2d::<Vec3b>(0, 0)?)
}

/// Drawing colors for every role.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Palette {
    pub player_marker: Color,
    pub teams: [Color; 2],
    pub unknown: Color,
    pub goalkeeper: Color,
    pub referee: Color,
    pub ball: Color,
    pub text: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            player_marker: Color::rgb(0, 0, 255),
            teams: [Color::rgb(0, 0, 255), Color::rgb(255, 0, 0)],
            unknown: Color::WHITE,
            goalkeeper: Color::rgb(0, 255, 0),
            referee: Color::rgb(255, 255, 0),
            ball: Color::rgb(255, 0, 0),
            text: Color::WHITE,
        }
    }
}
