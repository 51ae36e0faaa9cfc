use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> From<[f32; 4]> for BBox<F> {
    fn from(slice: [f32; 4]) -> Self {
        BBox(slice, PhantomData)
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new((self.0[0] + self.0[2]) / 2.0, (self.0[1] + self.0[3]) / 2.0)
    }

    /// Ground contact point of a standing person.
    pub fn bottom_center(&self) -> na::Point2<f32> {
        na::Point2::new((self.0[0] + self.0[2]) / 2.0, self.0[3])
    }

    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let i_left = self.left().max(other.left());
        let i_right = self.right().min(other.right());
        let i_top = self.top().max(other.top());
        let i_bottom = self.bottom().min(other.bottom());

        let i_area = (i_right - i_left).max(0.0) * (i_bottom - i_top).max(0.0);
        let union = self.area() + other.area() - i_area;

        if union <= f32::EPSILON {
            0.0
        } else {
            i_area / union
        }
    }

    /// Sub-box given by fractions of this box's width and height.
    pub fn fraction(&self, x: (f32, f32), y: (f32, f32)) -> BBox<Ltrb> {
        let (w, h) = (self.width(), self.height());

        BBox::ltrb(
            self.left() + w * x.0,
            self.top() + h * y.0,
            self.left() + w * x.1,
            self.top() + h * y.1,
        )
    }

    pub fn translate(&self, dx: f32, dy: f32) -> BBox<Ltrb> {
        BBox::ltrb(
            self.0[0] + dx,
            self.0[1] + dy,
            self.0[2] + dx,
            self.0[3] + dy,
        )
    }
}
