use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Player,
    Goalkeeper,
    Referee,
    Ball,
}

impl EntityClass {
    pub const ALL: [EntityClass; 4] = [
        EntityClass::Player,
        EntityClass::Goalkeeper,
        EntityClass::Referee,
        EntityClass::Ball,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityClass::Player => "player",
            EntityClass::Goalkeeper => "goalkeeper",
            EntityClass::Referee => "referee",
            EntityClass::Ball => "ball",
        }
    }

    /// Short prefix used in frame labels.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityClass::Player => "P",
            EntityClass::Goalkeeper => "GK",
            EntityClass::Referee => "R",
            EntityClass::Ball => "Ball",
        }
    }
}

/// One object seen by the detector in image space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "b")]
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "c")]
    pub class: EntityClass,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, class: EntityClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
            track_id: None,
        }
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// Image point projected onto the pitch: box centre for the ball,
    /// feet for everyone else.
    pub fn anchor(&self) -> na::Point2<f32> {
        match self.class {
            EntityClass::Ball => self.bbox.center(),
            _ => self.bbox.bottom_center(),
        }
    }

    #[inline]
    pub fn with_track_id(mut self, id: u32) -> Self {
        self.track_id = Some(id);
        self
    }
}

/// Pitch keypoint, index-aligned with the pitch vertex list
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}
