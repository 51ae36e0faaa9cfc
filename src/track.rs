use crate::bbox::{BBox, Ltrb};
use crate::detection::{Detection, EntityClass};
use crate::predictor::Predictor;

const VELOCITY_SMOOTHING: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub class: EntityClass,
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    /// Consecutive frames without a match.
    pub missing: u32,
    pub hits: u32,
    predictor: Predictor,
}

impl Track {
    pub fn new(id: u32, det: &Detection) -> Self {
        let mut predictor = Predictor::new(VELOCITY_SMOOTHING);
        predictor.update(det.bbox.center(), 1);

        Self {
            id,
            class: det.class,
            bbox: det.bbox,
            confidence: det.confidence,
            missing: 0,
            hits: 1,
            predictor,
        }
    }

    /// Last box shifted to where the centre is expected this frame.
    pub fn predicted_bbox(&self) -> BBox<Ltrb> {
        let center = self.bbox.center();
        let next = self.predictor.predict(self.missing + 1);

        self.bbox.translate(next.x - center.x, next.y - center.y)
    }

    pub fn update(&mut self, det: &Detection) {
        self.predictor.update(det.bbox.center(), self.missing + 1);

        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.missing = 0;
        self.hits += 1;
    }

    #[inline]
    pub fn mark_missed(&mut self) {
        self.missing += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_moves_with_track() {
        let mut t = Track::new(
            1,
            &Detection::new(BBox::ltrb(0.0, 0.0, 10.0, 20.0), EntityClass::Player, 0.9),
        );
        t.update(&Detection::new(
            BBox::ltrb(5.0, 0.0, 15.0, 20.0),
            EntityClass::Player,
            0.8,
        ));

        let predicted = t.predicted_bbox();
        assert!(predicted.left() > 5.0);
        assert_eq!(predicted.width(), 10.0);
        assert_eq!(t.hits, 2);
        assert_eq!(t.missing, 0);
    }
}
