use opencv::{
    core::{Mat, Point, Rect},
    imgproc,
    prelude::*,
};

use crate::color::{Color, Palette};
use crate::detection::{Detection, Keypoint};
use crate::error::Error;
use crate::pitch::{PitchConfiguration, VertexGroup};
use crate::team::{TeamClassifier, TeamId, TeamState};
use crate::tracker::TrackedFrame;

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.5;
const MARKER_RADIUS: i32 = 8;
const BALL_RADIUS: i32 = 10;
const KEYPOINT_RADIUS: i32 = 5;

fn group_color(group: VertexGroup) -> Color {
    match group {
        VertexGroup::LeftHalf => Color::rgb(255, 20, 147),
        VertexGroup::Centre => Color::rgb(0, 191, 255),
        VertexGroup::RightHalf => Color::rgb(255, 165, 0),
    }
}

pub(crate) fn put_text(img: &mut Mat, text: &str, org: Point, scale: f64, color: Color, thickness: i32) -> Result<(), Error> {
    imgproc::put_text(
        img,
        text,
        org,
        FONT,
        scale,
        color.to_scalar(),
        thickness,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(())
}

fn fill_rect(img: &mut Mat, rect: Rect, color: Color) -> Result<(), Error> {
    imgproc::rectangle(img, rect, color.to_scalar(), -1, imgproc::LINE_8, 0)?;

    Ok(())
}

fn dot(img: &mut Mat, center: Point, radius: i32, color: Color) -> Result<(), Error> {
    imgproc::circle(img, center, radius, color.to_scalar(), -1, imgproc::LINE_AA, 0)?;

    Ok(())
}

#[inline]
fn rgb_text(c: Color) -> String {
    format!("({},{},{})", c.r, c.g, c.b)
}

#[derive(Debug, Clone)]
pub struct FrameAnnotator {
    palette: Palette,
    classifier: TeamClassifier,
    jersey_overlay: bool,
}

impl FrameAnnotator {
    pub fn new(palette: Palette, classifier: TeamClassifier, jersey_overlay: bool) -> Self {
        Self {
            palette,
            classifier,
            jersey_overlay,
        }
    }

    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Draws onto a copy of `frame`; `teams` should be a snapshot that stays
    /// fixed while drawing.
    pub fn annotate(&self, frame: &Mat, tracked: &TrackedFrame, teams: &TeamState) -> Result<Mat, Error> {
        let mut out = frame.try_clone()?;

        for det in &tracked.players {
            self.marker(&mut out, det, self.palette.player_marker, MARKER_RADIUS)?;

            if self.jersey_overlay {
                self.jersey(&mut out, det, teams)?;
            }
        }

        for det in &tracked.goalkeepers {
            self.marker(&mut out, det, self.palette.goalkeeper, MARKER_RADIUS)?;
        }

        for det in &tracked.referees {
            self.marker(&mut out, det, self.palette.referee, MARKER_RADIUS)?;
        }

        if let [ball] = tracked.ball.as_slice() {
            self.marker(&mut out, ball, self.palette.ball, BALL_RADIUS)?;
        }

        self.legend(&mut out, teams)?;

        Ok(out)
    }

    /// Draws the keypoints above `min_confidence` in place, colored by the
    /// pitch part their vertex belongs to and labelled with its number.
    pub fn draw_keypoints(
        &self,
        img: &mut Mat,
        keypoints: &[Keypoint],
        pitch: &PitchConfiguration,
        min_confidence: f32,
    ) -> Result<(), Error> {
        let labels = pitch.labels();

        for (idx, kp) in keypoints.iter().enumerate().take(labels.len()) {
            if kp.confidence <= min_confidence {
                continue;
            }

            let color = group_color(pitch.vertex_group(idx));
            let center = Point::new(kp.x as i32, kp.y as i32);

            dot(img, center, KEYPOINT_RADIUS, color)?;
            put_text(img, labels[idx], Point::new(center.x + 6, center.y - 6), 0.4, color, 1)?;
        }

        Ok(())
    }

    fn marker(&self, img: &mut Mat, det: &Detection, color: Color, radius: i32) -> Result<(), Error> {
        let anchor = det.anchor();
        let center = Point::new(anchor.x as i32, anchor.y as i32);
        dot(img, center, radius, color)?;

        let label = match det.track_id {
            Some(id) => format!("{}:{}", det.class.prefix(), id),
            None => det.class.prefix().to_string(),
        };

        put_text(
            img,
            &label,
            Point::new(det.bbox.left() as i32, det.bbox.top() as i32 - 5),
            FONT_SCALE,
            color,
            1,
        )
    }

    fn jersey(&self, img: &mut Mat, det: &Detection, teams: &TeamState) -> Result<(), Error> {
        let team = det.track_id.map(|id| teams.team_of(id)).unwrap_or_default();
        let color = match team {
            TeamId::Unknown => self.palette.unknown,
            t => teams.team_color(t).unwrap_or(self.palette.unknown),
        };

        let Some(region) = self.classifier.jersey_region(&det.bbox, img.cols(), img.rows()) else {
            return Ok(());
        };

        imgproc::rectangle(img, region, color.to_scalar(), 2, imgproc::LINE_8, 0)?;

        let (x1, y1) = (det.bbox.left() as i32, det.bbox.top() as i32);
        put_text(img, team.label(), Point::new(x1 + 40, y1 - 5), FONT_SCALE, color, 1)?;

        if team != TeamId::Unknown {
            fill_rect(img, Rect::new(x1, region.y - 25, 20, 15), color)?;
            put_text(
                img,
                &rgb_text(color),
                Point::new(x1 + 25, region.y - 30),
                0.4,
                self.palette.text,
                1,
            )?;
        }

        Ok(())
    }

    fn legend(&self, img: &mut Mat, teams: &TeamState) -> Result<(), Error> {
        let Some(centroids) = teams.centroids() else {
            return Ok(());
        };

        let mut y = 30;
        for (idx, color) in centroids.iter().enumerate() {
            put_text(img, &format!("Team {}:", idx), Point::new(10, y), 0.7, self.palette.text, 2)?;
            fill_rect(img, Rect::new(120, y - 20, 50, 15), *color)?;
            put_text(img, &rgb_text(*color), Point::new(180, y), 0.6, self.palette.text, 1)?;

            y += 40;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::detection::EntityClass;
    use crate::team::JerseySample;
    use opencv::core::{self, Scalar, Vec3b};

    fn blank() -> Mat {
        Mat::new_rows_cols_with_default(360, 640, core::CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn annotator() -> FrameAnnotator {
        FrameAnnotator::new(Palette::default(), TeamClassifier::default(), true)
    }

    fn det(class: EntityClass, l: f32, id: u32) -> Detection {
        Detection::new(BBox::ltrb(l, 100.0, l + 40.0, 200.0), class, 0.9).with_track_id(id)
    }

    fn px(m: &Mat, x: i32, y: i32) -> Color {
        Color::from_bgr(*m.at_2d::<Vec3b>(y, x).unwrap())
    }

    #[test]
    fn input_frame_is_untouched() {
        let frame = blank();
        let tracked = TrackedFrame {
            players: vec![det(EntityClass::Player, 100.0, 1)],
            ..Default::default()
        };

        let out = annotator().annotate(&frame, &tracked, &TeamState::default()).unwrap();

        assert_eq!(px(&frame, 120, 200), Color::BLACK);
        assert_eq!(px(&out, 120, 200), Palette::default().player_marker);
    }

    #[test]
    fn ball_drawn_only_when_unique() {
        let frame = blank();
        let palette = Palette::default();

        let one = TrackedFrame {
            ball: vec![det(EntityClass::Ball, 300.0, 1)],
            ..Default::default()
        };
        let out = annotator().annotate(&frame, &one, &TeamState::default()).unwrap();
        assert_eq!(px(&out, 320, 150), palette.ball);

        let two = TrackedFrame {
            ball: vec![det(EntityClass::Ball, 300.0, 1), det(EntityClass::Ball, 500.0, 2)],
            ..Default::default()
        };
        let out = annotator().annotate(&frame, &two, &TeamState::default()).unwrap();
        assert_eq!(px(&out, 320, 150), Color::BLACK);
    }

    #[test]
    fn legend_shows_team_swatches() {
        let mut teams = TeamState::default();
        let red = Color::rgb(200, 30, 30);
        let blue = Color::rgb(30, 30, 200);
        TeamClassifier::default()
            .update_from_samples(
                &mut teams,
                &[
                    JerseySample { track_id: 1, color: red },
                    JerseySample { track_id: 2, color: blue },
                ],
            )
            .unwrap();

        let out = annotator().annotate(&blank(), &TrackedFrame::default(), &teams).unwrap();
        let centroids = teams.centroids().unwrap();

        assert_eq!(px(&out, 145, 17), centroids[0]);
        assert_eq!(px(&out, 145, 57), centroids[1]);
    }

    #[test]
    fn keypoints_follow_vertex_groups() {
        let pitch = PitchConfiguration::default();
        let mut img = blank();

        let mut keypoints = vec![Keypoint::new(0.0, 0.0, 0.1); 32];
        keypoints[0] = Keypoint::new(50.0, 300.0, 0.9);
        keypoints[13] = Keypoint::new(320.0, 300.0, 0.9);
        keypoints[24] = Keypoint::new(590.0, 300.0, 0.9);
        keypoints[1] = Keypoint::new(50.0, 50.0, 0.4);

        annotator().draw_keypoints(&mut img, &keypoints, &pitch, 0.5).unwrap();

        assert_eq!(px(&img, 50, 300), group_color(VertexGroup::LeftHalf));
        assert_eq!(px(&img, 320, 300), group_color(VertexGroup::Centre));
        assert_eq!(px(&img, 590, 300), group_color(VertexGroup::RightHalf));
        assert_eq!(px(&img, 50, 50), Color::BLACK);
    }
}
