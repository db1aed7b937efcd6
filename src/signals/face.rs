//! Face feature extraction
//!
//! Consumes detections produced by an external landmark/expression model and
//! aggregates blink, gaze, emotion and head-pose features. No image processing
//! happens here.

use crate::config::FaceThresholds;
use crate::signals::types::{Emotion, FaceFrame, FaceSummary, HeadPose, Point};
use crate::signals::SignalExtractor;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Points in an eye contour
const EYE_POINTS: usize = 6;
/// Nose tip index in the nose contour
const NOSE_TIP: usize = 3;
/// Chin index in the jaw outline
const CHIN: usize = 8;

/// Face feature extractor
#[derive(Debug, Clone)]
pub struct FaceExtractor {
    thresholds: FaceThresholds,
    first_ms: Option<i64>,
    last_ms: Option<i64>,
    total_frames: u32,
    face_frames: u32,
    blinking: bool,
    blink_count: u32,
    gaze_samples: u32,
    gaze_on_screen: u32,
    emotion_counts: BTreeMap<Emotion, u32>,
    confident_frames: u32,
    recent: VecDeque<Emotion>,
    pose_frames: u32,
    pose_abs_sum: HeadPose,
}

impl Default for FaceExtractor {
    fn default() -> Self {
        Self::new(FaceThresholds::default())
    }
}

impl FaceExtractor {
    pub fn new(thresholds: FaceThresholds) -> Self {
        Self {
            thresholds,
            first_ms: None,
            last_ms: None,
            total_frames: 0,
            face_frames: 0,
            blinking: false,
            blink_count: 0,
            gaze_samples: 0,
            gaze_on_screen: 0,
            emotion_counts: BTreeMap::new(),
            confident_frames: 0,
            recent: VecDeque::new(),
            pose_frames: 0,
            pose_abs_sum: HeadPose::default(),
        }
    }

    /// Running negative-emotion ratio, used by the live snapshot
    pub fn stress_ratio(&self) -> f64 {
        if self.confident_frames == 0 {
            return 0.0;
        }
        let negative: u32 = self
            .emotion_counts
            .iter()
            .filter(|(emotion, _)| emotion.is_negative())
            .map(|(_, count)| count)
            .sum();
        negative as f64 / self.confident_frames as f64
    }

    fn observe_blink(&mut self, frame: &FaceFrame) {
        let ear = (eye_aspect_ratio(&frame.left_eye) + eye_aspect_ratio(&frame.right_eye)) / 2.0;
        let blinking = ear < self.thresholds.blink_ear;
        if blinking && !self.blinking {
            self.blink_count += 1;
        }
        self.blinking = blinking;
    }

    fn observe_gaze(&mut self, frame: &FaceFrame) {
        if !(frame.frame_width > 0.0 && frame.frame_height > 0.0) {
            debug!(timestamp_ms = frame.timestamp_ms, "skipping gaze for frame without dimensions");
            return;
        }
        let left = centroid(&frame.left_eye);
        let right = centroid(&frame.right_eye);
        let eye_x = (left.x + right.x) / 2.0;
        let eye_y = (left.y + right.y) / 2.0;

        let cx = frame.frame_width / 2.0;
        let cy = frame.frame_height / 2.0;
        let offset_x = (eye_x - cx) / cx * 100.0;
        let offset_y = (eye_y - cy) / cy * 100.0;

        self.gaze_samples += 1;
        let limit = self.thresholds.gaze_offset_pct;
        if offset_x.abs() < limit && offset_y.abs() < limit {
            self.gaze_on_screen += 1;
        }
    }

    fn observe_emotion(&mut self, frame: &FaceFrame) {
        let dominant = frame
            .emotions
            .iter()
            .filter(|(_, confidence)| confidence.is_finite())
            .fold(None::<(Emotion, f64)>, |best, (emotion, confidence)| match best {
                Some((_, best_confidence)) if *confidence <= best_confidence => best,
                _ => Some((*emotion, *confidence)),
            });

        let Some((emotion, confidence)) = dominant else {
            return;
        };
        if confidence <= self.thresholds.emotion_confidence {
            return;
        }

        *self.emotion_counts.entry(emotion).or_insert(0) += 1;
        self.confident_frames += 1;
        self.recent.push_back(emotion);
        while self.recent.len() > self.thresholds.recent_emotions {
            self.recent.pop_front();
        }
    }

    fn observe_pose(&mut self, frame: &FaceFrame) {
        if let Some(pose) = estimate_head_pose(frame) {
            self.pose_frames += 1;
            self.pose_abs_sum.yaw += pose.yaw.abs();
            self.pose_abs_sum.pitch += pose.pitch.abs();
            self.pose_abs_sum.roll += pose.roll.abs();
        }
    }
}

impl SignalExtractor for FaceExtractor {
    type Sample = FaceFrame;
    type Summary = FaceSummary;

    fn ingest(&mut self, frame: &FaceFrame) {
        if let Some(last) = self.last_ms {
            if frame.timestamp_ms < last {
                debug!(timestamp_ms = frame.timestamp_ms, previous_ms = last, "skipping out-of-order face frame");
                return;
            }
        }
        self.first_ms.get_or_insert(frame.timestamp_ms);
        self.last_ms = Some(frame.timestamp_ms);
        self.total_frames += 1;

        if !frame.face_detected {
            return;
        }
        if !has_valid_eyes(frame) {
            debug!(timestamp_ms = frame.timestamp_ms, "recording malformed face frame as not present");
            return;
        }

        self.face_frames += 1;
        self.observe_blink(frame);
        self.observe_gaze(frame);
        self.observe_emotion(frame);
        self.observe_pose(frame);
    }

    fn summary(&self) -> FaceSummary {
        let duration_ms = match (self.first_ms, self.last_ms) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        };
        let duration_min = duration_ms as f64 / 60_000.0;

        let blink_rate_per_min = if duration_min > 0.0 {
            self.blink_count as f64 / duration_min
        } else {
            0.0
        };
        let face_presence_pct = if self.total_frames > 0 {
            self.face_frames as f64 / self.total_frames as f64 * 100.0
        } else {
            0.0
        };
        let gaze_on_screen_pct = if self.gaze_samples > 0 {
            self.gaze_on_screen as f64 / self.gaze_samples as f64 * 100.0
        } else {
            0.0
        };

        let emotion_distribution = self
            .emotion_counts
            .iter()
            .map(|(emotion, count)| {
                (*emotion, *count as f64 / self.confident_frames as f64 * 100.0)
            })
            .collect();

        // Ties resolve to the earlier emotion in declaration order
        let dominant_emotion = self
            .emotion_counts
            .iter()
            .fold(None::<(Emotion, u32)>, |best, (emotion, count)| match best {
                Some((_, best_count)) if *count <= best_count => best,
                _ => Some((*emotion, *count)),
            })
            .map(|(emotion, _)| emotion)
            .unwrap_or(Emotion::Neutral);

        let mean_head_pose = (self.pose_frames > 0).then(|| {
            let n = self.pose_frames as f64;
            HeadPose {
                yaw: self.pose_abs_sum.yaw / n,
                pitch: self.pose_abs_sum.pitch / n,
                roll: self.pose_abs_sum.roll / n,
            }
        });

        FaceSummary {
            duration_ms,
            total_frames: self.total_frames,
            face_frames: self.face_frames,
            face_presence_pct,
            blink_count: self.blink_count,
            blink_rate_per_min,
            gaze_on_screen_pct,
            dominant_emotion,
            emotion_distribution,
            stress_ratio: self.stress_ratio(),
            recent_emotions: self.recent.iter().copied().collect(),
            mean_head_pose,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.thresholds.clone());
    }
}

fn has_valid_eyes(frame: &FaceFrame) -> bool {
    [&frame.left_eye, &frame.right_eye]
        .iter()
        .all(|eye| eye.len() == EYE_POINTS && eye.iter().all(Point::is_finite))
}

/// EAR = (|p2-p6| + |p3-p5|) / (2 |p1-p4|)
fn eye_aspect_ratio(eye: &[Point]) -> f64 {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal == 0.0 {
        return 0.0;
    }
    (eye[1].distance(&eye[5]) + eye[2].distance(&eye[4])) / (2.0 * horizontal)
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    Point::new(
        points.iter().map(|p| p.x).sum::<f64>() / n,
        points.iter().map(|p| p.y).sum::<f64>() / n,
    )
}

/// Rough yaw/pitch/roll in degrees from eye corners, nose tip and chin
fn estimate_head_pose(frame: &FaceFrame) -> Option<HeadPose> {
    let nose_tip = frame.nose.get(NOSE_TIP).filter(|p| p.is_finite())?;
    let chin = frame.jaw.get(CHIN).filter(|p| p.is_finite())?;
    let left = &frame.left_eye;
    let right = &frame.right_eye;

    let center = Point::new((left[0].x + right[3].x) / 2.0, (left[0].y + right[3].y) / 2.0);
    let face_width = right[3].x - left[0].x;
    let face_height = chin.y - center.y;
    if face_width == 0.0 || face_height == 0.0 {
        return None;
    }

    let roll = (right[0].y - left[3].y)
        .atan2(right[0].x - left[3].x)
        .to_degrees();
    let yaw = (nose_tip.x - center.x) / face_width * 60.0;
    let pitch = (nose_tip.y - center.y) / face_height * 30.0;

    Some(HeadPose { yaw, pitch, roll })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Six-point eye one pixel wide with the given aspect ratio
    fn eye(cx: f64, cy: f64, ear: f64) -> Vec<Point> {
        let h = ear / 2.0;
        vec![
            Point::new(cx, cy),
            Point::new(cx + 0.33, cy - h),
            Point::new(cx + 0.66, cy - h),
            Point::new(cx + 1.0, cy),
            Point::new(cx + 0.66, cy + h),
            Point::new(cx + 0.33, cy + h),
        ]
    }

    fn frame(ear: f64, timestamp_ms: i64) -> FaceFrame {
        FaceFrame {
            face_detected: true,
            left_eye: eye(150.0, 120.0, ear),
            right_eye: eye(170.0, 120.0, ear),
            nose: vec![],
            jaw: vec![],
            emotions: BTreeMap::new(),
            frame_width: 320.0,
            frame_height: 240.0,
            timestamp_ms,
        }
    }

    fn with_emotion(mut f: FaceFrame, emotion: Emotion, confidence: f64) -> FaceFrame {
        f.emotions.insert(emotion, confidence);
        f
    }

    fn absent(timestamp_ms: i64) -> FaceFrame {
        FaceFrame {
            face_detected: false,
            left_eye: vec![],
            right_eye: vec![],
            nose: vec![],
            jaw: vec![],
            emotions: BTreeMap::new(),
            frame_width: 320.0,
            frame_height: 240.0,
            timestamp_ms,
        }
    }

    #[test]
    fn test_ear_sequence_counts_one_blink() {
        let mut extractor = FaceExtractor::default();
        for (i, ear) in [0.35, 0.18, 0.19, 0.34].iter().enumerate() {
            extractor.ingest(&frame(*ear, i as i64 * 1000));
        }
        assert_eq!(extractor.summary().blink_count, 1);
    }

    #[test]
    fn test_blink_rate_per_minute() {
        let mut extractor = FaceExtractor::default();
        let ears = [0.3, 0.1, 0.3, 0.1, 0.3];
        for (i, ear) in ears.iter().enumerate() {
            extractor.ingest(&frame(*ear, i as i64 * 7500));
        }
        // 2 blinks over 30 seconds
        let summary = extractor.summary();
        assert_eq!(summary.blink_count, 2);
        assert!((summary.blink_rate_per_min - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_and_malformed_frames_lower_presence() {
        let mut extractor = FaceExtractor::default();
        extractor.ingest(&frame(0.3, 0));
        extractor.ingest(&absent(1000));
        let mut broken = frame(0.3, 2000);
        broken.left_eye.pop();
        extractor.ingest(&broken);
        extractor.ingest(&frame(0.3, 3000));

        let summary = extractor.summary();
        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.face_frames, 2);
        assert_eq!(summary.face_presence_pct, 50.0);
        // Gaze is weighted by present frames only
        assert_eq!(summary.gaze_on_screen_pct, 100.0);
    }

    #[test]
    fn test_gaze_off_screen() {
        let mut extractor = FaceExtractor::default();
        extractor.ingest(&frame(0.3, 0));
        let mut aside = frame(0.3, 1000);
        aside.left_eye = eye(20.0, 120.0, 0.3);
        aside.right_eye = eye(40.0, 120.0, 0.3);
        extractor.ingest(&aside);
        assert_eq!(extractor.summary().gaze_on_screen_pct, 50.0);
    }

    #[test]
    fn test_emotion_distribution_and_stress_ratio() {
        let mut extractor = FaceExtractor::default();
        extractor.ingest(&with_emotion(frame(0.3, 0), Emotion::Happy, 0.9));
        extractor.ingest(&with_emotion(frame(0.3, 1000), Emotion::Sad, 0.7));
        extractor.ingest(&with_emotion(frame(0.3, 2000), Emotion::Happy, 0.8));
        extractor.ingest(&with_emotion(frame(0.3, 3000), Emotion::Angry, 0.6));
        // Below the confidence threshold
        extractor.ingest(&with_emotion(frame(0.3, 4000), Emotion::Fearful, 0.2));

        let summary = extractor.summary();
        assert_eq!(summary.dominant_emotion, Emotion::Happy);
        assert_eq!(summary.emotion_distribution.get(&Emotion::Happy), Some(&50.0));
        assert_eq!(summary.stress_ratio, 0.5);
        assert_eq!(
            summary.recent_emotions,
            vec![Emotion::Happy, Emotion::Sad, Emotion::Happy, Emotion::Angry]
        );
    }

    #[test]
    fn test_recent_emotions_are_capped() {
        let mut extractor = FaceExtractor::default();
        for i in 0..8 {
            extractor.ingest(&with_emotion(frame(0.3, i * 1000), Emotion::Neutral, 0.9));
        }
        assert_eq!(extractor.summary().recent_emotions.len(), 5);
    }

    #[test]
    fn test_head_pose_from_landmarks() {
        let mut f = frame(0.3, 0);
        // Nose tip centered between the eye corners, chin below
        f.nose = (0..5).map(|i| Point::new(160.5, 125.0 + i as f64)).collect();
        f.nose[NOSE_TIP] = Point::new(160.5, 140.0);
        f.jaw = (0..17).map(|i| Point::new(140.0 + i as f64, 170.0)).collect();

        let mut extractor = FaceExtractor::default();
        extractor.ingest(&f);
        let pose = extractor.summary().mean_head_pose.unwrap();
        assert!(pose.yaw.abs() < 1e-9);
        assert!((pose.pitch - 12.0).abs() < 1e-9);
        assert!(pose.roll.abs() < 1e-9);
    }

    #[test]
    fn test_no_pose_without_landmarks() {
        let mut extractor = FaceExtractor::default();
        extractor.ingest(&frame(0.3, 0));
        assert_eq!(extractor.summary().mean_head_pose, None);
    }

    #[test]
    fn test_reset_and_replay_is_identical() {
        let stream: Vec<FaceFrame> = (0..40)
            .map(|i| {
                if i % 9 == 0 {
                    absent(i * 1000)
                } else {
                    let ear = if i % 4 == 0 { 0.1 } else { 0.3 };
                    let emotion = if i % 3 == 0 { Emotion::Sad } else { Emotion::Neutral };
                    with_emotion(frame(ear, i * 1000), emotion, 0.7)
                }
            })
            .collect();

        let mut extractor = FaceExtractor::default();
        stream.iter().for_each(|f| extractor.ingest(f));
        let first = extractor.summary();

        extractor.reset();
        assert_eq!(extractor.summary(), FaceSummary::default());
        stream.iter().for_each(|f| extractor.ingest(f));
        assert_eq!(extractor.summary(), first);
    }
}
