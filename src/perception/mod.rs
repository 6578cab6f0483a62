//! Perception provider interface
//!
//! The engine does not run a vision model itself. A `PerceptionProvider`
//! analyzes frames from a `FrameSource` and returns raw detections
//! (`FrameAnalysis`), which `extract_signal` maps to a normalized
//! `PerceptionSignal`.

mod extract;

pub use extract::{eye_aspect_ratio, extract_signal};

use crate::error::ProctorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured frame, opaque to the engine
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Something that produces frames on demand (camera, screen share, replay)
pub trait FrameSource: Send {
    /// Next frame, or `None` when no frame could be acquired this tick
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Trait for perception providers
///
/// Calls may block for tens to hundreds of milliseconds and may fail; a
/// failure means "no signal this tick" and never a violation.
pub trait PerceptionProvider: Send {
    fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis, ProctorError>;
}

/// A point in normalized image coordinates (0-1 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned face box in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Four landmarks outlining one eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub outer: Point,
    pub inner: Point,
    pub upper: Point,
    pub lower: Point,
}

impl EyeLandmarks {
    pub fn center(&self) -> Point {
        Point::new(
            (self.outer.x + self.inner.x) / 2.0,
            (self.upper.y + self.lower.y) / 2.0,
        )
    }
}

/// The subset of face landmarks the engine measures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub upper_lip: Point,
    pub lower_lip: Point,
    pub nose_tip: Point,
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
}

/// Head pose angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
}

/// One detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<HeadPose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_eye_open_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_eye_open_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouth_open_probability: Option<f64>,
}

/// One object-class detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub label: String,
    pub confidence: f64,
}

/// Raw provider output for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    #[serde(default)]
    pub faces: Vec<FaceDetection>,
    /// Hand landmarks (e.g. wrist or index tip), any number of hands
    #[serde(default)]
    pub hands: Vec<Point>,
    /// `None` when the provider has no object classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectDetection>>,
}
