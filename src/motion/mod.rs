pub mod analyzer;
pub mod frame;
pub mod mjpeg;
pub mod source;

pub use analyzer::MotionFieldExtractor;
pub use frame::{luminance, VideoFrame};
pub use mjpeg::{MjpegEndpoint, MjpegParser, MjpegStream};
pub use source::{
    camera_channel, CameraDevice, CameraFeed, CameraFeedSender, MotionSource, MotionSourceProvider, SourceFrame,
    SyntheticCamera,
};

use serde::{Deserialize, Serialize};

/// Which consumer of the motion field is active.
///
/// The field is computed regardless; the mode only decides who reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionMode {
    #[default]
    Off,
    /// Displacement driven by motion velocity
    Push,
    /// Persistent paint trail overlay
    Predator,
    /// Spark emission from moving edges
    Trails,
}

impl MotionMode {
    pub const ALL: [MotionMode; 4] = [MotionMode::Off, MotionMode::Push, MotionMode::Predator, MotionMode::Trails];

    pub fn next(self) -> Self {
        match self {
            MotionMode::Off => MotionMode::Push,
            MotionMode::Push => MotionMode::Predator,
            MotionMode::Predator => MotionMode::Trails,
            MotionMode::Trails => MotionMode::Off,
        }
    }

    /// Value published in the `motion_mode` uniform (0-3).
    pub fn uniform_value(self) -> u32 {
        match self {
            MotionMode::Off => 0,
            MotionMode::Push => 1,
            MotionMode::Predator => 2,
            MotionMode::Trails => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MotionMode::Off => "off",
            MotionMode::Push => "push",
            MotionMode::Predator => "predator",
            MotionMode::Trails => "trails",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.name().eq_ignore_ascii_case(name))
    }
}

/// Scalar motion summary for one analysed video frame.
///
/// Coordinates follow image convention: `(0,0)` is the top-left corner and
/// positive `velocity_y` points down the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFrame {
    pub intensity: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub mode: MotionMode,
}

impl MotionFrame {
    pub fn idle(mode: MotionMode) -> Self {
        Self {
            intensity: 0.0,
            center_x: 0.5,
            center_y: 0.5,
            velocity_x: 0.0,
            velocity_y: 0.0,
            mode,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.velocity_x * self.velocity_x + self.velocity_y * self.velocity_y).sqrt()
    }
}

impl Default for MotionFrame {
    fn default() -> Self {
        Self::idle(MotionMode::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_cycle_returns_to_off() {
        let mut mode = MotionMode::Off;
        let mut seen = Vec::new();
        for _ in 0..4 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(seen, vec![MotionMode::Push, MotionMode::Predator, MotionMode::Trails, MotionMode::Off]);
    }

    #[test]
    fn test_mode_names_round_trip() {
        for mode in MotionMode::ALL {
            assert_eq!(MotionMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(MotionMode::from_name("TRAILS"), Some(MotionMode::Trails));
        assert_eq!(MotionMode::from_name("wobble"), None);
        assert_eq!(MotionMode::Trails.uniform_value(), 3);
    }
}
