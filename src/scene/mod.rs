pub mod bridge;
pub mod paint;
pub mod uniforms;

pub use bridge::{MotionRoute, SceneUniformBridge};
pub use paint::PaintAccumulator;
pub use uniforms::{PublishedFrame, SceneUniforms};

use serde::{Deserialize, Serialize};

use crate::error::SourceKind;

/// The closed set of visual scenes the shader layer can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scene {
    #[default]
    Spectrum,
    Plasma,
    /// Persistent motion paint
    Paint,
    Confetti,
    Bubbles,
    /// Local camera shown full screen
    Passthrough,
    /// Remote MJPEG camera shown full screen
    NetworkCamera,
}

/// Which particle simulation a scene or mode drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    Confetti,
    Sparks,
    Bubbles,
}

impl Scene {
    pub const ALL: [Scene; 7] = [
        Scene::Spectrum,
        Scene::Plasma,
        Scene::Paint,
        Scene::Confetti,
        Scene::Bubbles,
        Scene::Passthrough,
        Scene::NetworkCamera,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scene::Spectrum => "spectrum",
            Scene::Plasma => "plasma",
            Scene::Paint => "paint",
            Scene::Confetti => "confetti",
            Scene::Bubbles => "bubbles",
            Scene::Passthrough => "passthrough",
            Scene::NetworkCamera => "network-camera",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scene| scene.name().eq_ignore_ascii_case(name))
    }

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|&s| s == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Index published in the `scene` uniform.
    pub fn uniform_value(self) -> u32 {
        match self {
            Scene::Spectrum => 0,
            Scene::Plasma => 1,
            Scene::Paint => 2,
            Scene::Confetti => 3,
            Scene::Bubbles => 4,
            Scene::Passthrough => 5,
            Scene::NetworkCamera => 6,
        }
    }

    /// Motion source this scene reads from when both are available.
    pub fn preferred_motion_source(self) -> SourceKind {
        match self {
            Scene::NetworkCamera => SourceKind::RemoteStream,
            Scene::Spectrum
            | Scene::Plasma
            | Scene::Paint
            | Scene::Confetti
            | Scene::Bubbles
            | Scene::Passthrough => SourceKind::LocalCamera,
        }
    }

    /// Whether the scene itself reads the motion field. Motion modes can
    /// still request analysis on top of any scene.
    pub fn consumes_motion(self) -> bool {
        match self {
            Scene::Spectrum | Scene::Plasma => false,
            Scene::Paint | Scene::Confetti | Scene::Bubbles | Scene::Passthrough | Scene::NetworkCamera => true,
        }
    }

    pub fn particle_system(self) -> Option<ParticleKind> {
        match self {
            Scene::Confetti => Some(ParticleKind::Confetti),
            Scene::Bubbles => Some(ParticleKind::Bubbles),
            Scene::Spectrum | Scene::Plasma | Scene::Paint | Scene::Passthrough | Scene::NetworkCamera => None,
        }
    }

    pub fn uses_paint(self) -> bool {
        matches!(self, Scene::Paint)
    }
}
