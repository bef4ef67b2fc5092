pub mod acquire;
pub mod audio;
pub mod config;
pub mod error;
pub mod grid;
pub mod motion;
pub mod particles;
pub mod pipeline;
pub mod scene;

pub use config::VisualizerConfig;
pub use error::{Capability, SourceError, SourceKind, SourceStatus};
pub use pipeline::Visualizer;
