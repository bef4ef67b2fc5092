pub mod beat_detector;
pub mod extractor;
pub mod feature_normalizer;
pub mod fft;
pub mod microphone;
pub mod processor;
pub mod source;

pub use beat_detector::BeatDetector;
pub use extractor::{BandLayout, BandRange, SpectralFeatureExtractor};
pub use feature_normalizer::{exp_smooth, FeatureNormalizer, LoudnessEnvelope};
pub use fft::FrequencyAnalyser;
pub use microphone::acquire_microphone;
pub use processor::AudioProcessor;
pub use source::{AudioSource, WavFileSource};

/// Smoothed, normalized audio features for one render tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub frequency_bands: FrequencyBands,
    /// Overall loudness across every bin, 0.0-1.0
    pub energy: f32,
    /// Rising edge of a detected beat; true for a single tick
    pub beat_detected: bool,
    /// Display spectrum, each band 0.0-1.0, low end first
    pub spectrum: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl AudioFrame {
    /// The hold value used whenever no audio source is connected.
    pub fn silent(spectrum_bands: usize) -> Self {
        Self {
            frequency_bands: FrequencyBands::default(),
            energy: 0.0,
            beat_detected: false,
            spectrum: vec![0.0; spectrum_bands],
        }
    }
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self::silent(32)
    }
}
