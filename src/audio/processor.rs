use log::{debug, info, warn};

use super::{AudioFrame, AudioSource, FrequencyAnalyser, SpectralFeatureExtractor};
use crate::config::AudioConfig;
use crate::error::{Capability, SourceError, SourceStatus};

/// Owns the audio source, the analyser and the feature extractor.
///
/// `tick` is the only per-frame entry point. Without a connected source it
/// returns the silent frame, so the render loop always has features.
pub struct AudioProcessor {
    config: AudioConfig,
    source: Option<Box<dyn AudioSource>>,
    analyser: FrequencyAnalyser,
    extractor: SpectralFeatureExtractor,
    status: SourceStatus,

    samples: Vec<f32>,
    bins: Vec<u8>,
    ticks: u64,
}

impl AudioProcessor {
    pub fn new(config: &AudioConfig) -> Self {
        let analyser = FrequencyAnalyser::new(config);
        let extractor = SpectralFeatureExtractor::new(44100.0, analyser.bin_count(), config);
        Self {
            config: config.clone(),
            source: None,
            analyser,
            extractor,
            status: SourceStatus::Disconnected,
            samples: Vec::with_capacity(4096),
            bins: Vec::with_capacity(config.fft_size / 2),
            ticks: 0,
        }
    }

    pub fn connect(&mut self, source: Box<dyn AudioSource>) {
        info!("Audio source connected: {} ({} Hz)", source.name(), source.sample_rate());
        self.analyser = FrequencyAnalyser::new(&self.config);
        self.extractor = SpectralFeatureExtractor::new(source.sample_rate(), self.analyser.bin_count(), &self.config);
        self.source = Some(source);
        self.status = SourceStatus::Active(Capability::Full);
    }

    pub fn disconnect(&mut self) {
        if let Some(source) = self.source.take() {
            info!("Audio source disconnected: {}", source.name());
        }
        self.analyser.reset();
        self.extractor.reset();
        self.status = SourceStatus::Disconnected;
    }

    /// Record a failed acquisition; the pipeline keeps running silent.
    pub fn mark_unavailable(&mut self, err: &SourceError) {
        warn!("Audio unavailable, continuing with silent features: {}", err);
        self.disconnect();
        self.status = SourceStatus::from_error(err);
    }

    pub fn tick(&mut self, now_ms: f64) -> AudioFrame {
        let Some(source) = self.source.as_mut() else {
            return AudioFrame::silent(self.extractor.spectrum_bands());
        };

        self.samples.clear();
        source.read_samples(&mut self.samples);
        self.analyser.push_samples(&self.samples);
        self.analyser.frequency_bytes(&mut self.bins);

        let frame = self.extractor.process(&self.bins, now_ms);

        self.ticks += 1;
        if self.ticks % 120 == 0 {
            debug!(
                "Audio: bass={:.3} mid={:.3} treble={:.3} energy={:.3} beat={}",
                frame.frequency_bands.bass,
                frame.frequency_bands.mid,
                frame.frequency_bands.treble,
                frame.energy,
                frame.beat_detected
            );
        }
        frame
    }

    pub fn status(&self) -> &SourceStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Latest byte-scale magnitude buffer (empty before the first tick).
    pub fn frequency_bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn extractor_mut(&mut self) -> &mut SpectralFeatureExtractor {
        &mut self.extractor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WavFileSource;
    use crate::error::{SourceKind, SourceStatus};

    fn tone(sample_rate: f32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate * seconds) as usize;
        (0..len)
            .map(|i| 0.8 * (2.0 * std::f32::consts::PI * 100.0 * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_no_source_yields_silence() {
        let mut processor = AudioProcessor::new(&AudioConfig::default());
        let frame = processor.tick(0.0);
        assert_eq!(frame, AudioFrame::silent(32));
        assert_eq!(processor.status(), &SourceStatus::Disconnected);
    }

    #[test]
    fn test_bass_tone_drives_bass_band() {
        let mut processor = AudioProcessor::new(&AudioConfig {
            adaptive_gain: false,
            ..AudioConfig::default()
        });
        processor.connect(Box::new(WavFileSource::from_samples("tone", tone(44100.0, 2.0), 44100.0)));

        let mut frame = AudioFrame::default();
        for tick in 0..60 {
            frame = processor.tick(tick as f64 * 1000.0 / 60.0);
        }
        assert!(frame.frequency_bands.bass > frame.frequency_bands.treble);
        assert!(frame.frequency_bands.bass > 0.1);
        assert_eq!(processor.frequency_bins().len(), 1024);
    }

    #[test]
    fn test_unavailable_source_keeps_running() {
        let mut processor = AudioProcessor::new(&AudioConfig::default());
        processor.mark_unavailable(&SourceError::PermissionDenied { kind: SourceKind::Microphone });
        assert!(matches!(processor.status(), SourceStatus::Unavailable(_)));
        for tick in 0..10 {
            let frame = processor.tick(tick as f64);
            assert_eq!(frame.energy, 0.0);
            assert!(!frame.beat_detected);
        }
    }
}
