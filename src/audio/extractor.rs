use log::debug;

use super::feature_normalizer::{exp_smooth, Feature, FeatureNormalizer};
use super::{AudioFrame, BeatDetector, FrequencyBands};
use crate::config::{clamp_unit, AudioConfig};

pub const BASS_HZ: (f32, f32) = (20.0, 250.0);
pub const MID_HZ: (f32, f32) = (250.0, 4000.0);
pub const TREBLE_HZ: (f32, f32) = (4000.0, 20000.0);
/// Upper edge of the low-end window the beat detector listens to
pub const BEAT_CEILING_HZ: f32 = 500.0;

/// Half-open bin index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

impl BandRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean byte magnitude over the range, scaled to `[0,1]`.
    pub fn level(&self, bins: &[u8]) -> f32 {
        let end = self.end.min(bins.len());
        if self.start >= end {
            return 0.0;
        }
        let sum: u32 = bins[self.start..end].iter().map(|&b| b as u32).sum();
        sum as f32 / (end - self.start) as f32 / 255.0
    }
}

/// Static bin ranges for each band, computed once per sample rate and bin
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    pub bin_count: usize,
    pub bass: BandRange,
    pub mid: BandRange,
    pub treble: BandRange,
    pub beat: BandRange,
}

impl BandLayout {
    pub fn new(sample_rate: f32, bin_count: usize) -> Self {
        let nyquist = (sample_rate * 0.5).max(1.0);
        let bin_for = |hz: f32| -> usize { ((hz / nyquist) * bin_count as f32).floor() as usize };
        let range = |lo: f32, hi: f32| -> BandRange {
            if bin_count == 0 {
                return BandRange { start: 0, end: 0 };
            }
            let start = bin_for(lo).min(bin_count - 1);
            let end = bin_for(hi).clamp(start + 1, bin_count);
            BandRange { start, end }
        };

        Self {
            bin_count,
            bass: range(BASS_HZ.0, BASS_HZ.1),
            mid: range(MID_HZ.0, MID_HZ.1),
            treble: range(TREBLE_HZ.0, TREBLE_HZ.1),
            beat: range(BASS_HZ.0, BEAT_CEILING_HZ),
        }
    }
}

/// Quadratic bucket edges for an `n`-band display spectrum.
///
/// Band `i` starts at bin `(i/n)^2 * bin_count`, which spends most of the
/// display on the low end.
pub fn spectrum_buckets(bands: usize, bin_count: usize) -> Vec<BandRange> {
    (0..bands)
        .map(|i| {
            let edge = |j: usize| -> usize {
                let t = j as f32 / bands as f32;
                (t * t * bin_count as f32) as usize
            };
            let start = edge(i).min(bin_count);
            let end = edge(i + 1).max(start + 1).min(bin_count);
            BandRange { start, end }
        })
        .collect()
}

/// Turns a byte-scale magnitude buffer into smoothed, normalized features.
pub struct SpectralFeatureExtractor {
    sample_rate: f32,
    layout: BandLayout,
    buckets: Vec<BandRange>,
    spectrum_bands: usize,
    smoothing: f32,

    smoothed: FrequencyBands,
    smoothed_average: f32,
    normalizer: FeatureNormalizer,
    beat_detector: BeatDetector,
}

impl SpectralFeatureExtractor {
    pub fn new(sample_rate: f32, bin_count: usize, config: &AudioConfig) -> Self {
        let spectrum_bands = config.spectrum_bands.max(1);
        Self {
            sample_rate,
            layout: BandLayout::new(sample_rate, bin_count),
            buckets: spectrum_buckets(spectrum_bands, bin_count),
            spectrum_bands,
            smoothing: clamp_unit(config.smoothing),
            smoothed: FrequencyBands::default(),
            smoothed_average: 0.0,
            normalizer: FeatureNormalizer::new(config.adaptive_gain, config.envelope_decay),
            beat_detector: BeatDetector::new(config.beat_threshold, config.beat_cooldown_ms),
        }
    }

    /// Extract one frame of features from `bins` sampled at `now_ms`.
    pub fn process(&mut self, bins: &[u8], now_ms: f64) -> AudioFrame {
        if bins.is_empty() {
            return AudioFrame::silent(self.spectrum_bands);
        }
        if bins.len() != self.layout.bin_count {
            debug!(
                "Bin count changed {} -> {}, rebuilding band layout",
                self.layout.bin_count,
                bins.len()
            );
            self.layout = BandLayout::new(self.sample_rate, bins.len());
            self.buckets = spectrum_buckets(self.spectrum_bands, bins.len());
        }

        let k = self.smoothing;
        let raw = FrequencyBands {
            bass: self.layout.bass.level(bins),
            mid: self.layout.mid.level(bins),
            treble: self.layout.treble.level(bins),
        };
        let raw_average = bins.iter().map(|&b| b as u32).sum::<u32>() as f32 / bins.len() as f32 / 255.0;

        self.smoothed.bass = exp_smooth(self.smoothed.bass, raw.bass, k);
        self.smoothed.mid = exp_smooth(self.smoothed.mid, raw.mid, k);
        self.smoothed.treble = exp_smooth(self.smoothed.treble, raw.treble, k);
        self.smoothed_average = exp_smooth(self.smoothed_average, raw_average, k);

        let frequency_bands = FrequencyBands {
            bass: self.normalizer.normalize(Feature::Bass, self.smoothed.bass),
            mid: self.normalizer.normalize(Feature::Mid, self.smoothed.mid),
            treble: self.normalizer.normalize(Feature::Treble, self.smoothed.treble),
        };
        let energy = self.normalizer.normalize(Feature::Energy, self.smoothed_average);

        let beat_energy = self.layout.beat.level(bins);
        let beat_detected = self.beat_detector.detect_beat(beat_energy, now_ms);

        AudioFrame {
            frequency_bands,
            energy,
            beat_detected,
            spectrum: self.spectrum(bins),
        }
    }

    fn spectrum(&mut self, bins: &[u8]) -> Vec<f32> {
        let mut bands: Vec<f32> = self.buckets.iter().map(|bucket| bucket.level(bins)).collect();
        self.normalizer.normalize_spectrum(&mut bands);
        bands
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn spectrum_bands(&self) -> usize {
        self.spectrum_bands
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = clamp_unit(smoothing);
    }

    pub fn set_beat_threshold(&mut self, threshold: f32) {
        self.beat_detector.set_threshold(threshold);
    }

    pub fn set_beat_cooldown_ms(&mut self, cooldown_ms: f64) {
        self.beat_detector.set_cooldown_ms(cooldown_ms);
    }

    pub fn set_adaptive_gain(&mut self, adaptive: bool) {
        self.normalizer.set_adaptive(adaptive);
    }

    pub fn set_envelope_decay(&mut self, decay: f32) {
        self.normalizer.set_decay(decay);
    }

    pub fn set_spectrum_bands(&mut self, bands: usize) {
        self.spectrum_bands = bands.clamp(1, 256);
        self.buckets = spectrum_buckets(self.spectrum_bands, self.layout.bin_count);
    }

    /// Forget all smoothing, envelope and beat history.
    pub fn reset(&mut self) {
        self.smoothed = FrequencyBands::default();
        self.smoothed_average = 0.0;
        self.normalizer.reset();
        self.beat_detector.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(adaptive: bool) -> SpectralFeatureExtractor {
        let config = AudioConfig {
            adaptive_gain: adaptive,
            ..AudioConfig::default()
        };
        SpectralFeatureExtractor::new(44100.0, 1024, &config)
    }

    #[test]
    fn test_band_layout_for_default_analyser() {
        let layout = BandLayout::new(44100.0, 1024);
        // 22050 Hz over 1024 bins is ~21.5 Hz per bin
        assert_eq!(layout.bass, BandRange { start: 0, end: 11 });
        assert_eq!(layout.mid, BandRange { start: 11, end: 185 });
        assert_eq!(layout.treble.start, 185);
        assert_eq!(layout.treble.end, 928);
        assert_eq!(layout.beat, BandRange { start: 0, end: 23 });
    }

    #[test]
    fn test_treble_is_clipped_to_available_bins() {
        let layout = BandLayout::new(32000.0, 256);
        assert_eq!(layout.treble.end, 256);
        assert!(!layout.treble.is_empty());
    }

    #[test]
    fn test_quadratic_buckets_favour_low_end() {
        let buckets = spectrum_buckets(32, 1024);
        assert_eq!(buckets.len(), 32);
        assert_eq!(buckets[0], BandRange { start: 0, end: 1 });
        assert_eq!(buckets[31].end, 1024);
        assert!(buckets[1].len() < buckets[30].len());
        for pair in buckets.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_flat_spectrum_converges_without_beats() {
        let mut extractor = extractor(false);
        let bins = vec![128u8; 1024];
        let mut frame = AudioFrame::default();
        for tick in 0..300 {
            frame = extractor.process(&bins, tick as f64 * 1000.0 / 60.0);
            assert!(!frame.beat_detected, "beat fired at tick {}", tick);
        }
        let target = 128.0 / 255.0;
        assert!((frame.frequency_bands.bass - target).abs() < 0.01);
        assert!((frame.frequency_bands.mid - target).abs() < 0.01);
        assert!((frame.frequency_bands.treble - target).abs() < 0.01);
        assert!((frame.energy - target).abs() < 0.01);
        assert!(frame.spectrum.iter().all(|&b| (b - target).abs() < 1e-6));
    }

    #[test]
    fn test_adaptive_outputs_stay_in_range() {
        let mut extractor = extractor(true);
        let mut bins = vec![0u8; 1024];
        for tick in 0..400 {
            let level = ((tick * 37) % 256) as u8;
            bins.iter_mut().enumerate().for_each(|(i, b)| *b = level.wrapping_add(i as u8));
            let frame = extractor.process(&bins, tick as f64 * 16.0);
            for value in [
                frame.frequency_bands.bass,
                frame.frequency_bands.mid,
                frame.frequency_bands.treble,
                frame.energy,
            ] {
                assert!((0.0..=1.0).contains(&value));
            }
            assert!(frame.spectrum.iter().all(|b| (0.0..=1.0).contains(b)));
        }
    }

    #[test]
    fn test_kick_on_low_end_fires_beat() {
        let mut extractor = extractor(true);
        let quiet = vec![20u8; 1024];
        for tick in 0..60 {
            extractor.process(&quiet, tick as f64 * 16.0);
        }
        let mut kick = quiet.clone();
        kick[..23].iter_mut().for_each(|b| *b = 220);
        let frame = extractor.process(&kick, 60.0 * 16.0);
        assert!(frame.beat_detected);
    }

    #[test]
    fn test_empty_buffer_is_silent() {
        let mut extractor = extractor(true);
        let frame = extractor.process(&[], 0.0);
        assert_eq!(frame, AudioFrame::silent(32));
    }
}
