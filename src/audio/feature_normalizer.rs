use crate::config::clamp_unit;

/// Envelope spans narrower than this fall back to the raw clamped value.
pub const MIN_ENVELOPE_RANGE: f32 = 0.001;

/// One step of exponential smoothing: `previous * k + raw * (1 - k)`.
///
/// `k = 0` passes the raw value straight through, `k = 1` freezes the
/// previous value.
#[inline]
pub fn exp_smooth(previous: f32, raw: f32, k: f32) -> f32 {
    previous * k + raw * (1.0 - k)
}

/// Running `[min, max]` loudness envelope used for adaptive gain.
///
/// Each update first relaxes both edges toward their midpoint by `decay`
/// so the envelope follows long-term level changes, then widens it to
/// include the new observation.
#[derive(Debug, Clone, Default)]
pub struct LoudnessEnvelope {
    range: Option<(f32, f32)>,
}

impl LoudnessEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f32, decay: f32) {
        self.update_batch(std::slice::from_ref(&value), decay);
    }

    /// Decay once, then widen to cover every finite value in `values`.
    pub fn update_batch(&mut self, values: &[f32], decay: f32) {
        let mut finite = values.iter().copied().filter(|v| v.is_finite());
        let Some(first) = finite.next() else {
            return;
        };

        let (mut lo, mut hi) = match self.range {
            Some((lo, hi)) => {
                let mid = (lo + hi) * 0.5;
                (mid + (lo - mid) * decay, mid + (hi - mid) * decay)
            }
            None => (first, first),
        };
        lo = lo.min(first);
        hi = hi.max(first);
        for v in finite {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        self.range = Some((lo, hi));
    }

    /// Map a value into the current envelope, clamped to `[0,1]`.
    pub fn map(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return 0.0;
        }
        match self.range {
            Some((lo, hi)) if hi - lo >= MIN_ENVELOPE_RANGE => clamp_unit((value - lo) / (hi - lo)),
            _ => clamp_unit(value),
        }
    }

    pub fn normalize(&mut self, value: f32, decay: f32) -> f32 {
        self.update(value, decay);
        self.map(value)
    }

    pub fn range(&self) -> Option<(f32, f32)> {
        self.range
    }

    pub fn reset(&mut self) {
        self.range = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Bass,
    Mid,
    Treble,
    Energy,
}

/// Adaptive gain control for every scalar audio feature plus the display
/// spectrum.
///
/// With adaptive gain disabled every value is just clamped to `[0,1]`.
#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    adaptive: bool,
    decay: f32,
    bass: LoudnessEnvelope,
    mid: LoudnessEnvelope,
    treble: LoudnessEnvelope,
    energy: LoudnessEnvelope,
    spectrum: LoudnessEnvelope,
}

impl FeatureNormalizer {
    pub fn new(adaptive: bool, decay: f32) -> Self {
        Self {
            adaptive,
            decay: decay.clamp(0.9, 1.0),
            bass: LoudnessEnvelope::new(),
            mid: LoudnessEnvelope::new(),
            treble: LoudnessEnvelope::new(),
            energy: LoudnessEnvelope::new(),
            spectrum: LoudnessEnvelope::new(),
        }
    }

    pub fn normalize(&mut self, feature: Feature, value: f32) -> f32 {
        if !self.adaptive {
            return clamp_unit(value);
        }
        let decay = self.decay;
        let envelope = match feature {
            Feature::Bass => &mut self.bass,
            Feature::Mid => &mut self.mid,
            Feature::Treble => &mut self.treble,
            Feature::Energy => &mut self.energy,
        };
        envelope.normalize(value, decay)
    }

    /// Normalize every display band in place against one shared envelope.
    pub fn normalize_spectrum(&mut self, bands: &mut [f32]) {
        if !self.adaptive {
            bands.iter_mut().for_each(|b| *b = clamp_unit(*b));
            return;
        }
        self.spectrum.update_batch(bands, self.decay);
        for band in bands.iter_mut() {
            *band = self.spectrum.map(*band);
        }
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        if adaptive && !self.adaptive {
            self.reset();
        }
        self.adaptive = adaptive;
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.decay = decay.clamp(0.9, 1.0);
    }

    pub fn reset(&mut self) {
        self.bass.reset();
        self.mid.reset();
        self.treble.reset();
        self.energy.reset();
        self.spectrum.reset();
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new(true, 0.999)
    }
}
