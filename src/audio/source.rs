use log::info;
use std::path::Path;

use crate::error::{SourceError, SourceKind};

/// A live or recorded mono sample stream polled once per tick.
///
/// `read_samples` must never block: it appends whatever has arrived since
/// the last call and returns.
pub trait AudioSource: Send {
    fn kind(&self) -> SourceKind;

    fn sample_rate(&self) -> f32;

    fn read_samples(&mut self, out: &mut Vec<f32>);

    fn name(&self) -> &str;
}

/// Decoded WAV file replayed at real-time pace, one tick's worth of samples
/// per read, looping at the end.
pub struct WavFileSource {
    name: String,
    samples: Vec<f32>,
    sample_rate: f32,
    position: usize,
    samples_per_tick: usize,
}

impl WavFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)
            .map_err(|e| SourceError::unavailable(SourceKind::AudioFile, format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| SourceError::Decode(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| SourceError::Decode(e.to_string()))?
            }
        };

        // Mix down to mono for analysis
        let samples: Vec<f32> = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        if samples.is_empty() {
            return Err(SourceError::unavailable(SourceKind::AudioFile, format!("{} holds no samples", path.display())));
        }

        info!(
            "Loaded {} ({} Hz, {} channels, {:.1}s)",
            path.display(),
            spec.sample_rate,
            channels,
            samples.len() as f32 / spec.sample_rate as f32
        );

        Ok(Self::from_samples(
            path.display().to_string(),
            samples,
            spec.sample_rate as f32,
        ))
    }

    pub fn from_samples(name: impl Into<String>, samples: Vec<f32>, sample_rate: f32) -> Self {
        Self {
            name: name.into(),
            samples,
            sample_rate,
            position: 0,
            samples_per_tick: ((sample_rate / 60.0).round() as usize).max(1),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl AudioSource for WavFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::AudioFile
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn read_samples(&mut self, out: &mut Vec<f32>) {
        if self.samples.is_empty() {
            return;
        }
        let mut remaining = self.samples_per_tick;
        while remaining > 0 {
            let end = (self.position + remaining).min(self.samples.len());
            out.extend_from_slice(&self.samples[self.position..end]);
            remaining -= end - self.position;
            self.position = if end == self.samples.len() { 0 } else { end };
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
