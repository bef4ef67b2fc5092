use std::time::Duration;

use super::AudioSource;
use crate::error::SourceError;
#[cfg(not(feature = "live-input"))]
use crate::error::SourceKind;

/// Open the default input device, giving up after `timeout`.
pub async fn acquire_microphone(timeout: Duration) -> Result<Box<dyn AudioSource>, SourceError> {
    #[cfg(feature = "live-input")]
    {
        let source = live::MicrophoneSource::acquire(timeout).await?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "live-input"))]
    {
        let _ = timeout;
        Err(SourceError::unavailable(
            SourceKind::Microphone,
            "built without the live-input feature",
        ))
    }
}

#[cfg(feature = "live-input")]
pub use live::MicrophoneSource;

#[cfg(feature = "live-input")]
mod live {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, Stream, StreamConfig};
    use crossbeam_channel::{Receiver, Sender, TrySendError};
    use log::{info, warn};
    use std::thread::JoinHandle;
    use std::time::Duration;
    use tokio::sync::oneshot;

    use crate::acquire::acquire;
    use crate::audio::AudioSource;
    use crate::error::{SourceError, SourceKind};

    /// Live microphone input.
    ///
    /// The cpal stream lives on its own capture thread and forwards mono
    /// chunks over a bounded channel. Dropping the source closes the stop
    /// channel and joins the thread, which drops the stream on its way out.
    pub struct MicrophoneSource {
        name: String,
        receiver: Receiver<Vec<f32>>,
        sample_rate: f32,
        stop: Option<Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl MicrophoneSource {
        pub async fn acquire(timeout: Duration) -> Result<Self, SourceError> {
            let (ready_tx, ready_rx) = oneshot::channel::<Result<(String, f32), SourceError>>();
            let (sample_tx, sample_rx) = crossbeam_channel::bounded(64);
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

            let thread = std::thread::Builder::new()
                .name("microphone-capture".to_string())
                .spawn(move || capture_thread(sample_tx, stop_rx, ready_tx))?;

            // On failure stop_tx drops on return and the detached capture
            // thread tears the stream down.
            let (name, sample_rate) = acquire(SourceKind::Microphone, timeout, async move {
                ready_rx
                    .await
                    .map_err(|_| SourceError::unavailable(SourceKind::Microphone, "capture thread exited"))?
            })
            .await?;

            Ok(Self {
                name,
                receiver: sample_rx,
                sample_rate,
                stop: Some(stop_tx),
                thread: Some(thread),
            })
        }
    }

    impl Drop for MicrophoneSource {
        fn drop(&mut self) {
            // Closing the stop channel wakes the capture thread
            self.stop.take();
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("Microphone capture thread panicked");
                }
            }
        }
    }

    impl AudioSource for MicrophoneSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Microphone
        }

        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }

        fn read_samples(&mut self, out: &mut Vec<f32>) {
            while let Ok(chunk) = self.receiver.try_recv() {
                out.extend_from_slice(&chunk);
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn capture_thread(
        sender: Sender<Vec<f32>>,
        stop: Receiver<()>,
        ready: oneshot::Sender<Result<(String, f32), SourceError>>,
    ) {
        let opened = open_default_input(sender);
        let (stream, name, sample_rate) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };

        if ready.send(Ok((name, sample_rate))).is_err() {
            // Acquisition was cancelled while the device was opening
            return;
        }

        // Blocks until the source is dropped
        let _ = stop.recv();
        drop(stream);
        info!("Microphone capture stopped");
    }

    fn open_default_input(sender: Sender<Vec<f32>>) -> Result<(Stream, String, f32), SourceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SourceError::unavailable(SourceKind::Microphone, "no input device available"))?;

        let config = device.default_input_config().map_err(|e| {
            SourceError::unavailable(SourceKind::Microphone, format!("failed to get default input config: {}", e))
        })?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", name);
        info!("Audio config: {:?}", config);

        let sample_rate = config.sample_rate().0 as f32;
        let stream = create_input_stream(&device, &config.into(), sender)?;
        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => SourceError::PermissionDenied {
                kind: SourceKind::Microphone,
            },
            other => SourceError::unavailable(SourceKind::Microphone, other.to_string()),
        })?;

        Ok((stream, name, sample_rate))
    }

    fn create_input_stream(
        device: &Device,
        config: &StreamConfig,
        sender: Sender<Vec<f32>>,
    ) -> Result<Stream, SourceError> {
        let channels = config.channels as usize;

        device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };

                    // The tick loop drains every frame; a full queue means it stalled
                    if let Err(TrySendError::Full(_)) = sender.try_send(mono) {
                        warn!("Microphone queue full, dropping chunk");
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SourceError::unavailable(SourceKind::Microphone, e.to_string()))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        #[test]
        fn test_drop_stops_and_joins_capture_thread() {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            let (_sample_tx, sample_rx) = crossbeam_channel::bounded(1);
            let finished = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&finished);
            let thread = std::thread::spawn(move || {
                let _ = stop_rx.recv();
                std::thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::SeqCst);
            });

            let source = MicrophoneSource {
                name: "test".to_string(),
                receiver: sample_rx,
                sample_rate: 48000.0,
                stop: Some(stop_tx),
                thread: Some(thread),
            };
            drop(source);
            assert!(finished.load(Ordering::SeqCst));
        }
    }
}
