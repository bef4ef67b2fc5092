use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use log::{debug, info};
use std::time::Duration;

use super::frame::VideoFrame;
use crate::acquire::acquire;
use crate::error::{Capability, SourceError, SourceKind};
use crate::grid::Grid;

/// How long the camera acquisition sleeps between checks for a first frame.
const FIRST_FRAME_POLL: Duration = Duration::from_millis(5);

/// One frame handed from a motion source to the extractor.
#[derive(Debug, Clone)]
pub enum SourceFrame {
    /// Decoded pixels; motion analysis runs on these
    Pixels(VideoFrame),
    /// Encoded bytes that may only be displayed, never analysed
    Encoded(Vec<u8>),
}

/// A connected video input polled once per tick.
pub trait MotionSource: Send {
    fn kind(&self) -> SourceKind;

    fn capability(&self) -> Capability;

    /// Newest frame since the previous poll. Older queued frames are
    /// discarded. Never blocks.
    fn poll_frame(&mut self) -> Option<SourceFrame>;

    /// Release the underlying device or connection. After this returns no
    /// further frames are produced.
    fn disconnect(&mut self);

    fn name(&self) -> &str;
}

/// Something that can open a [`MotionSource`] within a deadline.
#[async_trait]
pub trait MotionSourceProvider: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn open(&self, timeout: Duration) -> Result<Box<dyn MotionSource>, SourceError>;
}

/// Create the channel between an external camera capture shell and the
/// pipeline. The shell pushes frames through the sender; the device side
/// opens into a [`CameraFeed`] once the first frame arrives.
pub fn camera_channel(name: impl Into<String>, capacity: usize) -> (CameraFeedSender, CameraDevice) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (
        CameraFeedSender {
            sender,
            drain: receiver.clone(),
        },
        CameraDevice {
            name: name.into(),
            receiver,
        },
    )
}

/// Producer half held by the camera capture shell.
#[derive(Clone)]
pub struct CameraFeedSender {
    sender: Sender<VideoFrame>,
    drain: Receiver<VideoFrame>,
}

impl CameraFeedSender {
    /// Queue a frame, evicting the oldest one when the queue is full.
    /// Returns false once the feed has been disconnected.
    pub fn send(&self, frame: VideoFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                let _ = self.drain.try_recv();
                !matches!(self.sender.try_send(frame), Err(TrySendError::Disconnected(_)))
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Unopened local camera.
pub struct CameraDevice {
    name: String,
    receiver: Receiver<VideoFrame>,
}

#[async_trait]
impl MotionSourceProvider for CameraDevice {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalCamera
    }

    async fn open(&self, timeout: Duration) -> Result<Box<dyn MotionSource>, SourceError> {
        let receiver = self.receiver.clone();
        let first = acquire(SourceKind::LocalCamera, timeout, async {
            loop {
                match receiver.try_recv() {
                    Ok(frame) => return Ok(frame),
                    Err(TryRecvError::Empty) => tokio::time::sleep(FIRST_FRAME_POLL).await,
                    Err(TryRecvError::Disconnected) => {
                        return Err(SourceError::unavailable(SourceKind::LocalCamera, "capture shell closed"))
                    }
                }
            }
        })
        .await?;

        info!("Camera {} delivering {}x{} frames", self.name, first.width(), first.height());
        Ok(Box::new(CameraFeed {
            name: self.name.clone(),
            receiver,
            pending: Some(first),
        }))
    }
}

/// An opened local camera.
pub struct CameraFeed {
    name: String,
    receiver: Receiver<VideoFrame>,
    pending: Option<VideoFrame>,
}

impl MotionSource for CameraFeed {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalCamera
    }

    fn capability(&self) -> Capability {
        Capability::Full
    }

    fn poll_frame(&mut self) -> Option<SourceFrame> {
        let mut newest = self.pending.take();
        while let Ok(frame) = self.receiver.try_recv() {
            newest = Some(frame);
        }
        newest.map(SourceFrame::Pixels)
    }

    fn disconnect(&mut self) {
        self.pending = None;
        // Dropping our receiver leaves only the sender's eviction handle,
        // so swap in a channel that never yields.
        self.receiver = crossbeam_channel::never();
        info!("Camera {} disconnected", self.name);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Procedural camera for headless runs and benchmarks: a bright square
/// orbiting the frame centre on a dark background.
pub struct SyntheticCamera {
    width: usize,
    height: usize,
    square: usize,
    /// Orbit phase advance per frame, radians
    speed: f32,
    phase: f32,
    connected: bool,
}

impl SyntheticCamera {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            square: (width.min(height) / 6).max(2),
            speed: 0.05,
            phase: 0.0,
            connected: true,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    fn render(&self) -> VideoFrame {
        let mut frame = Grid::filled(self.width, self.height, [16, 16, 24, 255]);
        let radius_x = (self.width / 3) as f32;
        let radius_y = (self.height / 3) as f32;
        let cx = self.width as f32 / 2.0 + radius_x * self.phase.cos();
        let cy = self.height as f32 / 2.0 + radius_y * self.phase.sin();
        let half = (self.square / 2) as f32;
        let x0 = (cx - half).max(0.0) as usize;
        let y0 = (cy - half).max(0.0) as usize;
        for y in y0..(y0 + self.square).min(self.height) {
            for x in x0..(x0 + self.square).min(self.width) {
                frame.set(x, y, [240, 220, 200, 255]);
            }
        }
        frame
    }
}

impl MotionSource for SyntheticCamera {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalCamera
    }

    fn capability(&self) -> Capability {
        Capability::Full
    }

    fn poll_frame(&mut self) -> Option<SourceFrame> {
        if !self.connected {
            return None;
        }
        let frame = self.render();
        self.phase = (self.phase + self.speed) % std::f32::consts::TAU;
        Some(SourceFrame::Pixels(frame))
    }

    fn disconnect(&mut self) {
        debug!("Synthetic camera stopped");
        self.connected = false;
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
