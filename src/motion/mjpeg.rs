use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures::StreamExt;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::frame::decode_jpeg;
use super::source::{MotionSource, MotionSourceProvider, SourceFrame};
use crate::acquire::acquire;
use crate::error::{Capability, SourceError, SourceKind};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Frames larger than this are assumed corrupt and discarded.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
/// Consecutive decode failures before the stream is treated as display-only.
pub const MAX_DECODE_FAILURES: u32 = 8;
/// Frames buffered between the network task and the render tick.
const FRAME_QUEUE: usize = 2;

/// Incremental splitter for a motion-JPEG byte stream.
///
/// Works on both `multipart/x-mixed-replace` bodies and bare concatenated
/// JPEGs: part headers and boundaries are skipped because only the bytes
/// between an SOI and its matching EOI marker are kept. SOI/EOI pairs
/// nested inside a frame, such as an EXIF thumbnail, stay part of it.
#[derive(Debug, Default)]
pub struct MjpegParser {
    buffer: Vec<u8>,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next network chunk and return every JPEG it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find_marker(&self.buffer, SOI, 0) else {
                // A marker may straddle two chunks
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let len = self.buffer.len();
                self.buffer.drain(..len - keep);
                break;
            };
            if start > 0 {
                self.buffer.drain(..start);
            }

            match find_frame_end(&self.buffer) {
                Some(end) => {
                    let frame: Vec<u8> = self.buffer.drain(..end + EOI.len()).collect();
                    frames.push(frame);
                }
                None => {
                    if self.buffer.len() > MAX_FRAME_BYTES {
                        warn!("MJPEG frame exceeded {} bytes, resynchronising", MAX_FRAME_BYTES);
                        self.buffer.clear();
                    }
                    break;
                }
            }
        }

        frames
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Index of the EOI that closes the SOI at the start of `frame`.
fn find_frame_end(frame: &[u8]) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = SOI.len();
    while i + 1 < frame.len() {
        if frame[i] != 0xFF {
            i += 1;
            continue;
        }
        match [frame[i], frame[i + 1]] {
            SOI => depth += 1,
            EOI => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    None
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}

/// Remote MJPEG-over-HTTP endpoint that has not been opened yet.
#[derive(Debug, Clone)]
pub struct MjpegEndpoint {
    pub url: String,
    /// Pixel access is not permitted for this endpoint
    pub display_only: bool,
}

#[async_trait]
impl MotionSourceProvider for MjpegEndpoint {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteStream
    }

    async fn open(&self, timeout: Duration) -> Result<Box<dyn MotionSource>, SourceError> {
        let stream = MjpegStream::connect(&self.url, self.display_only, timeout).await?;
        Ok(Box::new(stream))
    }
}

/// A connected MJPEG stream.
///
/// A tokio task reads the HTTP body, splits it into JPEGs and hands frames
/// over a small channel that always holds the most recent ones.
pub struct MjpegStream {
    url: String,
    receiver: Receiver<SourceFrame>,
    display_only: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl MjpegStream {
    pub async fn connect(url: &str, display_only: bool, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().build()?;
        let response = acquire(SourceKind::RemoteStream, timeout, async {
            let response = client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(SourceError::unavailable(
                    SourceKind::RemoteStream,
                    format!("HTTP {}", response.status()),
                ));
            }
            Ok(response)
        })
        .await?;

        let (sender, receiver) = crossbeam_channel::bounded(FRAME_QUEUE);
        let display_only = Arc::new(AtomicBool::new(display_only));
        let task = tokio::spawn(pump_frames(
            response,
            sender,
            receiver.clone(),
            display_only.clone(),
        ));

        info!(
            "MJPEG stream {} connected ({})",
            url,
            if display_only.load(Ordering::Relaxed) { "display only" } else { "analysed" }
        );
        Ok(Self {
            url: url.to_string(),
            receiver,
            display_only,
            task: Some(task),
        })
    }
}

impl MotionSource for MjpegStream {
    fn kind(&self) -> SourceKind {
        SourceKind::RemoteStream
    }

    fn capability(&self) -> Capability {
        if self.display_only.load(Ordering::Relaxed) {
            Capability::DisplayOnly
        } else {
            Capability::Full
        }
    }

    fn poll_frame(&mut self) -> Option<SourceFrame> {
        let mut newest = None;
        while let Ok(frame) = self.receiver.try_recv() {
            newest = Some(frame);
        }
        newest
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("MJPEG stream {} disconnected", self.url);
        }
        self.receiver = crossbeam_channel::never();
    }

    fn name(&self) -> &str {
        &self.url
    }
}

impl Drop for MjpegStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn pump_frames(
    response: reqwest::Response,
    sender: Sender<SourceFrame>,
    drain: Receiver<SourceFrame>,
    display_only: Arc<AtomicBool>,
) {
    let mut body = response.bytes_stream();
    let mut parser = MjpegParser::new();
    let mut failures = 0u32;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("MJPEG stream read failed: {}", e);
                return;
            }
        };

        for jpeg in parser.push(&chunk) {
            let frame = if display_only.load(Ordering::Relaxed) {
                SourceFrame::Encoded(jpeg)
            } else {
                match decode_jpeg(&jpeg) {
                    Ok(pixels) => {
                        failures = 0;
                        SourceFrame::Pixels(pixels)
                    }
                    Err(e) => {
                        failures += 1;
                        warn!("Skipping MJPEG frame: {}", e);
                        if failures >= MAX_DECODE_FAILURES {
                            warn!("{} consecutive decode failures, stream is now display-only", failures);
                            display_only.store(true, Ordering::Relaxed);
                        }
                        continue;
                    }
                }
            };

            if !offer_latest(&sender, &drain, frame) {
                return;
            }
        }
    }

    info!("MJPEG stream ended");
}

/// Queue a frame, evicting the oldest when full. False once the consumer
/// is gone.
fn offer_latest(sender: &Sender<SourceFrame>, drain: &Receiver<SourceFrame>, frame: SourceFrame) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            let _ = drain.try_recv();
            !matches!(sender.try_send(frame), Err(TrySendError::Disconnected(_)))
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
