//! Audio destinations.
//!
//! [`AudioSink`] is the capability the pipeline writes decoded audio into. The
//! reference destination is an external player fed through its stdin
//! ([`PlayerSink`]); [`ChannelSink`] hands frames to another task (for example
//! an HTTP response body) and [`BufferSink`] keeps them in memory.
use std::process::Stdio;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TtsError};
use crate::timing::PlaybackTiming;

/// Destination for raw audio bytes.
#[async_trait]
pub trait AudioSink: Send {
    /// Forward one frame. Waits while the destination applies backpressure.
    async fn write(&mut self, frame: &[u8]) -> Result<()>;

    /// Orderly shutdown: flush, signal end of input, wait for the destination
    /// to finish. Idempotent.
    async fn close(&mut self) -> Result<()>;

    /// Tear the destination down without waiting for playback. Idempotent.
    async fn abort(&mut self) {
        if let Err(e) = self.close().await {
            debug!("Error while aborting {}: {e}", self.name());
        }
    }

    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Drain `frames` into `sink` in arrival order, then close the sink.
///
/// Empty frames are skipped. The first non-empty frame is stamped on `timing`.
pub async fn play<S, K>(frames: S, sink: &mut K, timing: &mut PlaybackTiming) -> Result<()>
where
    S: Stream<Item = Result<Vec<u8>>>,
    K: AudioSink + ?Sized,
{
    futures_util::pin_mut!(frames);
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        if frame.is_empty() {
            continue;
        }
        if timing.record_frame(frame.len()) {
            if let Some(ttfa) = timing.time_to_first_audio() {
                info!(ttfa_ms = ttfa.as_millis() as u64, "Time to first audio: {:.2} seconds", ttfa.as_secs_f64());
            }
        }
        sink.write(&frame).await?;
    }
    debug!(frames = timing.frames, bytes = timing.bytes, sink = sink.name(), "Audio stream complete");
    sink.close().await
}

/// Plays audio through an external process reading from stdin.
pub struct PlayerSink {
    program: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl PlayerSink {
    /// `ffplay` without a window, exiting once stdin is drained.
    pub fn ffplay() -> Result<Self> {
        Self::spawn("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet", "-"])
    }

    pub fn spawn(program: &str, args: &[&str]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TtsError::Sink(format!(
                    "{program} not found, necessary to stream audio. Install it or set PLAYER_COMMAND"
                )),
                _ => TtsError::Sink(format!("failed to start {program}: {e}")),
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TtsError::Sink(format!("{program} has no stdin")))?;
        debug!(program, "Started audio player");
        Ok(Self {
            program: program.to_string(),
            child: Some(child),
            stdin: Some(stdin),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.stdin.is_none() && self.child.is_none()
    }
}

#[async_trait]
impl AudioSink for PlayerSink {
    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TtsError::Sink(format!("{} input already closed", self.program)))?;
        stdin
            .write_all(frame)
            .await
            .map_err(|e| TtsError::Sink(format!("write to {} failed: {e}", self.program)))?;
        stdin
            .flush()
            .await
            .map_err(|e| TtsError::Sink(format!("flush to {} failed: {e}", self.program)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush().await {
                warn!("Flushing {} failed: {e}", self.program);
            }
            // Dropping stdin delivers EOF to the player.
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .await
            .map_err(|e| TtsError::Sink(format!("waiting for {} failed: {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(TtsError::Sink(format!("{} exited with {status}", self.program)))
        }
    }

    async fn abort(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("Killing {} failed: {e}", self.program);
            }
            if let Err(e) = child.wait().await {
                debug!("Reaping {} failed: {e}", self.program);
            }
        }
    }

    fn name(&self) -> &'static str {
        "player"
    }
}

/// Forwards frames into a bounded channel.
///
/// A full channel blocks the writer; a dropped receiver is a sink failure.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

#[async_trait]
impl AudioSink for ChannelSink {
    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TtsError::Sink("channel already closed".into()))?;
        tx.send(frame.to_vec())
            .await
            .map_err(|_| TtsError::Sink("audio receiver went away".into()))
    }

    async fn close(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Collects audio in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    data: Vec<u8>,
    frames: Vec<usize>,
    closed: bool,
    aborted: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of every frame written, in order.
    pub fn frame_sizes(&self) -> &[usize] {
        &self.frames
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[async_trait]
impl AudioSink for BufferSink {
    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TtsError::Sink("buffer already closed".into()));
        }
        self.data.extend_from_slice(frame);
        self.frames.push(frame.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn abort(&mut self) {
        self.aborted = true;
        self.closed = true;
    }

    fn name(&self) -> &'static str {
        "buffer"
    }
}
