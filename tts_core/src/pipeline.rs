//! End-to-end run: tokens in, audio out.
//!
//! A run drives two paths over one session at the same time. The send path
//! chunks the token stream and pushes frames to the service; the receive path
//! drains decoded audio into the sink. The first failure on either path drops
//! the other, then the session and the sink are shut down.
use futures_core::Stream;
use futures_util::{StreamExt, TryFutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::chunker::chunk_text;
use crate::config::SynthesisConfig;
use crate::error::{PipelineError, Result, TtsError};
use crate::session::{SessionHandle, SessionSender};
use crate::sink::{play, AudioSink};
use crate::timing::PlaybackTiming;

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: SynthesisConfig,
}

impl Pipeline {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Open a session, falling back to the configured voice.
    pub async fn open(&self, voice_id: Option<&str>) -> Result<SessionHandle, PipelineError> {
        let voice_id = voice_id.unwrap_or(&self.config.default_voice_id);
        SessionHandle::open(voice_id, &self.config)
            .await
            .map_err(PipelineError::Open)
    }

    /// Run one request end to end.
    ///
    /// Time to first audio is measured from the moment this is called.
    pub async fn run<S, K>(
        &self,
        tokens: S,
        voice_id: Option<&str>,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<PlaybackTiming, PipelineError>
    where
        S: Stream<Item = anyhow::Result<Option<String>>> + Send,
        K: AudioSink + ?Sized,
    {
        let timing = PlaybackTiming::start();
        let session = tokio::select! {
            session = self.open(voice_id) => session,
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        };
        match session {
            Ok(session) => drive(session, tokens, sink, timing, cancel).await,
            Err(e) => {
                sink.abort().await;
                Err(e)
            }
        }
    }
}

/// Drive an already open session until both paths finish, one fails, or
/// `cancel` fires. The session is closed in every case.
pub async fn drive<S, K>(
    mut session: SessionHandle,
    tokens: S,
    sink: &mut K,
    mut timing: PlaybackTiming,
    cancel: &CancellationToken,
) -> Result<PlaybackTiming, PipelineError>
where
    S: Stream<Item = anyhow::Result<Option<String>>> + Send,
    K: AudioSink + ?Sized,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("pipeline", %run_id, voice_id = %session.voice_id());

    async move {
        let outcome = {
            let (sender, receiver) = session.split();
            let send_path = send_text(tokens, sender).map_err(PipelineError::Send);
            let receive_path = play(receiver.frames(), &mut *sink, &mut timing).map_err(PipelineError::Receive);
            tokio::select! {
                joined = async { tokio::try_join!(send_path, receive_path) } => joined.map(|(sent, ())| sent),
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            }
        };

        match outcome {
            Ok(sent) => {
                session.close().await;
                timing.finish();
                info!(
                    frames_sent = sent,
                    audio_frames = timing.frames,
                    audio_bytes = timing.bytes,
                    ttfa_ms = timing.time_to_first_audio().map(|d| d.as_millis() as u64),
                    "Pipeline run complete"
                );
                Ok(timing)
            }
            Err(e) => {
                match &e {
                    PipelineError::Cancelled => info!("Pipeline run cancelled"),
                    other => warn!("Pipeline run failed: {other}"),
                }
                if let Err(close_err) = session.close_send().await {
                    debug!("Closing send side during cleanup failed: {close_err}");
                }
                session.close().await;
                sink.abort().await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Chunk `tokens` and send every frame, then close the send side.
///
/// Fails with `SessionClosed` if the session closes while tokens are still
/// outstanding.
async fn send_text<S>(tokens: S, sender: &mut SessionSender) -> Result<usize>
where
    S: Stream<Item = anyhow::Result<Option<String>>>,
{
    let frames = chunk_text(tokens);
    futures_util::pin_mut!(frames);

    let mut sent = 0usize;
    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            _ = sender.closed() => {
                return Err(TtsError::SessionClosed(
                    "session closed before the token stream ended".into(),
                ))
            }
        };
        let Some(frame) = next else { break };
        let frame = frame.map_err(|e| TtsError::Upstream(format!("{e:#}")))?;
        sender.send_frame(&frame).await?;
        sent += 1;
    }
    sender.close_send().await?;
    debug!(frames = sent, "Send path complete");
    Ok(sent)
}
