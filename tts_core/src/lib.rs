//! Streaming text-to-speech pipeline.
//!
//! Tokens from a language model are cut into speakable frames
//! ([`chunker`]), streamed to a websocket synthesis service ([`session`]),
//! and the audio coming back is forwarded to a playback destination
//! ([`sink`]) while the time to first audio is measured ([`timing`]).
//! [`Pipeline`] runs both directions concurrently for one request.
pub mod chunker;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod timing;

pub use chunker::{chunk_text, TextChunker, BOUNDARY_CHARS};
pub use config::SynthesisConfig;
pub use error::{PipelineError, TtsError};
pub use pipeline::{drive, Pipeline};
pub use protocol::VoiceSettings;
pub use session::{SessionHandle, SessionReceiver, SessionSender, SessionState};
pub use sink::{play, AudioSink, BufferSink, ChannelSink, PlayerSink};
pub use timing::{PlaybackTiming, TimingReport};

pub use tokio_util::sync::CancellationToken;
