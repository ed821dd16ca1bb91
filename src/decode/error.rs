//! Error types for decode runs
//!
//! Everything that can stop a run early funnels into [`DecodeError`]; the
//! pipeline keeps the first one recorded per run and exposes it to readers
//! as a message. Classification misses and cancellation are intentionally
//! not represented here: the former drops a single annotation and continues,
//! the latter is a silent clean shutdown.

use crate::engine::EngineError;

/// Error type for a decode run
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A decoder in the stack declares channels that were never bound
    #[error("one or more required channels have not been specified")]
    MissingChannels,

    /// Engine session or instance setup failed before any feeding happened
    #[error("failed to create decoder instance: {0}")]
    CreateInstance(#[source] EngineError),

    /// The engine rejected a chunk mid-run; results up to the previous chunk
    /// boundary remain valid
    #[error("decoder reported an error: {0}")]
    Feed(#[source] EngineError),

    /// Stack position out of range
    #[error("decoder index {0} out of range")]
    StackIndex(usize),
}
