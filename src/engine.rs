//! Decode-engine contract
//!
//! The protocol-decoder runtime is an external collaborator: it accepts raw
//! sample chunks for a range of absolute sample numbers and synchronously
//! emits annotation events through a registered callback while a feed call is
//! in progress. This module defines the narrow trait surface the pipeline
//! drives it through, plus the process-wide serialization handle that keeps
//! concurrent pipelines from entering the engine at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::decode::decoder::DecoderSchema;
use crate::decode::row::DecoderId;

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to create decode session: {0}")]
    Session(String),

    #[error("failed to create instance for decoder '{0}'")]
    Instance(String),

    #[error("feed rejected for samples {start}..{end}: {reason}")]
    Feed { start: u64, end: u64, reason: String },
}

/// Opaque handle to one live decoder instance inside an engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub u64);

/// Everything an engine needs to instantiate one decoder
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    /// Stable identity the engine echoes back in every annotation this
    /// instance emits
    pub decoder: DecoderId,
    /// Declared protocol schema
    pub schema: DecoderSchema,
    /// Channel id to sample bit index, for every bound channel
    pub probes: HashMap<String, u32>,
}

/// Raw annotation event emitted by the engine during a feed call
#[derive(Debug, Clone)]
pub struct EngineAnnotation {
    pub decoder: DecoderId,
    /// First sample covered (inclusive)
    pub start_sample: u64,
    /// One past the last sample covered (exclusive)
    pub end_sample: u64,
    /// Annotation class id within the emitting decoder's schema
    pub class: u32,
    /// Text representations ordered from most to least verbose
    pub texts: Vec<String>,
}

/// Callback invoked synchronously on the decode thread for every annotation
/// the engine emits
pub type AnnotationSink = Box<dyn FnMut(EngineAnnotation) + Send>;

/// One decode session.
///
/// The call sequence a pipeline run performs is fixed: `create_instance` for
/// each stacked decoder (chained with `stack_instance`), `set_metadata`,
/// `register_annotation_callback`, `start`, then any number of `feed` calls.
/// Dropping the session tears it down.
pub trait EngineSession: Send {
    /// Create a live decoder instance from its spec
    fn create_instance(&mut self, spec: &InstanceSpec) -> Result<InstanceHandle, EngineError>;

    /// Link `parent`'s output stream to `child`'s input
    fn stack_instance(
        &mut self,
        parent: InstanceHandle,
        child: InstanceHandle,
    ) -> Result<(), EngineError>;

    /// Provide the capture samplerate before starting
    fn set_metadata(&mut self, samplerate: f64);

    /// Register the sink that receives annotation events during `feed`
    fn register_annotation_callback(&mut self, sink: AnnotationSink);

    /// Start the session; must be called before the first `feed`
    fn start(&mut self) -> Result<(), EngineError>;

    /// Feed raw samples for `[start_sample, end_sample)`.
    ///
    /// `data` holds `(end_sample - start_sample) * unit_size` bytes. The
    /// engine calls the registered sink zero or more times before returning.
    fn feed(
        &mut self,
        start_sample: u64,
        end_sample: u64,
        data: &[u8],
        unit_size: usize,
    ) -> Result<(), EngineError>;
}

/// Factory for decode sessions
pub trait DecodeEngine: Send + Sync {
    fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// Serialization handle for engine access.
///
/// The engine is not safe for concurrent multi-run use, so every pipeline in
/// a process must share one `EngineLock` (clones share the underlying lock).
/// A decode run holds the lock for its entire engine usage, not per call.
#[derive(Clone, Default)]
pub struct EngineLock {
    inner: Arc<Mutex<()>>,
}

impl EngineLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap()
    }
}
