//! Streaming protocol-decode pipeline for live logic captures
//!
//! This library turns a growing, possibly still-being-captured sequence of
//! raw sampled logic signals into an incrementally updated, queryable set of
//! typed annotations organized into named rows, while other threads
//! concurrently read the results already produced.
//!
//! # Architecture
//!
//! - **Signals & segments**: decoder channels bind to [`LogicSignal`]s; a
//!   signal may hold a [`Segment`] of captured samples that is still growing
//! - **Decoder stack**: ordered protocol decoders, each instance's output
//!   chained into the next (e.g. byte framing feeding a higher protocol)
//! - **Engine**: the external decoder runtime, driven through the
//!   [`DecodeEngine`] feed/callback contract and serialized process-wide by
//!   an [`EngineLock`]
//! - **Pipeline**: a dedicated decode thread feeds bounded chunks and
//!   blocks on a wait condition until the capture side reports more data,
//!   frame completion, or a stop
//! - **Rows**: annotations are classified into per-decoder rows supporting
//!   overlap range queries at any time during a run
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sigdec::{DecodePipeline, DecodeEvent, EngineLock, LogicSignal};
//! # use sigdec::{DecodeEngine, DecoderSchema, EngineError, EngineSession};
//! # struct MyEngine;
//! # impl DecodeEngine for MyEngine {
//! #     fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError> { unimplemented!() }
//! # }
//! # fn uart_schema() -> DecoderSchema { unimplemented!() }
//!
//! let mut pipeline = DecodePipeline::new(Arc::new(MyEngine), EngineLock::new());
//! pipeline.push(uart_schema());
//! pipeline.bind_channel(0, "rx", Arc::new(LogicSignal::new("D0", 0)))?;
//!
//! let events = pipeline.subscribe();
//! pipeline.begin_decode();
//! while let Ok(event) = events.recv() {
//!     if event == DecodeEvent::Finished {
//!         break;
//!     }
//!     for row in pipeline.visible_rows() {
//!         let _latest = pipeline.annotation_subset(row.id(), 0, pipeline.samples_decoded());
//!     }
//! }
//! # Ok::<(), sigdec::DecodeError>(())
//! ```

pub mod decode;
pub mod engine;
pub mod signal;

// Re-export the decode pipeline surface
pub use decode::{
    Annotation, AnnotationClass, CaptureHandle, ChannelSpec, DEFAULT_CHUNK_LENGTH,
    DEFAULT_NOTIFY_PERIOD, DecodeError, DecodeEvent, DecodePipeline, Decoder, DecoderId,
    DecoderSchema, Row, RowData, RowId, RowSpec,
};

// Re-export the collaborator contracts
pub use engine::{
    AnnotationSink, DecodeEngine, EngineAnnotation, EngineError, EngineLock, EngineSession,
    InstanceHandle, InstanceSpec,
};
pub use signal::{CaptureState, LogicSignal, MemorySegment, Segment};
