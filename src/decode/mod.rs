//! Decode pipeline core
//!
//! Everything between raw captured samples and queryable annotation rows:
//! the decoder stack, the run controller with its decode thread and
//! wait/resume protocol, per-row annotation storage with range queries,
//! and progress notifications for consumers.

pub mod annotation;
pub mod decoder;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod row;

pub use annotation::{Annotation, RowData};
pub use decoder::{AnnotationClass, ChannelSpec, Decoder, DecoderSchema, RowSpec};
pub use error::DecodeError;
pub use notify::DecodeEvent;
pub use pipeline::{
    CaptureHandle, DEFAULT_CHUNK_LENGTH, DEFAULT_NOTIFY_PERIOD, DecodePipeline,
};
pub use row::{DecoderId, Row, RowId};
