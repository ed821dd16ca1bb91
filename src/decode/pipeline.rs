//! Decode pipeline controller
//!
//! [`DecodePipeline`] owns a stack of configured decoders and drives decode
//! runs over them. A run happens on a dedicated thread: samples are read
//! from the bound segment in bounded chunks and fed to the engine, which
//! calls back with annotations that are classified into rows. When the
//! thread has consumed everything currently captured it blocks on a
//! condition variable until the capture side reports more data, the end of
//! the frame, or a stop, so a live capture feeds the decoder without
//! busy-polling.
//!
//! ## Locking
//!
//! Producer-side state (available sample count, frame completion, the
//! interrupt flag, capture state) lives under the input lock together with
//! the wait condition. Consumer-visible state (decode progress, the first
//! recorded error, the row index, the annotation counter) lives under the
//! output lock; readers take it briefly for queries and never hold it
//! across blocking work. Engine access across all pipelines is serialized
//! by an [`EngineLock`] held for a run's entire engine usage.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::decode::annotation::Annotation;
use crate::decode::decoder::{Decoder, DecoderSchema};
use crate::decode::error::DecodeError;
use crate::decode::notify::{DecodeEvent, EventHub};
use crate::decode::row::{DecoderId, Row, RowId, RowIndex};
use crate::engine::{
    DecodeEngine, EngineAnnotation, EngineLock, EngineSession, InstanceHandle, InstanceSpec,
};
use crate::signal::{CaptureState, LogicSignal, Segment};

/// Default number of bytes fed to the engine per chunk; chunk size in
/// samples varies with the segment's unit size
pub const DEFAULT_CHUNK_LENGTH: usize = 10 * 1024 * 1024;

/// Default number of stored annotations between two `NewAnnotations` events
pub const DEFAULT_NOTIFY_PERIOD: u64 = 1024;

/// Producer-side state, guarded by the input lock
struct InputState {
    /// Samples currently available in the bound segment
    sample_count: u64,
    /// The capture side reported that no more samples will arrive
    frame_complete: bool,
    /// Cooperative cancellation flag, checked at chunk boundaries and on
    /// wait entry
    interrupt: bool,
    capture_state: CaptureState,
    /// Segment of the run in progress, re-polled on `data_received`
    segment: Option<Arc<dyn Segment>>,
}

/// Consumer-visible state, guarded by the output lock
struct OutputState {
    /// Watermark of samples consumed, monotonic within a run
    samples_decoded: u64,
    /// First error recorded this run
    error: Option<DecodeError>,
    index: RowIndex,
    annotation_count: u64,
}

struct Shared {
    input: Mutex<InputState>,
    input_cond: Condvar,
    output: Mutex<OutputState>,
    events: EventHub,
}

impl Shared {
    fn new() -> Self {
        Self {
            input: Mutex::new(InputState {
                sample_count: 0,
                frame_complete: false,
                interrupt: false,
                capture_state: CaptureState::Stopped,
                segment: None,
            }),
            input_cond: Condvar::new(),
            output: Mutex::new(OutputState {
                samples_decoded: 0,
                error: None,
                index: RowIndex::default(),
                annotation_count: 0,
            }),
            events: EventHub::default(),
        }
    }

    fn interrupt_requested(&self) -> bool {
        self.input.lock().unwrap().interrupt
    }

    /// Record an error; the first one per run wins
    fn set_error(&self, error: DecodeError) {
        let mut output = self.output.lock().unwrap();
        if output.error.is_none() {
            output.error = Some(error);
        }
    }

    fn error_is_set(&self) -> bool {
        self.output.lock().unwrap().error.is_some()
    }

    /// Classify and append one annotation. Returns true when a notification
    /// is due; the caller emits it after this lock is released.
    fn store_annotation(&self, event: EngineAnnotation, notify_period: u64) -> bool {
        let decoder = event.decoder;
        let annotation =
            Annotation::new(event.start_sample, event.end_sample, event.class, event.texts);

        let mut output = self.output.lock().unwrap();
        if !output.index.push_annotation(decoder, annotation) {
            return false;
        }
        let ordinal = output.annotation_count;
        output.annotation_count += 1;
        ordinal % notify_period == 0
    }

    fn data_received(&self) {
        let mut input = self.input.lock().unwrap();
        if let Some(segment) = input.segment.clone() {
            input.sample_count = segment.sample_count();
        }
        drop(input);
        self.input_cond.notify_one();
    }

    fn frame_ended(&self) {
        let mut input = self.input.lock().unwrap();
        if input.segment.is_some() {
            input.frame_complete = true;
        }
        drop(input);
        self.input_cond.notify_one();
    }

    fn set_capture_state(&self, state: CaptureState) {
        self.input.lock().unwrap().capture_state = state;
        self.input_cond.notify_one();
    }
}

/// Cloneable handle for the acquisition side. Lets the capture owner signal
/// the pipeline from its own thread without holding a pipeline reference.
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<Shared>,
}

impl CaptureHandle {
    /// More samples were appended to the current segment
    pub fn data_received(&self) {
        self.shared.data_received();
    }

    /// No more samples will arrive for this frame
    pub fn frame_ended(&self) {
        self.shared.frame_ended();
    }

    pub fn set_capture_state(&self, state: CaptureState) {
        self.shared.set_capture_state(state);
    }
}

/// Everything one decode run needs, snapshotted at `begin_decode` so the
/// thread never touches the mutable stack
struct DecodeRun {
    shared: Arc<Shared>,
    specs: Vec<InstanceSpec>,
    segment: Arc<dyn Segment>,
    samplerate: f64,
    chunk_length: usize,
    notify_period: u64,
    /// Reused per-chunk read buffer
    scratch: Vec<u8>,
}

impl DecodeRun {
    fn run(mut self, engine: Arc<dyn DecodeEngine>, gate: EngineLock) {
        // The engine is not safe for concurrent multi-run use; hold the
        // gate for this run's entire engine usage
        let gate_guard = gate.acquire();

        let mut session = match engine.new_session() {
            Ok(session) => session,
            Err(e) => return self.fail_setup(DecodeError::CreateInstance(e)),
        };

        // Instantiate the stack in order, chaining each instance's output
        // into the next
        let mut previous: Option<InstanceHandle> = None;
        for spec in &self.specs {
            let instance = match session.create_instance(spec) {
                Ok(instance) => instance,
                Err(e) => {
                    drop(session);
                    return self.fail_setup(DecodeError::CreateInstance(e));
                }
            };
            if let Some(parent) = previous {
                if let Err(e) = session.stack_instance(parent, instance) {
                    drop(session);
                    return self.fail_setup(DecodeError::CreateInstance(e));
                }
            }
            previous = Some(instance);
        }

        // Publish the initially available sample count
        let mut target = {
            let mut input = self.shared.input.lock().unwrap();
            input.sample_count = self.segment.sample_count();
            input.sample_count
        };

        session.set_metadata(self.samplerate);
        {
            let shared = Arc::clone(&self.shared);
            let notify_period = self.notify_period;
            session.register_annotation_callback(Box::new(move |event| {
                if shared.store_annotation(event, notify_period) {
                    shared.events.emit(DecodeEvent::NewAnnotations);
                }
            }));
        }
        if let Err(e) = session.start() {
            drop(session);
            return self.fail_setup(DecodeError::CreateInstance(e));
        }

        info!(samples = target, samplerate = self.samplerate, "decode run started");

        let mut decoded = 0u64;
        loop {
            self.decode_data(session.as_mut(), decoded, target);
            decoded = target;
            if self.shared.error_is_set() {
                break;
            }
            match self.wait_for_data(decoded) {
                Some(next) => target = next,
                None => break,
            }
        }

        // Consumers always learn about the tail batch, even when it was
        // smaller than the notify period
        self.shared.events.emit(DecodeEvent::NewAnnotations);

        drop(session);
        drop(gate_guard);
        debug!(decoded, "decode run finished");
        self.shared.events.emit(DecodeEvent::Finished);
    }

    /// Abort before any feeding happened: record, tear down, report
    fn fail_setup(&self, error: DecodeError) {
        warn!("decode run aborted: {error}");
        self.shared.set_error(error);
        self.shared.events.emit(DecodeEvent::Finished);
    }

    /// Feed samples `[start, end)` to the engine in bounded chunks,
    /// publishing progress after every accepted chunk
    fn decode_data(&mut self, session: &mut dyn EngineSession, start: u64, end: u64) {
        let unit_size = self.segment.unit_size();
        let chunk_samples = (self.chunk_length / unit_size).max(1) as u64;

        let mut position = start;
        while position < end && !self.shared.interrupt_requested() {
            let chunk_end = (position + chunk_samples).min(end);
            self.segment.read_samples(position, chunk_end, &mut self.scratch);

            if let Err(e) = session.feed(position, chunk_end, &self.scratch, unit_size) {
                warn!(start = position, end = chunk_end, "engine rejected chunk: {e}");
                self.shared.set_error(DecodeError::Feed(e));
                return;
            }

            self.shared.output.lock().unwrap().samples_decoded = chunk_end;
            position = chunk_end;
        }
    }

    /// Block until there is more work or the run is over. Returns the next
    /// sample count to feed toward, or `None` when the run should end.
    fn wait_for_data(&self, decoded: u64) -> Option<u64> {
        let mut input = self.shared.input.lock().unwrap();

        // Block only while fully caught up on a capture that may still grow
        while !input.interrupt
            && !input.frame_complete
            && decoded >= input.sample_count
            && input.capture_state != CaptureState::Stopped
        {
            debug!(decoded, "waiting for more captured data");
            input = self.shared.input_cond.wait(input).unwrap();
        }

        let more_work = !input.interrupt
            && (decoded < input.sample_count || !input.frame_complete)
            && !(decoded >= input.sample_count
                && input.capture_state == CaptureState::Stopped);
        more_work.then_some(input.sample_count)
    }
}

/// Streaming decode pipeline over a stack of protocol decoders.
///
/// Exactly one decode thread runs per pipeline at any time; starting a new
/// run interrupts and joins the previous one first. Query methods may be
/// called from any thread while a run is in progress.
pub struct DecodePipeline {
    engine: Arc<dyn DecodeEngine>,
    engine_lock: EngineLock,
    stack: Vec<Decoder>,
    next_decoder_id: u64,
    shared: Arc<Shared>,
    decode_thread: Option<JoinHandle<()>>,
    chunk_length: usize,
    notify_period: u64,
    samplerate: f64,
    start_time: f64,
}

impl DecodePipeline {
    /// Create a pipeline over `engine`. All pipelines sharing that engine
    /// must share `engine_lock` as well.
    pub fn new(engine: Arc<dyn DecodeEngine>, engine_lock: EngineLock) -> Self {
        Self {
            engine,
            engine_lock,
            stack: Vec::new(),
            next_decoder_id: 0,
            shared: Arc::new(Shared::new()),
            decode_thread: None,
            chunk_length: DEFAULT_CHUNK_LENGTH,
            notify_period: DEFAULT_NOTIFY_PERIOD,
            samplerate: 0.0,
            start_time: 0.0,
        }
    }

    /// Set the per-chunk feed size in bytes
    pub fn with_chunk_length(mut self, bytes: usize) -> Self {
        self.chunk_length = bytes.max(1);
        self
    }

    /// Set how many annotations are stored between two `NewAnnotations`
    /// events
    pub fn with_notify_period(mut self, period: u64) -> Self {
        self.notify_period = period.max(1);
        self
    }

    // ── Stack management ─────────────────────────────────────────────────

    /// Append a decoder to the stack and return its stable identity
    pub fn push(&mut self, schema: DecoderSchema) -> DecoderId {
        let id = DecoderId(self.next_decoder_id);
        self.next_decoder_id += 1;
        debug!(decoder = id.as_u64(), protocol = %schema.id, "decoder pushed");
        self.stack.push(Decoder::new(id, schema));
        id
    }

    /// Remove the decoder at `index`
    pub fn remove(&mut self, index: usize) -> Result<(), DecodeError> {
        if index >= self.stack.len() {
            return Err(DecodeError::StackIndex(index));
        }
        self.stack.remove(index);
        Ok(())
    }

    pub fn stack(&self) -> &[Decoder] {
        &self.stack
    }

    /// Bind a declared channel of the decoder at `index` to a logic signal
    pub fn bind_channel(
        &mut self,
        index: usize,
        channel: &str,
        signal: Arc<LogicSignal>,
    ) -> Result<(), DecodeError> {
        let decoder = self
            .stack
            .get_mut(index)
            .ok_or(DecodeError::StackIndex(index))?;
        decoder.bind_channel(channel, signal);
        Ok(())
    }

    /// Toggle whether the decoder at `index` contributes to `visible_rows`
    pub fn set_shown(&mut self, index: usize, shown: bool) -> Result<(), DecodeError> {
        let decoder = self
            .stack
            .get_mut(index)
            .ok_or(DecodeError::StackIndex(index))?;
        decoder.set_shown(shown);
        Ok(())
    }

    // ── Run control ──────────────────────────────────────────────────────

    /// Start a decode run, cancelling and joining any previous one first.
    ///
    /// A decoder with unbound required channels refuses the run with an
    /// error and spawns no thread. A stack whose bound signals hold no
    /// captured segment is a silent no-op. Safe to call repeatedly.
    pub fn begin_decode(&mut self) {
        self.join_decode_thread();
        self.clear();

        if !self.stack.iter().all(Decoder::have_required_channels) {
            info!("decode run refused: unbound required channels");
            self.shared.set_error(DecodeError::MissingChannels);
            return;
        }

        // Single-writer rebuild, finished before the decode thread exists
        {
            let mut output = self.shared.output.lock().unwrap();
            output.index = RowIndex::build(&self.stack);
        }

        let Some(segment) = self.stack.iter().find_map(Decoder::first_bound_segment) else {
            debug!("no captured segment bound to any decoder, nothing to decode");
            return;
        };

        self.samplerate = segment.samplerate();
        if self.samplerate == 0.0 {
            self.samplerate = 1.0;
        }
        self.start_time = segment.start_time();

        {
            let mut input = self.shared.input.lock().unwrap();
            input.segment = Some(Arc::clone(&segment));
            input.interrupt = false;
        }

        let run = DecodeRun {
            shared: Arc::clone(&self.shared),
            specs: self.stack.iter().map(Decoder::instance_spec).collect(),
            segment,
            samplerate: self.samplerate,
            chunk_length: self.chunk_length,
            notify_period: self.notify_period,
            scratch: Vec::new(),
        };
        let engine = Arc::clone(&self.engine);
        let gate = self.engine_lock.clone();

        self.shared.events.emit(DecodeEvent::Started);
        self.decode_thread = Some(thread::spawn(move || run.run(engine, gate)));
    }

    fn clear(&mut self) {
        {
            let mut input = self.shared.input.lock().unwrap();
            input.sample_count = 0;
            input.frame_complete = false;
            input.segment = None;
        }
        let mut output = self.shared.output.lock().unwrap();
        output.samples_decoded = 0;
        output.annotation_count = 0;
        output.error = None;
        output.index.clear();
    }

    fn join_decode_thread(&mut self) {
        if let Some(handle) = self.decode_thread.take() {
            {
                let mut input = self.shared.input.lock().unwrap();
                input.interrupt = true;
            }
            self.shared.input_cond.notify_one();
            if handle.join().is_err() {
                error!("decode thread panicked");
            }
        }
    }

    // ── Capture-side inputs ──────────────────────────────────────────────

    /// More samples were appended to the current segment
    pub fn on_data_received(&self) {
        self.shared.data_received();
    }

    /// No more samples will arrive for this frame
    pub fn on_frame_ended(&self) {
        self.shared.frame_ended();
    }

    /// A new frame began; restarts decoding from scratch
    pub fn on_frame_began(&mut self) {
        self.begin_decode();
    }

    pub fn set_capture_state(&self, state: CaptureState) {
        self.shared.set_capture_state(state);
    }

    /// Handle the acquisition side can signal through from its own thread
    pub fn capture_handle(&self) -> CaptureHandle {
        CaptureHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    // ── Consumer queries ─────────────────────────────────────────────────

    /// Snapshot of the decode progress watermark
    pub fn samples_decoded(&self) -> u64 {
        self.shared.output.lock().unwrap().samples_decoded
    }

    /// Number of annotations stored this run
    pub fn annotation_count(&self) -> u64 {
        self.shared.output.lock().unwrap().annotation_count
    }

    /// The first error recorded this run, rendered; empty if none
    pub fn error_message(&self) -> String {
        match &self.shared.output.lock().unwrap().error {
            Some(error) => error.to_string(),
            None => String::new(),
        }
    }

    /// Rows of all currently shown decoders, in stack order
    pub fn visible_rows(&self) -> Vec<Row> {
        let output = self.shared.output.lock().unwrap();
        output
            .index
            .rows_in_order()
            .iter()
            .filter(|row| {
                self.stack
                    .iter()
                    .any(|d| d.id() == row.id().decoder && d.shown())
            })
            .cloned()
            .collect()
    }

    /// All annotations of `row` overlapping `[start, end)`, in start order
    pub fn annotation_subset(&self, row: RowId, start: u64, end: u64) -> Vec<Annotation> {
        let mut dest = Vec::new();
        self.shared
            .output
            .lock()
            .unwrap()
            .index
            .annotation_subset(row, start, end, &mut dest);
        dest
    }

    /// Highest end sample any stored annotation reaches
    pub fn max_sample_count(&self) -> u64 {
        self.shared.output.lock().unwrap().index.max_sample_count()
    }

    /// Samplerate of the current run's segment, Hz
    pub fn samplerate(&self) -> f64 {
        self.samplerate
    }

    /// Start time of the current run's segment, seconds
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Subscribe to progress events for this pipeline
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<DecodeEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.join_decode_thread();
    }
}
