//! Sample sources: captured segments and the logic signals bound to decoder
//! channels
//!
//! A [`Segment`] is a contiguous run of raw sample data with a fixed unit
//! size and samplerate. It may still be growing while a capture is in
//! progress; readers only ever see whole samples. A [`LogicSignal`] is a
//! named channel that may or may not currently hold a segment, which is what
//! decoder channels bind to: "bound but nothing captured yet" is a valid
//! state and produces a silent no-op decode run.

use std::fmt;
use std::sync::{Arc, Mutex};

/// State of the acquisition side, as reported by the capture owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture is running; no further samples will arrive
    Stopped,
    /// A capture is in progress and may still append samples
    Running,
}

/// A contiguous run of captured samples.
///
/// Sample `i` occupies bytes `[i * unit_size, (i + 1) * unit_size)`. Each
/// channel is one bit within the unit, at the bit index its signal declares.
pub trait Segment: Send + Sync {
    /// Bytes per sample
    fn unit_size(&self) -> usize;

    /// Number of whole samples currently available
    fn sample_count(&self) -> u64;

    /// Copy samples `[start, end)` into `dest`, replacing its contents.
    ///
    /// `end` must not exceed `sample_count()` at the time of the call. The
    /// buffer is caller-owned so it can be reused across reads.
    fn read_samples(&self, start: u64, end: u64, dest: &mut Vec<u8>);

    /// Capture start time in seconds
    fn start_time(&self) -> f64;

    /// Samplerate in Hz
    fn samplerate(&self) -> f64;
}

/// Growable in-memory segment.
///
/// The producer appends packed sample bytes while consumers concurrently
/// read earlier ranges; `sample_count()` only ever grows. Used by tests and
/// demos, and as the reference implementation of the [`Segment`] contract.
pub struct MemorySegment {
    unit_size: usize,
    samplerate: f64,
    start_time: f64,
    data: Mutex<Vec<u8>>,
}

impl MemorySegment {
    pub fn new(unit_size: usize, samplerate: f64) -> Self {
        assert!(unit_size > 0, "unit_size must be at least one byte");
        Self {
            unit_size,
            samplerate,
            start_time: 0.0,
            data: Mutex::new(Vec::new()),
        }
    }

    /// Set the capture start time in seconds
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Append packed sample bytes; `samples.len()` must be a whole number of
    /// units.
    pub fn append(&self, samples: &[u8]) {
        debug_assert_eq!(samples.len() % self.unit_size, 0);
        self.data.lock().unwrap().extend_from_slice(samples);
    }
}

impl Segment for MemorySegment {
    fn unit_size(&self) -> usize {
        self.unit_size
    }

    fn sample_count(&self) -> u64 {
        (self.data.lock().unwrap().len() / self.unit_size) as u64
    }

    fn read_samples(&self, start: u64, end: u64, dest: &mut Vec<u8>) {
        debug_assert!(start <= end);
        let data = self.data.lock().unwrap();
        let from = start as usize * self.unit_size;
        let to = end as usize * self.unit_size;
        dest.clear();
        dest.extend_from_slice(&data[from..to]);
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn samplerate(&self) -> f64 {
        self.samplerate
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MemorySegment[unit={}, samples={}, rate={}]",
            self.unit_size,
            self.sample_count(),
            self.samplerate
        )
    }
}

/// A named logic channel that decoder channels bind to.
///
/// `index` is the channel's bit position within a sample unit. The segment
/// is attached by the capture owner when data begins to arrive and swapped
/// out between frames.
pub struct LogicSignal {
    name: String,
    index: u32,
    segment: Mutex<Option<Arc<dyn Segment>>>,
}

impl LogicSignal {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            segment: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit position of this channel within a sample unit
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Attach the current frame's segment
    pub fn set_segment(&self, segment: Arc<dyn Segment>) {
        *self.segment.lock().unwrap() = Some(segment);
    }

    /// Detach the segment (no capture available)
    pub fn clear_segment(&self) {
        *self.segment.lock().unwrap() = None;
    }

    pub fn segment(&self) -> Option<Arc<dyn Segment>> {
        self.segment.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_segment_counts_whole_samples() {
        let segment = MemorySegment::new(2, 1000.0);
        assert_eq!(segment.sample_count(), 0);

        segment.append(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(segment.sample_count(), 2);
        assert_eq!(segment.unit_size(), 2);
    }

    #[test]
    fn test_memory_segment_read_window() {
        let segment = MemorySegment::new(1, 1000.0);
        segment.append(&[0, 1, 2, 3, 4, 5, 6, 7]);

        let mut buf = vec![0xFF; 16];
        segment.read_samples(2, 5, &mut buf);
        assert_eq!(buf, vec![2, 3, 4]);

        // Buffer is reused, not accumulated
        segment.read_samples(0, 2, &mut buf);
        assert_eq!(buf, vec![0, 1]);
    }

    #[test]
    fn test_memory_segment_read_respects_unit_size() {
        let segment = MemorySegment::new(2, 1000.0);
        segment.append(&[10, 11, 20, 21, 30, 31]);

        let mut buf = Vec::new();
        segment.read_samples(1, 3, &mut buf);
        assert_eq!(buf, vec![20, 21, 30, 31]);
    }

    #[test]
    fn test_memory_segment_grows_while_read() {
        let segment = MemorySegment::new(1, 1000.0);
        segment.append(&[1, 2, 3]);
        assert_eq!(segment.sample_count(), 3);

        segment.append(&[4, 5]);
        assert_eq!(segment.sample_count(), 5);

        let mut buf = Vec::new();
        segment.read_samples(0, 5, &mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_logic_signal_segment_attach_detach() {
        let signal = LogicSignal::new("clk", 3);
        assert_eq!(signal.name(), "clk");
        assert_eq!(signal.index(), 3);
        assert!(signal.segment().is_none());

        let segment = Arc::new(MemorySegment::new(1, 1000.0));
        signal.set_segment(segment);
        assert!(signal.segment().is_some());

        signal.clear_segment();
        assert!(signal.segment().is_none());
    }
}
