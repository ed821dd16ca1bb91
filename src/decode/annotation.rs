//! Decoded annotations and their per-row storage
//!
//! An [`Annotation`] is an immutable decoded event covering a sample range.
//! [`RowData`] accumulates the annotations of one output row in the order
//! the engine emits them, which is non-decreasing by start sample, so range
//! queries can cut the scan off with a binary search on the start bound.

use std::fmt;

/// A decoded protocol event with a sample range and its text forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    start_sample: u64,
    end_sample: u64,
    class: u32,
    texts: Vec<String>,
}

impl Annotation {
    /// Create a new annotation covering `[start_sample, end_sample)`.
    ///
    /// `texts` is ordered from most to least verbose; renderers pick the
    /// longest form that fits.
    pub fn new(start_sample: u64, end_sample: u64, class: u32, texts: Vec<String>) -> Self {
        debug_assert!(start_sample <= end_sample);
        Self {
            start_sample,
            end_sample,
            class,
            texts,
        }
    }

    /// First sample covered (inclusive)
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// One past the last sample covered (exclusive)
    pub fn end_sample(&self) -> u64 {
        self.end_sample
    }

    /// Annotation class id within the emitting decoder's schema
    pub fn class(&self) -> u32 {
        self.class
    }

    /// All text forms, most verbose first
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// The most verbose text form, or an empty string if none was supplied
    pub fn text(&self) -> &str {
        self.texts.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}, {}) {}",
            self.start_sample,
            self.end_sample,
            self.text()
        )
    }
}

/// Append-only annotation storage for one row.
///
/// Annotations arrive in non-decreasing start-sample order and are never
/// removed or reordered within a run.
#[derive(Debug, Default)]
pub struct RowData {
    annotations: Vec<Annotation>,
    max_end_sample: u64,
}

impl RowData {
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Highest end sample seen so far (exclusive watermark)
    pub fn max_sample(&self) -> u64 {
        self.max_end_sample
    }

    pub(crate) fn push(&mut self, annotation: Annotation) {
        debug_assert!(
            self.annotations
                .last()
                .is_none_or(|last| last.start_sample() <= annotation.start_sample()),
            "annotations must be appended in start-sample order"
        );
        self.max_end_sample = self.max_end_sample.max(annotation.end_sample());
        self.annotations.push(annotation);
    }

    /// Append clones of all annotations overlapping `[start, end)` to
    /// `dest`, in stored order.
    pub fn annotation_subset(&self, start: u64, end: u64, dest: &mut Vec<Annotation>) {
        // Start-ordered storage: nothing at or past `end` can overlap
        let cut = self.annotations.partition_point(|a| a.start_sample() < end);
        dest.extend(
            self.annotations[..cut]
                .iter()
                .filter(|a| a.end_sample() > start)
                .cloned(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(start: u64, end: u64) -> Annotation {
        Annotation::new(start, end, 0, vec![format!("{start}..{end}")])
    }

    fn subset(data: &RowData, start: u64, end: u64) -> Vec<(u64, u64)> {
        let mut dest = Vec::new();
        data.annotation_subset(start, end, &mut dest);
        dest.iter()
            .map(|a| (a.start_sample(), a.end_sample()))
            .collect()
    }

    #[test]
    fn test_text_forms() {
        let a = Annotation::new(0, 8, 2, vec!["Address 0x42".into(), "A:42".into(), "A".into()]);
        assert_eq!(a.text(), "Address 0x42");
        assert_eq!(a.texts().len(), 3);
        assert_eq!(a.class(), 2);

        let bare = Annotation::new(0, 1, 0, Vec::new());
        assert_eq!(bare.text(), "");
    }

    #[test]
    fn test_subset_returns_overlapping_in_order() {
        let mut data = RowData::default();
        data.push(ann(0, 10));
        data.push(ann(10, 20));
        data.push(ann(15, 30));
        data.push(ann(40, 50));

        // [12, 41) overlaps all but the first
        assert_eq!(subset(&data, 12, 41), vec![(10, 20), (15, 30), (40, 50)]);
    }

    #[test]
    fn test_subset_bounds_are_half_open() {
        let mut data = RowData::default();
        data.push(ann(10, 20));

        // Query ending exactly at the start does not overlap
        assert_eq!(subset(&data, 0, 10), Vec::new());
        // Query starting exactly at the end does not overlap
        assert_eq!(subset(&data, 20, 30), Vec::new());
        assert_eq!(subset(&data, 19, 20), vec![(10, 20)]);
    }

    #[test]
    fn test_subset_is_repeatable() {
        let mut data = RowData::default();
        for i in 0..100 {
            data.push(ann(i, i + 5));
        }

        let first = subset(&data, 20, 40);
        let second = subset(&data, 20, 40);
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.windows(2).all(|w| w[0].0 <= w[1].0), "sorted by start");
    }

    #[test]
    fn test_max_sample_watermark() {
        let mut data = RowData::default();
        assert_eq!(data.max_sample(), 0);

        data.push(ann(0, 100));
        data.push(ann(50, 60));
        assert_eq!(data.max_sample(), 100, "watermark keeps the running maximum");

        data.push(ann(90, 150));
        assert_eq!(data.max_sample(), 150);
        assert_eq!(data.len(), 3);
    }
}
