//! Row identity and the class-to-row index
//!
//! Every annotation lands in exactly one row. A decoder that declares no
//! row groupings gets a single catch-all row keyed by the decoder alone;
//! otherwise each declared grouping becomes a row and every annotation
//! class declared under it maps there. The index is rebuilt from the stack
//! at the start of each run and is only ever written by that setup step.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::decode::annotation::{Annotation, RowData};
use crate::decode::decoder::Decoder;

/// Stable identity of a decoder in the stack.
///
/// Assigned when the decoder is pushed and never reused within a pipeline,
/// so two same-named decoders are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(pub(crate) u64);

impl DecoderId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Identity of one output row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub decoder: DecoderId,
    /// Declared row position within the decoder's schema; `None` is the
    /// decoder's catch-all row
    pub row: Option<u32>,
}

/// Display record for a row, created at run setup and immutable for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    id: RowId,
    decoder_name: String,
    title: String,
}

impl Row {
    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn decoder_name(&self) -> &str {
        &self.decoder_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Classification index plus per-row storage for one decode run
#[derive(Default)]
pub(crate) struct RowIndex {
    rows: BTreeMap<RowId, RowData>,
    class_rows: HashMap<(DecoderId, u32), RowId>,
    /// Stack order, each decoder's rows in declaration order
    order: Vec<Row>,
}

impl RowIndex {
    /// Build the index from the decoder stack's declared schemas
    pub(crate) fn build(stack: &[Decoder]) -> Self {
        let mut index = Self::default();

        for decoder in stack {
            let schema = decoder.schema();

            if schema.rows.is_empty() {
                index.add_row(Row {
                    id: RowId {
                        decoder: decoder.id(),
                        row: None,
                    },
                    decoder_name: schema.name.clone(),
                    title: schema.name.clone(),
                });
            }

            for (position, spec) in schema.rows.iter().enumerate() {
                let id = RowId {
                    decoder: decoder.id(),
                    row: Some(position as u32),
                };
                index.add_row(Row {
                    id,
                    decoder_name: schema.name.clone(),
                    title: spec.name.clone(),
                });
                for &class in &spec.classes {
                    index.class_rows.insert((decoder.id(), class), id);
                }
            }
        }

        index
    }

    fn add_row(&mut self, row: Row) {
        self.rows.insert(row.id, RowData::default());
        self.order.push(row);
    }

    /// Resolve the row for an annotation class: the declared mapping first,
    /// then the decoder's catch-all row, then nothing.
    pub(crate) fn classify(&self, decoder: DecoderId, class: u32) -> Option<RowId> {
        if let Some(id) = self.class_rows.get(&(decoder, class)) {
            return Some(*id);
        }
        let fallback = RowId { decoder, row: None };
        self.rows.contains_key(&fallback).then_some(fallback)
    }

    /// Store one annotation; returns false if it matched no row and was
    /// dropped.
    pub(crate) fn push_annotation(&mut self, decoder: DecoderId, annotation: Annotation) -> bool {
        let Some(row_id) = self.classify(decoder, annotation.class()) else {
            warn!(
                decoder = decoder.as_u64(),
                class = annotation.class(),
                "annotation matches no declared row, dropping"
            );
            return false;
        };
        if let Some(data) = self.rows.get_mut(&row_id) {
            data.push(annotation);
            true
        } else {
            false
        }
    }

    /// All rows in stack order
    pub(crate) fn rows_in_order(&self) -> &[Row] {
        &self.order
    }

    pub(crate) fn annotation_subset(
        &self,
        row: RowId,
        start: u64,
        end: u64,
        dest: &mut Vec<Annotation>,
    ) {
        if let Some(data) = self.rows.get(&row) {
            data.annotation_subset(start, end, dest);
        }
    }

    /// Highest end sample stored in any row
    pub(crate) fn max_sample_count(&self) -> u64 {
        self.rows.values().map(RowData::max_sample).max().unwrap_or(0)
    }

    pub(crate) fn annotation_total(&self) -> usize {
        self.rows.values().map(RowData::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.class_rows.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decoder::{AnnotationClass, ChannelSpec, DecoderSchema, RowSpec};

    fn class(name: &str) -> AnnotationClass {
        AnnotationClass {
            id: name.to_lowercase(),
            name: name.to_string(),
        }
    }

    fn plain_schema(name: &str) -> DecoderSchema {
        DecoderSchema {
            id: name.to_lowercase(),
            name: name.to_string(),
            channels: vec![ChannelSpec {
                id: "d0".into(),
                name: "D0".into(),
            }],
            classes: vec![class("Bit")],
            rows: Vec::new(),
        }
    }

    fn rowed_schema(name: &str) -> DecoderSchema {
        DecoderSchema {
            id: name.to_lowercase(),
            name: name.to_string(),
            channels: Vec::new(),
            classes: vec![class("Address"), class("Data")],
            rows: vec![
                RowSpec {
                    id: "addr".into(),
                    name: "Addresses".into(),
                    classes: vec![0],
                },
                RowSpec {
                    id: "data".into(),
                    name: "Data bytes".into(),
                    classes: vec![1],
                },
            ],
        }
    }

    fn stack(schemas: Vec<DecoderSchema>) -> Vec<Decoder> {
        schemas
            .into_iter()
            .enumerate()
            .map(|(i, schema)| Decoder::new(DecoderId(i as u64), schema))
            .collect()
    }

    #[test]
    fn test_build_catch_all_only_without_declared_rows() {
        let index = RowIndex::build(&stack(vec![plain_schema("Bits")]));

        let rows = index.rows_in_order();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), RowId { decoder: DecoderId(0), row: None });
        assert_eq!(rows[0].title(), "Bits");
    }

    #[test]
    fn test_build_declared_rows_in_schema_order() {
        let index = RowIndex::build(&stack(vec![rowed_schema("I2C")]));

        let rows = index.rows_in_order();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title(), "Addresses");
        assert_eq!(rows[1].title(), "Data bytes");
        // No catch-all row when groupings are declared
        assert!(rows.iter().all(|r| r.id().row.is_some()));
    }

    #[test]
    fn test_classify_declared_class() {
        let index = RowIndex::build(&stack(vec![rowed_schema("I2C")]));

        assert_eq!(
            index.classify(DecoderId(0), 1),
            Some(RowId { decoder: DecoderId(0), row: Some(1) })
        );
    }

    #[test]
    fn test_classify_falls_back_to_catch_all() {
        let index = RowIndex::build(&stack(vec![plain_schema("Bits")]));

        // Class 7 is not declared anywhere, but the decoder has a catch-all
        assert_eq!(
            index.classify(DecoderId(0), 7),
            Some(RowId { decoder: DecoderId(0), row: None })
        );
    }

    #[test]
    fn test_classify_unknown_class_without_catch_all() {
        let index = RowIndex::build(&stack(vec![rowed_schema("I2C")]));

        assert_eq!(index.classify(DecoderId(0), 9), None);
        assert_eq!(index.classify(DecoderId(3), 0), None, "unknown decoder");
    }

    #[test]
    fn test_push_annotation_drops_unclassifiable() {
        let mut index = RowIndex::build(&stack(vec![rowed_schema("I2C")]));

        assert!(index.push_annotation(DecoderId(0), Annotation::new(0, 1, 0, Vec::new())));
        assert!(!index.push_annotation(DecoderId(0), Annotation::new(1, 2, 9, Vec::new())));
        assert!(index.push_annotation(DecoderId(0), Annotation::new(2, 3, 1, Vec::new())));
        assert_eq!(index.annotation_total(), 2);
    }

    #[test]
    fn test_rows_follow_stack_order() {
        let index = RowIndex::build(&stack(vec![plain_schema("Bits"), rowed_schema("I2C")]));

        let titles: Vec<_> = index.rows_in_order().iter().map(Row::title).collect();
        assert_eq!(titles, vec!["Bits", "Addresses", "Data bytes"]);
    }

    #[test]
    fn test_same_schema_twice_stays_distinct() {
        let index = RowIndex::build(&stack(vec![plain_schema("Bits"), plain_schema("Bits")]));

        assert_eq!(index.rows_in_order().len(), 2);
        let a = index.classify(DecoderId(0), 0).unwrap();
        let b = index.classify(DecoderId(1), 0).unwrap();
        assert_ne!(a, b, "identity is the decoder, not its name");
    }

    #[test]
    fn test_max_sample_count_spans_rows() {
        let mut index = RowIndex::build(&stack(vec![rowed_schema("I2C")]));
        assert_eq!(index.max_sample_count(), 0);

        index.push_annotation(DecoderId(0), Annotation::new(0, 80, 0, Vec::new()));
        index.push_annotation(DecoderId(0), Annotation::new(10, 500, 1, Vec::new()));
        assert_eq!(index.max_sample_count(), 500);
    }
}
