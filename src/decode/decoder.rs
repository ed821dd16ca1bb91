//! Decoder stack elements and their declared schemas
//!
//! A [`DecoderSchema`] is what a protocol declares about itself: the input
//! channels it needs, its annotation classes, and how those classes group
//! into rows. A [`Decoder`] is one configured occurrence of a schema in the
//! stack, carrying the channel-to-signal bindings and a visibility flag.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::decode::row::DecoderId;
use crate::engine::InstanceSpec;
use crate::signal::{LogicSignal, Segment};

/// A required input channel declared by a protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Short identifier used for binding, e.g. "clk"
    pub id: String,
    /// Human-readable name, e.g. "Clock"
    pub name: String,
}

/// One annotation class declared by a protocol; the class id annotations
/// carry is the position in the schema's class list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationClass {
    pub id: String,
    pub name: String,
}

/// A declared grouping of annotation classes into one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSpec {
    pub id: String,
    pub name: String,
    /// Member class ids (positions in the schema's class list)
    pub classes: Vec<u32>,
}

/// Declared protocol schema for one decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSchema {
    /// Protocol identifier, e.g. "uart"
    pub id: String,
    /// Display name, e.g. "UART"
    pub name: String,
    /// Input channels that must all be bound before a run can start.
    /// Decoders stacked on another decoder's output may declare none.
    pub channels: Vec<ChannelSpec>,
    pub classes: Vec<AnnotationClass>,
    /// Row groupings; empty means all annotations land in one catch-all row
    pub rows: Vec<RowSpec>,
}

/// One configured decoder occupying a position in the stack
pub struct Decoder {
    id: DecoderId,
    schema: DecoderSchema,
    bindings: HashMap<String, Arc<LogicSignal>>,
    shown: bool,
}

impl Decoder {
    pub(crate) fn new(id: DecoderId, schema: DecoderSchema) -> Self {
        Self {
            id,
            schema,
            bindings: HashMap::new(),
            shown: true,
        }
    }

    pub fn id(&self) -> DecoderId {
        self.id
    }

    pub fn schema(&self) -> &DecoderSchema {
        &self.schema
    }

    /// Whether this decoder's rows appear in `visible_rows()`
    pub fn shown(&self) -> bool {
        self.shown
    }

    pub(crate) fn set_shown(&mut self, shown: bool) {
        self.shown = shown;
    }

    /// Bind a declared channel to a logic signal. Bindings for channels the
    /// schema does not declare are ignored with a warning.
    pub(crate) fn bind_channel(&mut self, channel: &str, signal: Arc<LogicSignal>) {
        if !self.schema.channels.iter().any(|c| c.id == channel) {
            warn!(
                decoder = %self.schema.id,
                channel,
                "binding for undeclared channel ignored"
            );
            return;
        }
        self.bindings.insert(channel.to_string(), signal);
    }

    /// True when every declared channel has a signal bound
    pub fn have_required_channels(&self) -> bool {
        self.schema
            .channels
            .iter()
            .all(|c| self.bindings.contains_key(&c.id))
    }

    /// The first bound channel (in declaration order) that currently holds
    /// captured data
    pub(crate) fn first_bound_segment(&self) -> Option<Arc<dyn Segment>> {
        self.schema
            .channels
            .iter()
            .find_map(|c| self.bindings.get(&c.id).and_then(|s| s.segment()))
    }

    /// Snapshot everything the engine needs to instantiate this decoder
    pub(crate) fn instance_spec(&self) -> InstanceSpec {
        InstanceSpec {
            decoder: self.id,
            schema: self.schema.clone(),
            probes: self
                .bindings
                .iter()
                .map(|(id, signal)| (id.clone(), signal.index()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MemorySegment;

    fn uart_schema() -> DecoderSchema {
        DecoderSchema {
            id: "uart".into(),
            name: "UART".into(),
            channels: vec![
                ChannelSpec { id: "rx".into(), name: "RX".into() },
                ChannelSpec { id: "tx".into(), name: "TX".into() },
            ],
            classes: vec![AnnotationClass { id: "data".into(), name: "Data".into() }],
            rows: Vec::new(),
        }
    }

    #[test]
    fn test_required_channels_all_bound() {
        let mut decoder = Decoder::new(DecoderId(0), uart_schema());
        assert!(!decoder.have_required_channels());

        decoder.bind_channel("rx", Arc::new(LogicSignal::new("RX", 0)));
        assert!(!decoder.have_required_channels(), "tx still unbound");

        decoder.bind_channel("tx", Arc::new(LogicSignal::new("TX", 1)));
        assert!(decoder.have_required_channels());
    }

    #[test]
    fn test_undeclared_channel_binding_ignored() {
        let mut decoder = Decoder::new(DecoderId(0), uart_schema());
        decoder.bind_channel("cts", Arc::new(LogicSignal::new("CTS", 2)));

        assert!(decoder.bindings.is_empty());
    }

    #[test]
    fn test_no_channels_is_trivially_satisfied() {
        let schema = DecoderSchema {
            id: "stacked".into(),
            name: "Stacked".into(),
            channels: Vec::new(),
            classes: Vec::new(),
            rows: Vec::new(),
        };
        let decoder = Decoder::new(DecoderId(0), schema);
        assert!(decoder.have_required_channels());
        assert!(decoder.first_bound_segment().is_none());
    }

    #[test]
    fn test_instance_spec_carries_probe_indices() {
        let mut decoder = Decoder::new(DecoderId(7), uart_schema());
        decoder.bind_channel("rx", Arc::new(LogicSignal::new("RX", 4)));
        decoder.bind_channel("tx", Arc::new(LogicSignal::new("TX", 5)));

        let spec = decoder.instance_spec();
        assert_eq!(spec.decoder, DecoderId(7));
        assert_eq!(spec.probes.get("rx"), Some(&4));
        assert_eq!(spec.probes.get("tx"), Some(&5));
        assert_eq!(spec.schema.id, "uart");
    }

    #[test]
    fn test_first_bound_segment_follows_declaration_order() {
        let mut decoder = Decoder::new(DecoderId(0), uart_schema());

        let rx = Arc::new(LogicSignal::new("RX", 0));
        let tx = Arc::new(LogicSignal::new("TX", 1));
        decoder.bind_channel("rx", Arc::clone(&rx));
        decoder.bind_channel("tx", Arc::clone(&tx));
        assert!(decoder.first_bound_segment().is_none(), "no data captured yet");

        // Only the second declared channel has data
        tx.set_segment(Arc::new(MemorySegment::new(1, 1000.0)));
        assert!(decoder.first_bound_segment().is_some());
    }
}
