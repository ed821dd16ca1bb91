//! Example: Live run-length decoding
//!
//! Feeds a generated square wave through the pipeline while a producer
//! thread is still appending samples, the way a capture device would. A toy
//! engine annotates every run of constant level on the bound channel.
//!
//! Usage:
//!   cargo run --example live_decode -- --samples 4096 --period 64

use clap::Parser;
use sigdec::{
    AnnotationClass, AnnotationSink, CaptureState, ChannelSpec, DecodeEngine, DecodeEvent,
    DecodePipeline, DecoderId, DecoderSchema, EngineAnnotation, EngineError, EngineLock,
    EngineSession, InstanceHandle, InstanceSpec, LogicSignal, MemorySegment, RowSpec,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Total number of samples to capture
    #[arg(short, long, default_value = "4096")]
    samples: u64,

    /// Square wave half-period in samples
    #[arg(short, long, default_value = "64")]
    period: u64,

    /// Samples appended per producer step
    #[arg(long, default_value = "512")]
    batch: u64,
}

/// Toy engine annotating runs of constant level on the bound probe
struct RunLengthEngine;

impl DecodeEngine for RunLengthEngine {
    fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(RunLengthSession {
            decoder: None,
            probe: 0,
            sink: None,
            run_start: 0,
            level: None,
        }))
    }
}

struct RunLengthSession {
    decoder: Option<DecoderId>,
    probe: u32,
    sink: Option<AnnotationSink>,
    run_start: u64,
    level: Option<bool>,
}

impl EngineSession for RunLengthSession {
    fn create_instance(&mut self, spec: &InstanceSpec) -> Result<InstanceHandle, EngineError> {
        self.decoder = Some(spec.decoder);
        self.probe = spec.probes.values().copied().next().unwrap_or(0);
        Ok(InstanceHandle(0))
    }

    fn stack_instance(
        &mut self,
        _parent: InstanceHandle,
        _child: InstanceHandle,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_metadata(&mut self, _samplerate: f64) {}

    fn register_annotation_callback(&mut self, sink: AnnotationSink) {
        self.sink = Some(sink);
    }

    fn start(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn feed(
        &mut self,
        start_sample: u64,
        _end_sample: u64,
        data: &[u8],
        unit_size: usize,
    ) -> Result<(), EngineError> {
        let Some(decoder) = self.decoder else {
            return Ok(());
        };
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };

        for (i, unit) in data.chunks(unit_size).enumerate() {
            let sample = start_sample + i as u64;
            let level = (unit[self.probe as usize / 8] >> (self.probe % 8)) & 1 == 1;
            match self.level {
                Some(previous) if previous == level => {}
                Some(previous) => {
                    sink(EngineAnnotation {
                        decoder,
                        start_sample: self.run_start,
                        end_sample: sample,
                        class: u32::from(previous),
                        texts: vec![
                            format!(
                                "{} for {} samples",
                                if previous { "High" } else { "Low" },
                                sample - self.run_start
                            ),
                            if previous { "H".into() } else { "L".into() },
                        ],
                    });
                    self.run_start = sample;
                    self.level = Some(level);
                }
                None => {
                    self.run_start = sample;
                    self.level = Some(level);
                }
            }
        }
        Ok(())
    }
}

fn level_schema() -> DecoderSchema {
    DecoderSchema {
        id: "runlen".into(),
        name: "Run length".into(),
        channels: vec![ChannelSpec { id: "d0".into(), name: "D0".into() }],
        classes: vec![
            AnnotationClass { id: "low".into(), name: "Low level".into() },
            AnnotationClass { id: "high".into(), name: "High level".into() },
        ],
        rows: vec![RowSpec {
            id: "levels".into(),
            name: "Levels".into(),
            classes: vec![0, 1],
        }],
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let segment = Arc::new(MemorySegment::new(1, 1_000_000.0));
    let signal = Arc::new(LogicSignal::new("D0", 0));
    signal.set_segment(Arc::clone(&segment) as Arc<dyn sigdec::Segment>);

    let mut pipeline = DecodePipeline::new(Arc::new(RunLengthEngine), EngineLock::new())
        .with_notify_period(256);
    pipeline.push(level_schema());
    pipeline
        .bind_channel(0, "d0", signal)
        .expect("channel binds");
    pipeline.set_capture_state(CaptureState::Running);

    let events = pipeline.subscribe();
    let capture = pipeline.capture_handle();

    // Producer: append the square wave in batches, as a device would
    let producer = {
        let segment = Arc::clone(&segment);
        let total = args.samples;
        let period = args.period.max(1);
        let batch = args.batch.max(1);
        thread::spawn(move || {
            let mut written = 0u64;
            while written < total {
                let end = (written + batch).min(total);
                let bytes: Vec<u8> = (written..end)
                    .map(|i| u8::from((i / period) % 2 == 1))
                    .collect();
                segment.append(&bytes);
                written = end;
                capture.data_received();
                thread::sleep(Duration::from_millis(2));
            }
            capture.set_capture_state(CaptureState::Stopped);
            capture.frame_ended();
        })
    };

    pipeline.begin_decode();

    while let Ok(event) = events.recv() {
        match event {
            DecodeEvent::Started => info!("decode started"),
            DecodeEvent::NewAnnotations => info!(
                decoded = pipeline.samples_decoded(),
                annotations = pipeline.annotation_count(),
                "progress"
            ),
            DecodeEvent::Finished => break,
        }
    }
    producer.join().expect("producer finishes");

    if !pipeline.error_message().is_empty() {
        eprintln!("decode failed: {}", pipeline.error_message());
        return;
    }

    for row in pipeline.visible_rows() {
        let annotations = pipeline.annotation_subset(row.id(), 0, pipeline.samples_decoded());
        println!(
            "{} / {}: {} annotations",
            row.decoder_name(),
            row.title(),
            annotations.len()
        );
        for annotation in annotations.iter().take(10) {
            println!("  {annotation}");
        }
    }
}
