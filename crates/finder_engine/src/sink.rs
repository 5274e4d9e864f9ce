use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex};

use finder_logging::finder_warn;

use crate::{EnrichedRecord, PipelineEvent};

/// Receives pipeline events in discovery order.
pub trait ResultSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

pub struct ChannelResultSink {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ChannelResultSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl ResultSink for ChannelResultSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn ResultSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for FanoutSink {
    fn emit(&self, event: PipelineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Writes one tab-separated line per record as it arrives.
pub struct TextDumpSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextDumpSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ResultSink for TextDumpSink<W> {
    fn emit(&self, event: PipelineEvent) {
        let PipelineEvent::Record(record) = event else {
            return;
        };
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(err) = writeln!(out, "{}", format_text_line(&record)).and_then(|()| out.flush())
        {
            finder_warn!("text sink write failed: {}", err);
        }
    }
}

pub(crate) fn format_text_line(record: &EnrichedRecord) -> String {
    [
        record.name.as_str(),
        &record.follower_count.to_string(),
        record.owner_display_name.as_str(),
        record.canonical_link.as_str(),
        record.owner_email.as_str(),
        record.description.as_str(),
    ]
    .iter()
    .map(|field| sanitize_field(field))
    .collect::<Vec<_>>()
    .join("\t")
}

fn sanitize_field(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

/// Streams each record to disk as one JSON object per line.
pub struct JsonLinesSink {
    out: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Creates (or truncates) the target file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ResultSink for JsonLinesSink {
    fn emit(&self, event: PipelineEvent) {
        let PipelineEvent::Record(record) = event else {
            return;
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                finder_warn!("could not serialize record {:?}: {}", record.name, err);
                return;
            }
        };
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            finder_warn!("json lines sink write failed: {}", err);
        }
    }
}
