use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::Context;
use finder_core::{Effect, FinishKind, Msg, RecordRow};
use finder_engine::{
    EnrichedRecord, FanoutSink, FinishReason, JsonLinesSink, Pipeline, PipelineEvent, Query,
    ResultSink, RunCanceller, TextDumpSink,
};
use finder_logging::{finder_error, finder_info, finder_warn};

/// Extra destinations a run writes to besides the core state.
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub stream_to: Option<PathBuf>,
    pub text_to_stdout: bool,
}

pub struct EffectRunner {
    pipeline: Pipeline,
    msg_tx: mpsc::Sender<Msg>,
    outputs: RunOutputs,
    current: Option<RunCanceller>,
}

impl EffectRunner {
    pub fn new(pipeline: Pipeline, msg_tx: mpsc::Sender<Msg>, outputs: RunOutputs) -> Self {
        Self {
            pipeline,
            msg_tx,
            outputs,
            current: None,
        }
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartSearch { genres } => {
                    finder_info!("StartSearch genres={:?}", genres);
                    if let Err(err) = self.start(genres) {
                        finder_warn!("Search rejected: {:#}", err);
                        let _ = self.msg_tx.send(Msg::StartRejected(format!("{err:#}")));
                    }
                }
                Effect::CancelSearch => match &self.current {
                    Some(canceller) => {
                        finder_info!("CancelSearch");
                        canceller.cancel();
                    }
                    None => finder_warn!("CancelSearch without an active run"),
                },
            }
        }
    }

    fn start(&mut self, genres: Vec<String>) -> anyhow::Result<()> {
        let query = Query::new(genres)?;
        let sink = self.build_sink()?;
        let handle = self.pipeline.start(query)?;
        let canceller = handle.canceller();
        let run_id = handle.run_id();

        let spawned = thread::Builder::new()
            .name(format!("finder-events-{run_id}"))
            .spawn(move || {
                while let Some(event) = handle.recv() {
                    sink.emit(event);
                }
            });
        if let Err(err) = spawned {
            canceller.cancel();
            return Err(err).context("failed to spawn event forwarder");
        }

        self.current = Some(canceller);
        Ok(())
    }

    fn build_sink(&self) -> anyhow::Result<FanoutSink> {
        let mut sink = FanoutSink::new();
        if let Some(path) = &self.outputs.stream_to {
            let stream = JsonLinesSink::create(path)
                .with_context(|| format!("failed to create record stream {:?}", path))?;
            sink.push(Box::new(stream));
        }
        if self.outputs.text_to_stdout {
            sink.push(Box::new(TextDumpSink::new(io::stdout())));
        }
        sink.push(Box::new(CoreMsgSink {
            tx: self.msg_tx.clone(),
        }));
        Ok(sink)
    }
}

/// Feeds pipeline events into the core update loop.
struct CoreMsgSink {
    tx: mpsc::Sender<Msg>,
}

impl ResultSink for CoreMsgSink {
    fn emit(&self, event: PipelineEvent) {
        let msg = match event {
            PipelineEvent::TotalKnown(estimate) => Msg::TotalKnown {
                count: estimate.count,
                estimated_secs: estimate.estimated_duration().as_secs_f64(),
            },
            PipelineEvent::Progress(progress) => Msg::Progress {
                delta: progress.delta,
            },
            PipelineEvent::Record(record) => Msg::RecordReceived(to_row(record)),
            PipelineEvent::Finished(outcome) => {
                let kind = match outcome.reason {
                    FinishReason::Completed => FinishKind::Completed,
                    FinishReason::Cancelled => FinishKind::Cancelled,
                    FinishReason::Failed(err) => {
                        finder_error!("Run {} failed: {}", outcome.run_id, err);
                        FinishKind::Failed(err.to_string())
                    }
                };
                finder_info!(
                    "Run {} finished: records={} skipped={}",
                    outcome.run_id,
                    outcome.records_emitted,
                    outcome.items_skipped
                );
                Msg::Finished(kind)
            }
        };
        let _ = self.tx.send(msg);
    }
}

fn to_row(record: EnrichedRecord) -> RecordRow {
    RecordRow {
        name: record.name,
        followers: record.follower_count,
        owner: record.owner_display_name,
        link: record.canonical_link,
        owner_email: record.owner_email,
        description: record.description,
    }
}

pub fn to_record(row: &RecordRow) -> EnrichedRecord {
    EnrichedRecord {
        name: row.name.clone(),
        follower_count: row.followers,
        owner_display_name: row.owner.clone(),
        owner_email: row.owner_email.clone(),
        canonical_link: row.link.clone(),
        description: row.description.clone(),
    }
}
