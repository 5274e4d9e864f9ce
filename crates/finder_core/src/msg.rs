use crate::{FinishKind, RecordRow};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User edited the genre input (comma or newline separated).
    GenresChanged(String),
    /// User clicked Search.
    SearchClicked,
    /// User clicked Stop (or pressed Ctrl-C).
    StopClicked,
    /// The engine refused to start the run.
    StartRejected(String),
    /// Best-effort upstream count for the whole query.
    TotalKnown { count: u64, estimated_secs: f64 },
    /// One more item processed (recorded or skipped).
    Progress { delta: u64 },
    /// Enriched playlist ready for the table.
    RecordReceived(RecordRow),
    /// Terminal event of the current run.
    Finished(FinishKind),
    /// UI/render tick to coalesce rendering.
    Tick,
}
