use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub type RunId = u64;

/// Sentinel used for optional record fields the catalog did not provide.
pub const UNKNOWN: &str = "unknown";

/// Ordered, validated list of genre search terms for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    genres: Vec<String>,
}

impl Query {
    /// Trims every genre and rejects an empty list or a blank entry.
    pub fn new<I, S>(genres: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for (index, genre) in genres.into_iter().enumerate() {
            let genre = genre.as_ref().trim();
            if genre.is_empty() {
                return Err(ConfigError::BlankGenre { index });
            }
            out.push(genre.to_string());
        }
        if out.is_empty() {
            return Err(ConfigError::EmptyQuery);
        }
        Ok(Self { genres: out })
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub id: String,
    pub display_name: Option<String>,
}

/// One entry of a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub follower_total: Option<u64>,
    pub owner: OwnerRef,
    pub external_link: String,
}

/// A batch of search results at one offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// Upstream hit count; best effort and may drift between requests.
    pub total: u64,
    pub items: Vec<PlaylistSummary>,
    /// Entries the upstream returned but that could not be used (null rows).
    pub dropped_entries: usize,
}

impl Page {
    /// True when the upstream returned no entries at all for this offset.
    pub fn is_exhausted(&self) -> bool {
        self.items.is_empty() && self.dropped_entries == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDetail {
    pub id: String,
    pub name: String,
    pub follower_total: Option<u64>,
    pub owner: OwnerRef,
    pub external_link: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
}

/// A playlist augmented with owner and descriptive detail.
///
/// Optional upstream fields are never absent here: they carry [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub name: String,
    pub follower_count: u64,
    pub owner_display_name: String,
    pub owner_email: String,
    pub canonical_link: String,
    pub description: String,
}

impl EnrichedRecord {
    pub fn from_lookups(detail: PlaylistDetail, owner: Option<UserProfile>) -> Self {
        Self {
            name: detail.name,
            follower_count: detail.follower_total.unwrap_or(0),
            owner_display_name: or_unknown(detail.owner.display_name),
            owner_email: or_unknown(owner.and_then(|profile| profile.email)),
            canonical_link: detail.external_link,
            description: or_unknown(detail.description),
        }
    }
}

fn or_unknown(value: Option<String>) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => UNKNOWN.to_string(),
    }
}

/// Upstream playlist count summed over all genres of a run.
///
/// Both the count and the derived duration are estimates for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalEstimate {
    pub count: u64,
    pub per_item: Duration,
}

impl TotalEstimate {
    pub fn estimated_duration(&self) -> Duration {
        let count = u32::try_from(self.count).unwrap_or(u32::MAX);
        self.per_item.saturating_mul(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    pub run_id: RunId,
    pub delta: u64,
    /// Items processed so far in this run, including skipped ones.
    pub processed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    TotalKnown(TotalEstimate),
    Progress(RunProgress),
    Record(EnrichedRecord),
    Finished(RunOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub reason: FinishReason,
    pub records_emitted: u64,
    pub items_skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Completed,
    Cancelled,
    Failed(RunError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: FailureKind,
    pub message: String,
}

impl RunError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    Network,
    Protocol,
    Runtime,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Auth => write!(f, "authentication rejected"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Protocol => write!(f, "unexpected catalog response"),
            FailureKind::Runtime => write!(f, "runtime error"),
        }
    }
}
