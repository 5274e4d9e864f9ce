use crate::SessionState;

/// One table row, in the column order the results table shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub name: String,
    pub followers: u64,
    pub owner: String,
    pub link: String,
    pub owner_email: String,
    pub description: String,
}

/// Upstream playlist count; both fields are estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalView {
    pub count: u64,
    pub estimated_secs: f64,
}

impl TotalView {
    pub fn label(&self) -> String {
        format!(
            "Total playlists: ~{} (estimate) - Estimated time: {:.2} seconds (estimate)",
            self.count, self.estimated_secs
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub session: SessionState,
    pub genre_input: String,
    pub active_genres: Vec<String>,
    /// Rows in arrival order.
    pub rows: Vec<RecordRow>,
    pub total: Option<TotalView>,
    pub processed: u64,
    pub status: Option<String>,
    pub dirty: bool,
}

impl AppViewModel {
    /// Processed fraction against the estimate, clamped to `0.0..=1.0`.
    ///
    /// Upstream totals drift, so more items than announced simply pin at 1.0.
    pub fn progress_fraction(&self) -> Option<f64> {
        let total = self.total?.count;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.processed as f64 / total as f64).min(1.0))
    }
}

/// Rows ordered by followers, most followed first; ties keep arrival order.
pub fn sorted_by_followers(rows: &[RecordRow]) -> Vec<RecordRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| b.followers.cmp(&a.followers));
    sorted
}
