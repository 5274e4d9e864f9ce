use crate::view_model::{AppViewModel, RecordRow, TotalView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Cancel requested; waiting for the run to confirm.
    Stopping,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishKind {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    session: SessionState,
    genre_input: String,
    active_genres: Vec<String>,
    rows: Vec<RecordRow>,
    total: Option<TotalView>,
    processed: u64,
    status: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            session: self.session,
            genre_input: self.genre_input.clone(),
            active_genres: self.active_genres.clone(),
            rows: self.rows.clone(),
            total: self.total,
            processed: self.processed,
            status: self.status.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_genre_input(&mut self, raw: String) {
        if self.genre_input != raw {
            self.genre_input = raw;
            self.mark_dirty();
        }
    }

    pub(crate) fn genre_input(&self) -> &str {
        &self.genre_input
    }

    /// Clears the previous table and enters `Running` for `genres`.
    pub(crate) fn begin_run(&mut self, genres: Vec<String>) {
        self.session = SessionState::Running;
        self.active_genres = genres;
        self.rows.clear();
        self.total = None;
        self.processed = 0;
        self.status = Some("Searching...".to_string());
        self.mark_dirty();
    }

    pub(crate) fn request_stop(&mut self) {
        self.session = SessionState::Stopping;
        self.status = Some("Stopping after the current playlist...".to_string());
        self.mark_dirty();
    }

    pub(crate) fn reject_start(&mut self, reason: String) {
        self.session = SessionState::Idle;
        self.active_genres.clear();
        self.status = Some(format!("Could not start search: {reason}"));
        self.mark_dirty();
    }

    pub(crate) fn apply_total(&mut self, count: u64, estimated_secs: f64) {
        self.total = Some(TotalView {
            count,
            estimated_secs,
        });
        self.mark_dirty();
    }

    pub(crate) fn apply_progress(&mut self, delta: u64) {
        self.processed = self.processed.saturating_add(delta);
        self.mark_dirty();
    }

    pub(crate) fn push_row(&mut self, row: RecordRow) {
        self.rows.push(row);
        self.mark_dirty();
    }

    pub(crate) fn finish(&mut self, kind: FinishKind) {
        let (session, status) = match kind {
            FinishKind::Completed => (
                SessionState::Completed,
                format!("Search finished: {} playlists.", self.rows.len()),
            ),
            FinishKind::Cancelled => (
                SessionState::Cancelled,
                format!("Search stopped: {} playlists.", self.rows.len()),
            ),
            FinishKind::Failed(reason) => (
                SessionState::Failed,
                format!("Search failed after {} playlists: {reason}", self.rows.len()),
            ),
        };
        self.session = session;
        self.status = Some(status);
        self.mark_dirty();
    }
}

/// Splits user input on commas and newlines, trimming and dropping blanks.
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|genre| !genre.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
