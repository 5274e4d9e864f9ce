#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use finder_engine::{
    CatalogClient, CatalogConnector, CatalogError, Credentials, OwnerRef, Page, PipelineConfig,
    PipelineEvent, PlaylistDetail, PlaylistSummary, ResultSink, UserProfile,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(finder_logging::initialize_for_tests);
}

/// Fast config: no courtesy delay, no backoff.
pub fn test_config(page_size: u32) -> PipelineConfig {
    PipelineConfig {
        page_size,
        item_delay: Duration::ZERO,
        max_retries: 2,
        backoff_base: Duration::ZERO,
        max_backoff: Duration::from_secs(1),
        per_item_latency: Duration::from_millis(100),
        max_offset: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search {
        genre: String,
        limit: u32,
        offset: u32,
    },
    Detail(String),
    User(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Auth,
    /// Fails transiently this many times, then succeeds.
    Transient(u32),
    /// Always rate limited with this `Retry-After`.
    RateLimited(Duration),
    Unexpected(u16),
    Malformed,
}

impl Failure {
    /// The error for one call, or `None` once a transient budget is spent.
    fn next_error(&mut self, resource: &str) -> Option<CatalogError> {
        match self {
            Failure::NotFound => Some(CatalogError::NotFound {
                resource: resource.to_string(),
            }),
            Failure::Auth => Some(CatalogError::Auth {
                status: 401,
                message: "token expired".to_string(),
            }),
            Failure::Transient(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(CatalogError::Transient {
                    message: "connection reset".to_string(),
                    retry_after: None,
                })
            }
            Failure::Transient(_) => None,
            Failure::RateLimited(wait) => Some(CatalogError::Transient {
                message: "429 Too Many Requests".to_string(),
                retry_after: Some(*wait),
            }),
            Failure::Unexpected(status) => Some(CatalogError::UnexpectedStatus {
                status: *status,
                url: format!("https://api.example/{resource}"),
            }),
            Failure::Malformed => Some(CatalogError::Decode {
                context: resource.to_string(),
                source: serde_json::from_str::<serde_json::Value>("{\"items\": [")
                    .unwrap_err(),
            }),
        }
    }
}

fn injected(
    failures: &Mutex<HashMap<String, Failure>>,
    key: &str,
    resource: &str,
) -> Option<CatalogError> {
    failures
        .lock()
        .unwrap()
        .get_mut(key)
        .and_then(|failure| failure.next_error(resource))
}

/// In-memory catalog keyed by genre; records every call it receives.
#[derive(Default)]
pub struct FixtureCatalog {
    genres: HashMap<String, Vec<PlaylistSummary>>,
    totals: HashMap<String, u64>,
    descriptions: HashMap<String, String>,
    emails: HashMap<String, String>,
    detail_failures: Mutex<HashMap<String, Failure>>,
    page_failures: Mutex<HashMap<String, Failure>>,
    user_failures: Mutex<HashMap<String, Failure>>,
    fail_total_counts: bool,
    calls: Mutex<Vec<Call>>,
}

pub fn playlist(id: &str, owner: &str) -> PlaylistSummary {
    PlaylistSummary {
        id: id.to_string(),
        name: format!("Playlist {id}"),
        follower_total: Some(id.len() as u64 * 10),
        owner: OwnerRef {
            id: owner.to_string(),
            display_name: Some(format!("Owner {owner}")),
        },
        external_link: format!("https://open.example/playlist/{id}"),
    }
}

impl FixtureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds playlists for a genre, each owned by `owner-<id>` with an email
    /// and a description.
    pub fn with_genre(mut self, genre: &str, ids: &[&str]) -> Self {
        let items = ids
            .iter()
            .map(|id| {
                let owner = format!("owner-{id}");
                self.descriptions
                    .insert(id.to_string(), format!("About {id}"));
                self.emails
                    .insert(owner.clone(), format!("{owner}@example.com"));
                playlist(id, &owner)
            })
            .collect();
        self.genres.insert(genre.to_string(), items);
        self
    }

    pub fn with_total(mut self, genre: &str, total: u64) -> Self {
        self.totals.insert(genre.to_string(), total);
        self
    }

    pub fn without_description(mut self, id: &str) -> Self {
        self.descriptions.remove(id);
        self
    }

    pub fn without_email(mut self, owner: &str) -> Self {
        self.emails.remove(owner);
        self
    }

    pub fn failing_detail(self, id: &str, failure: Failure) -> Self {
        self.detail_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), failure);
        self
    }

    /// Fails every page fetch for `genre`; total lookups are unaffected.
    pub fn failing_pages(self, genre: &str, failure: Failure) -> Self {
        self.page_failures
            .lock()
            .unwrap()
            .insert(genre.to_string(), failure);
        self
    }

    pub fn failing_user(self, owner: &str, failure: Failure) -> Self {
        self.user_failures
            .lock()
            .unwrap()
            .insert(owner.to_string(), failure);
        self
    }

    pub fn failing_total_counts(mut self) -> Self {
        self.fail_total_counts = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn find(&self, id: &str) -> Option<&PlaylistSummary> {
        self.genres.values().flatten().find(|p| p.id == id)
    }
}

#[async_trait::async_trait]
impl CatalogClient for FixtureCatalog {
    async fn search(&self, genre: &str, limit: u32, offset: u32) -> Result<Page, CatalogError> {
        self.record(Call::Search {
            genre: genre.to_string(),
            limit,
            offset,
        });
        if self.fail_total_counts && limit == 1 {
            return Err(CatalogError::Transient {
                message: "count timeout".to_string(),
                retry_after: None,
            });
        }
        if limit != 1 {
            if let Some(err) = injected(&self.page_failures, genre, &format!("search {genre}")) {
                return Err(err);
            }
        }
        let all = self.genres.get(genre).cloned().unwrap_or_default();
        let total = self
            .totals
            .get(genre)
            .copied()
            .unwrap_or(all.len() as u64);
        let items = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Page {
            total,
            items,
            dropped_entries: 0,
        })
    }

    async fn playlist_detail(&self, playlist_id: &str) -> Result<PlaylistDetail, CatalogError> {
        self.record(Call::Detail(playlist_id.to_string()));
        if let Some(err) = injected(
            &self.detail_failures,
            playlist_id,
            &format!("playlist {playlist_id}"),
        ) {
            return Err(err);
        }
        let summary = self.find(playlist_id).ok_or_else(|| CatalogError::NotFound {
            resource: format!("playlist {playlist_id}"),
        })?;
        Ok(PlaylistDetail {
            id: summary.id.clone(),
            name: summary.name.clone(),
            follower_total: summary.follower_total,
            owner: summary.owner.clone(),
            external_link: summary.external_link.clone(),
            description: self.descriptions.get(playlist_id).cloned(),
        })
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile, CatalogError> {
        self.record(Call::User(user_id.to_string()));
        if let Some(err) = injected(&self.user_failures, user_id, &format!("user {user_id}")) {
            return Err(err);
        }
        Ok(UserProfile {
            id: user_id.to_string(),
            email: self.emails.get(user_id).cloned(),
        })
    }
}

/// Shares one fixture between the test and the connected session.
pub struct SharedCatalog(pub Arc<FixtureCatalog>);

#[async_trait::async_trait]
impl CatalogClient for SharedCatalog {
    async fn search(&self, genre: &str, limit: u32, offset: u32) -> Result<Page, CatalogError> {
        self.0.search(genre, limit, offset).await
    }

    async fn playlist_detail(&self, playlist_id: &str) -> Result<PlaylistDetail, CatalogError> {
        self.0.playlist_detail(playlist_id).await
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile, CatalogError> {
        self.0.user(user_id).await
    }
}

pub struct FixtureConnector {
    pub catalog: Arc<FixtureCatalog>,
    pub connects: AtomicUsize,
    pub reject: bool,
}

impl FixtureConnector {
    pub fn new(catalog: FixtureCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            connects: AtomicUsize::new(0),
            reject: false,
        }
    }

    pub fn rejecting(catalog: FixtureCatalog) -> Self {
        Self {
            reject: true,
            ..Self::new(catalog)
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CatalogConnector for FixtureConnector {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn CatalogClient>, CatalogError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(CatalogError::Auth {
                status: 400,
                message: "invalid_client".to_string(),
            });
        }
        Ok(Box::new(SharedCatalog(self.catalog.clone())))
    }
}

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ResultSink for CollectingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn record_names(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Record(record) => Some(record.name.clone()),
            _ => None,
        })
        .collect()
}

pub fn test_credentials() -> Credentials {
    Credentials::new("client-id", "client-secret-value")
}
