//! Playlist finder engine: paginated catalog search, enrichment and event delivery.
mod auth;
mod catalog;
mod config;
mod error;
mod export;
mod http;
mod persist;
mod pipeline;
mod retry;
mod sink;
mod types;

pub use auth::{Credentials, CredentialStore, JsonFileCredentialStore, StaticCredentialStore};
pub use catalog::{CatalogClient, CatalogConnector};
pub use config::{CatalogSettings, PipelineConfig, MAX_PAGE_SIZE};
pub use error::{CatalogError, ConfigError, StartError};
pub use export::{export_results, ExportError, ExportOptions, ExportSummary};
pub use http::{request_access_token, AccessToken, HttpCatalogConnector, ReqwestCatalog};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{execute_run, Pipeline, RunCanceller, RunHandle};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sink::{ChannelResultSink, FanoutSink, JsonLinesSink, ResultSink, TextDumpSink};
pub use types::{
    EnrichedRecord, FailureKind, FinishReason, OwnerRef, Page, PipelineEvent, PlaylistDetail,
    PlaylistSummary, Query, RunError, RunId, RunOutcome, RunProgress, TotalEstimate, UserProfile,
    UNKNOWN,
};
