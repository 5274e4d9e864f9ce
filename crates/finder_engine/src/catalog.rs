use crate::{CatalogError, Credentials, Page, PlaylistDetail, UserProfile};

/// Read access to the remote playlist catalog.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search(&self, genre: &str, limit: u32, offset: u32) -> Result<Page, CatalogError>;

    async fn playlist_detail(&self, playlist_id: &str) -> Result<PlaylistDetail, CatalogError>;

    async fn user(&self, user_id: &str) -> Result<UserProfile, CatalogError>;
}

/// Opens a catalog session from credentials.
///
/// Called on the background context so the session never crosses threads
/// with the caller.
#[async_trait::async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self, credentials: &Credentials)
        -> Result<Box<dyn CatalogClient>, CatalogError>;
}
