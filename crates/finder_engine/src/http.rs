//! Catalog client over the public web API using `reqwest`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use finder_logging::{finder_debug, finder_info, finder_trace};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::{CatalogClient, CatalogConnector};
use crate::{
    CatalogError, CatalogSettings, Credentials, OwnerRef, Page, PlaylistDetail, PlaylistSummary,
    UserProfile, UNKNOWN,
};

/// Tokens are renewed this long before the lifetime the server announced.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Option<Duration>,
}

/// Bearer value plus the instant after which it should no longer be sent.
struct HeldToken {
    value: String,
    renew_at: Option<Instant>,
}

impl HeldToken {
    fn issued(token: AccessToken) -> Self {
        Self {
            renew_at: token
                .expires_in
                .map(|lifetime| Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN)),
            value: token.value,
        }
    }

    fn is_stale(&self) -> bool {
        self.renew_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Client-credentials grant against `token_url`.
pub async fn request_access_token(
    client: &reqwest::Client,
    token_url: &str,
    credentials: &Credentials,
) -> Result<AccessToken, CatalogError> {
    let url = Url::parse(token_url).map_err(|err| CatalogError::InvalidUrl(err.to_string()))?;
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .finish();

    let response = client
        .post(url.clone())
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await?;

    let status = response.status();
    // The accounts service answers bad client credentials with 400 invalid_client.
    if status == StatusCode::BAD_REQUEST {
        let message = response.text().await.unwrap_or_default();
        return Err(CatalogError::Auth {
            status: status.as_u16(),
            message,
        });
    }
    classify_status(status, response.headers(), url.as_str(), "access token")?;

    let bytes = response.bytes().await?;
    let raw: RawToken = decode(&bytes, "access token response")?;
    finder_debug!("obtained access token type={}", raw.token_type);
    Ok(AccessToken {
        value: raw.access_token,
        expires_in: raw.expires_in.map(Duration::from_secs),
    })
}

/// Catalog session bound to one bearer token.
///
/// When built with credentials, the token is renewed ahead of its announced
/// expiry, and a 401 still triggers one refresh and a single replay.
pub struct ReqwestCatalog {
    client: reqwest::Client,
    api_base: Url,
    token: Mutex<HeldToken>,
    refresh: Option<(String, Credentials)>,
}

impl ReqwestCatalog {
    pub fn new(settings: &CatalogSettings, token: AccessToken) -> Result<Self, CatalogError> {
        let client = build_client(settings)?;
        Self::with_client(client, &settings.api_base_url, token, None)
    }

    fn with_client(
        client: reqwest::Client,
        api_base_url: &str,
        token: AccessToken,
        refresh: Option<(String, Credentials)>,
    ) -> Result<Self, CatalogError> {
        let trimmed = api_base_url.trim_end_matches('/');
        let api_base =
            Url::parse(trimmed).map_err(|err| CatalogError::InvalidUrl(err.to_string()))?;
        if api_base.cannot_be_a_base() {
            return Err(CatalogError::InvalidUrl(format!(
                "{api_base_url} cannot be a base url"
            )));
        }
        Ok(Self {
            client,
            api_base,
            token: Mutex::new(HeldToken::issued(token)),
            refresh,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_token<R>(&self, f: impl FnOnce(&mut HeldToken) -> R) -> R {
        match self.token.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn current_token(&self) -> String {
        self.with_token(|held| held.value.clone())
    }

    async fn refresh_token(
        &self,
        token_url: &str,
        credentials: &Credentials,
    ) -> Result<(), CatalogError> {
        let token = request_access_token(&self.client, token_url, credentials).await?;
        self.with_token(|held| *held = HeldToken::issued(token));
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> Result<T, CatalogError> {
        let mut refreshed = false;
        if let Some((token_url, credentials)) = &self.refresh {
            if self.with_token(|held| held.is_stale()) {
                finder_debug!("access token near expiry, renewing before {resource}");
                self.refresh_token(token_url, credentials).await?;
            }
        }
        loop {
            finder_trace!("GET {}", url);
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(self.current_token())
                .send()
                .await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                if let Some((token_url, credentials)) = &self.refresh {
                    finder_info!("access token rejected, refreshing before retrying {resource}");
                    self.refresh_token(token_url, credentials).await?;
                    refreshed = true;
                    continue;
                }
            }

            classify_status(status, response.headers(), url.as_str(), resource)?;
            let bytes = response.bytes().await?;
            return decode(&bytes, resource);
        }
    }
}

#[async_trait::async_trait]
impl CatalogClient for ReqwestCatalog {
    async fn search(&self, genre: &str, limit: u32, offset: u32) -> Result<Page, CatalogError> {
        let mut url = self.endpoint(&["search"])?;
        url.query_pairs_mut()
            .append_pair("q", &format!("genre:{genre}"))
            .append_pair("type", "playlist")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let raw: RawSearch = self
            .get_json(url, &format!("search genre={genre} offset={offset}"))
            .await?;
        let entries = raw.playlists.items.len();
        let items: Vec<PlaylistSummary> = raw
            .playlists
            .items
            .into_iter()
            .flatten()
            .map(RawPlaylist::into_summary)
            .collect();
        Ok(Page {
            total: raw.playlists.total,
            dropped_entries: entries - items.len(),
            items,
        })
    }

    async fn playlist_detail(&self, playlist_id: &str) -> Result<PlaylistDetail, CatalogError> {
        let url = self.endpoint(&["playlists", playlist_id])?;
        let raw: RawPlaylist = self.get_json(url, &format!("playlist {playlist_id}")).await?;
        Ok(raw.into_detail())
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile, CatalogError> {
        let url = self.endpoint(&["users", user_id])?;
        let raw: RawUser = self.get_json(url, &format!("user {user_id}")).await?;
        Ok(UserProfile {
            id: raw.id,
            email: raw.email,
        })
    }
}

/// Exchanges credentials for a token and hands out [`ReqwestCatalog`] sessions.
#[derive(Debug, Clone, Default)]
pub struct HttpCatalogConnector {
    settings: CatalogSettings,
}

impl HttpCatalogConnector {
    pub fn new(settings: CatalogSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl CatalogConnector for HttpCatalogConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn CatalogClient>, CatalogError> {
        let client = build_client(&self.settings)?;
        let token = request_access_token(&client, &self.settings.token_url, credentials).await?;
        let catalog = ReqwestCatalog::with_client(
            client,
            &self.settings.api_base_url,
            token,
            Some((self.settings.token_url.clone(), credentials.clone())),
        )?;
        Ok(Box::new(catalog))
    }
}

fn build_client(settings: &CatalogSettings) -> Result<reqwest::Client, CatalogError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .build()
        .map_err(|err| CatalogError::transient(err.to_string()))
}

fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    url: &str,
    resource: &str,
) -> Result<(), CatalogError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CatalogError::Auth {
            status: status.as_u16(),
            message: format!("{resource}: {status}"),
        }),
        StatusCode::NOT_FOUND => Err(CatalogError::NotFound {
            resource: resource.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Err(CatalogError::Transient {
            message: format!("{resource}: rate limited"),
            retry_after: parse_retry_after(headers),
        }),
        _ if status.is_server_error() => Err(CatalogError::Transient {
            message: format!("{resource}: {status}"),
            retry_after: None,
        }),
        _ => Err(CatalogError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn decode<T: DeserializeOwned>(bytes: &[u8], context: &str) -> Result<T, CatalogError> {
    serde_json::from_slice(bytes).map_err(|source| CatalogError::Decode {
        context: context.to_string(),
        source,
    })
}

#[derive(Deserialize)]
struct RawToken {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct RawSearch {
    playlists: RawPlaylistPage,
}

#[derive(Deserialize)]
struct RawPlaylistPage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    items: Vec<Option<RawPlaylist>>,
}

#[derive(Deserialize)]
struct RawPlaylist {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    followers: Option<RawFollowers>,
    owner: RawOwner,
    #[serde(default)]
    external_urls: RawExternalUrls,
}

impl RawPlaylist {
    fn follower_total(&self) -> Option<u64> {
        self.followers.as_ref().and_then(|followers| followers.total)
    }

    fn link(&self) -> String {
        self.external_urls
            .spotify
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn into_summary(self) -> PlaylistSummary {
        PlaylistSummary {
            follower_total: self.follower_total(),
            external_link: self.link(),
            id: self.id,
            name: self.name,
            owner: self.owner.into(),
        }
    }

    fn into_detail(self) -> PlaylistDetail {
        PlaylistDetail {
            follower_total: self.follower_total(),
            external_link: self.link(),
            id: self.id,
            name: self.name,
            owner: self.owner.into(),
            description: self.description,
        }
    }
}

#[derive(Deserialize)]
struct RawFollowers {
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Deserialize)]
struct RawOwner {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl From<RawOwner> for OwnerRef {
    fn from(raw: RawOwner) -> Self {
        OwnerRef {
            id: raw.id,
            display_name: raw.display_name,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}
