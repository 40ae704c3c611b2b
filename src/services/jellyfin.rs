// Jellyfin API client
// API Documentation: https://api.jellyfin.org/

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client};

use crate::models::{Episode, ItemsResponse, RefreshOptions};

const CLIENT_NAME: &str = "Episode Refresher";
const DEVICE_NAME: &str = "Episode Refresher";
const DEVICE_ID: &str = "episode-refresher-docker";

/// Number of sibling episodes sampled when judging a placeholder title
pub const SIBLING_SAMPLE_SIZE: u32 = 5;

/// Read-only lookup of the episodes sharing a season with another episode
#[async_trait]
pub trait SiblingFetcher: Send + Sync {
    /// Up to [`SIBLING_SAMPLE_SIZE`] episodes of the season, highest index first
    async fn season_siblings(&self, parent_id: &str) -> Result<Vec<Episode>>;
}

/// The slice of the media server API the refresh job needs
#[async_trait]
pub trait MediaLibrary: SiblingFetcher {
    /// All episodes, across the whole library, that premiered on or after `since`
    async fn recent_episodes(&self, since: DateTime<Utc>) -> Result<Vec<Episode>>;

    async fn refresh_item(&self, item_id: &str, options: &RefreshOptions) -> Result<()>;
}

/// Filter for `GET /Items`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemsQuery {
    pub include_item_types: Vec<String>,
    pub min_premiere_date: Option<DateTime<Utc>>,
    pub fields: Vec<String>,
    pub parent_id: Option<String>,
    pub recursive: Option<bool>,
    pub sort_by: Vec<String>,
    pub sort_order: Option<String>,
    pub limit: Option<u32>,
}

impl ItemsQuery {
    /// Every episode in the library that premiered on or after `since`
    pub fn recent_episodes(since: DateTime<Utc>) -> Self {
        Self {
            include_item_types: vec!["Episode".to_string()],
            min_premiere_date: Some(since),
            fields: vec![
                "OriginalTitle".to_string(),
                "Overview".to_string(),
                "ParentId".to_string(),
            ],
            recursive: Some(true),
            ..Default::default()
        }
    }

    /// The latest episodes of one season, by episode number descending
    pub fn season_siblings(parent_id: &str) -> Self {
        Self {
            include_item_types: vec!["Episode".to_string()],
            fields: vec!["Overview".to_string()],
            parent_id: Some(parent_id.to_string()),
            recursive: Some(false),
            sort_by: vec!["IndexNumber".to_string()],
            sort_order: Some("Descending".to_string()),
            limit: Some(SIBLING_SAMPLE_SIZE),
            ..Default::default()
        }
    }

    /// Encode as a URL query string (without the leading `?`)
    pub fn to_query_string(&self) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();

        if !self.include_item_types.is_empty() {
            params.push(("IncludeItemTypes", self.include_item_types.join(",")));
        }
        if let Some(date) = self.min_premiere_date {
            params.push((
                "MinPremiereDate",
                date.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if !self.fields.is_empty() {
            params.push(("Fields", self.fields.join(",")));
        }
        if let Some(ref parent_id) = self.parent_id {
            params.push(("ParentId", parent_id.clone()));
        }
        if let Some(recursive) = self.recursive {
            params.push(("Recursive", recursive.to_string()));
        }
        if !self.sort_by.is_empty() {
            params.push(("SortBy", self.sort_by.join(",")));
        }
        if let Some(ref order) = self.sort_order {
            params.push(("SortOrder", order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("Limit", limit.to_string()));
        }

        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Jellyfin API client, authenticated with a server API key
pub struct JellyfinClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl JellyfinClient {
    /// Create a new client. `base_url` may carry a trailing slash.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Value of the `Authorization` header Jellyfin expects from API clients
    fn authorization(&self) -> String {
        format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\", Token=\"{}\"",
            CLIENT_NAME,
            DEVICE_NAME,
            DEVICE_ID,
            env!("CARGO_PKG_VERSION"),
            self.api_key
        )
    }

    /// Query items matching the filter
    pub async fn get_items(&self, query: &ItemsQuery) -> Result<Vec<Episode>> {
        let url = format!("{}/Items?{}", self.base_url, query.to_query_string());
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.authorization())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .context("Failed to query Jellyfin items")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Jellyfin item query failed with status: {}",
                response.status()
            );
        }

        let body: ItemsResponse = response
            .json()
            .await
            .context("Failed to parse Jellyfin items response")?;

        Ok(body.items)
    }

    /// Ask the server to refresh an item's metadata. Returns once the
    /// refresh is queued; the server does the work in the background.
    pub async fn refresh_item(&self, item_id: &str, options: &RefreshOptions) -> Result<()> {
        let url = format!(
            "{}/Items/{}/Refresh?metadataRefreshMode={}&replaceAllMetadata={}",
            self.base_url,
            urlencoding::encode(item_id),
            options.metadata_refresh_mode.as_str(),
            options.replace_all_metadata
        );
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .with_context(|| format!("Failed to request refresh of item {}", item_id))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Jellyfin refresh of item {} failed with status: {}",
                item_id,
                response.status()
            );
        }

        Ok(())
    }
}

#[async_trait]
impl SiblingFetcher for JellyfinClient {
    async fn season_siblings(&self, parent_id: &str) -> Result<Vec<Episode>> {
        self.get_items(&ItemsQuery::season_siblings(parent_id))
            .await
            .with_context(|| format!("Failed to fetch episodes of season {}", parent_id))
    }
}

#[async_trait]
impl MediaLibrary for JellyfinClient {
    async fn recent_episodes(&self, since: DateTime<Utc>) -> Result<Vec<Episode>> {
        self.get_items(&ItemsQuery::recent_episodes(since)).await
    }

    async fn refresh_item(&self, item_id: &str, options: &RefreshOptions) -> Result<()> {
        JellyfinClient::refresh_item(self, item_id, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;

    #[test]
    fn test_recent_episodes_query_string() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let query = ItemsQuery::recent_episodes(since).to_query_string();

        assert_eq!(
            query,
            "IncludeItemTypes=Episode\
             &MinPremiereDate=2024-03-01T12%3A00%3A00.000Z\
             &Fields=OriginalTitle%2COverview%2CParentId\
             &Recursive=true"
        );
    }

    #[test]
    fn test_season_siblings_query_string() {
        let query = ItemsQuery::season_siblings("season 1").to_query_string();

        assert_eq!(
            query,
            "IncludeItemTypes=Episode\
             &Fields=Overview\
             &ParentId=season%201\
             &Recursive=false\
             &SortBy=IndexNumber\
             &SortOrder=Descending\
             &Limit=5"
        );
    }

    #[test]
    fn test_authorization_header() {
        let client = JellyfinClient::new("http://localhost:8096/", "secret");
        let auth = client.authorization();

        assert!(auth.starts_with("MediaBrowser Client=\"Episode Refresher\""));
        assert!(auth.contains("DeviceId=\"episode-refresher-docker\""));
        assert!(auth.ends_with("Token=\"secret\""));
        assert_eq!(client.base_url, "http://localhost:8096");
    }

    #[tokio::test]
    async fn test_season_siblings_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/Items")
                .query_param("ParentId", "season-1")
                .query_param("IncludeItemTypes", "Episode")
                .query_param("SortBy", "IndexNumber")
                .query_param("SortOrder", "Descending")
                .query_param("Recursive", "false")
                .query_param("Limit", "5");
            then.status(200).json_body(serde_json::json!({
                "Items": [
                    { "Id": "e2", "Name": "The Reunion", "IndexNumber": 2 },
                    { "Id": "e1", "Name": "Episode 1", "IndexNumber": 1 }
                ],
                "TotalRecordCount": 2,
                "StartIndex": 0
            }));
        });

        let client = JellyfinClient::new(&server.base_url(), "secret");
        let siblings = client.season_siblings("season-1").await.unwrap();

        mock.assert();
        assert_eq!(siblings.len(), 2);
        assert_eq!(siblings[0].id, "e2");
        assert_eq!(siblings[0].title.as_deref(), Some("The Reunion"));
    }

    #[tokio::test]
    async fn test_recent_episodes_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/Items")
                .query_param("IncludeItemTypes", "Episode")
                .query_param("Recursive", "true")
                .query_param_exists("MinPremiereDate");
            then.status(200).json_body(serde_json::json!({
                "Items": [
                    { "Id": "a", "Name": "TBA", "Overview": null, "ParentId": "s1" }
                ]
            }));
        });

        let client = JellyfinClient::new(&server.base_url(), "secret");
        let episodes = client.recent_episodes(Utc::now()).await.unwrap();

        mock.assert();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].parent_id.as_deref(), Some("s1"));
        assert!(episodes[0].overview.is_none());
    }

    #[tokio::test]
    async fn test_get_items_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/Items");
            then.status(401);
        });

        let client = JellyfinClient::new(&server.base_url(), "wrong");
        let result = client.get_items(&ItemsQuery::season_siblings("s1")).await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("401"), "{err}");
    }

    #[tokio::test]
    async fn test_refresh_item_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/Items/abc123/Refresh")
                .query_param("metadataRefreshMode", "FullRefresh")
                .query_param("replaceAllMetadata", "true");
            then.status(204);
        });

        let client = JellyfinClient::new(&server.base_url(), "secret");
        client
            .refresh_item("abc123", &RefreshOptions::full_replace())
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_refresh_item_server_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/Items/abc123/Refresh");
            then.status(500);
        });

        let client = JellyfinClient::new(&server.base_url(), "secret");
        let result = client
            .refresh_item("abc123", &RefreshOptions::full_replace())
            .await;

        assert!(result.is_err());
    }
}
