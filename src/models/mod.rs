use serde::Deserialize;
use std::fmt;

/// Episode record as returned by the Jellyfin `/Items` endpoint.
///
/// Only the fields the refresher looks at are deserialized; everything else
/// in the server's `BaseItemDto` is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Episode {
    pub id: String,
    #[serde(rename = "Name")]
    pub title: Option<String>,
    pub series_name: Option<String>,
    pub overview: Option<String>,
    pub parent_id: Option<String>,
    #[serde(rename = "ParentIndexNumber")]
    pub season_index: Option<i32>,
    #[serde(rename = "IndexNumber")]
    pub episode_index: Option<i32>,
    pub premiere_date: Option<String>,
}

impl Episode {
    /// True when the episode carries a synopsis. Only an absent or empty
    /// overview counts as missing.
    pub fn has_overview(&self) -> bool {
        self.overview.as_deref().is_some_and(|o| !o.is_empty())
    }
}

fn pad_index(index: Option<i32>) -> String {
    match index {
        Some(i) => format!("{:02}", i),
        None => "??".to_string(),
    }
}

/// Renders as `Series: S01E02 - Title`, used in refresh log lines
impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: S{}E{} - {}",
            self.series_name.as_deref().unwrap_or("Unknown Series"),
            pad_index(self.season_index),
            pad_index(self.episode_index),
            self.title.as_deref().unwrap_or("Unknown Title"),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<Episode>,
}

/// Jellyfin metadata refresh modes (`metadataRefreshMode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataRefreshMode {
    FullRefresh,
}

impl MetadataRefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataRefreshMode::FullRefresh => "FullRefresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    pub metadata_refresh_mode: MetadataRefreshMode,
    pub replace_all_metadata: bool,
}

impl RefreshOptions {
    /// Discard cached metadata and re-fetch everything from the providers
    pub fn full_replace() -> Self {
        Self {
            metadata_refresh_mode: MetadataRefreshMode::FullRefresh,
            replace_all_metadata: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label() {
        let episode = Episode {
            id: "abc".to_string(),
            title: Some("The Long Night".to_string()),
            series_name: Some("Game of Thrones".to_string()),
            season_index: Some(8),
            episode_index: Some(3),
            ..Default::default()
        };
        assert_eq!(
            episode.to_string(),
            "Game of Thrones: S08E03 - The Long Night"
        );
    }

    #[test]
    fn test_display_label_missing_fields() {
        let episode = Episode {
            id: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(episode.to_string(), "Unknown Series: S??E?? - Unknown Title");
    }

    #[test]
    fn test_has_overview() {
        let mut episode = Episode::default();
        assert!(!episode.has_overview());

        episode.overview = Some(String::new());
        assert!(!episode.has_overview());

        // Whitespace is still a synopsis the server returned
        episode.overview = Some("   ".to_string());
        assert!(episode.has_overview());

        episode.overview = Some("Jon rides north.".to_string());
        assert!(episode.has_overview());
    }

    #[test]
    fn test_parse_items_response() {
        let json = r#"{
            "Items": [
                {
                    "Id": "1f2e",
                    "Name": "Episode 3",
                    "SeriesName": "Frieren",
                    "Overview": "They travel north.",
                    "ParentId": "season-1",
                    "ParentIndexNumber": 1,
                    "IndexNumber": 3,
                    "Type": "Episode"
                }
            ],
            "TotalRecordCount": 1,
            "StartIndex": 0
        }"#;
        let response: ItemsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 1);

        let episode = &response.items[0];
        assert_eq!(episode.id, "1f2e");
        assert_eq!(episode.title.as_deref(), Some("Episode 3"));
        assert_eq!(episode.parent_id.as_deref(), Some("season-1"));
        assert_eq!(episode.season_index, Some(1));
        assert_eq!(episode.episode_index, Some(3));
    }

    #[test]
    fn test_full_replace_options() {
        let options = RefreshOptions::full_replace();
        assert_eq!(options.metadata_refresh_mode.as_str(), "FullRefresh");
        assert!(options.replace_all_metadata);
    }

    #[test]
    fn test_parse_items_response_without_items() {
        let response: ItemsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.items.is_empty());
    }
}
