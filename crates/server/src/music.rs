//! Thin client for the YouTube Data API v3.
//!
//! Every call forwards its parameters and returns the provider JSON
//! untouched; the tool layer decides how to present it.

use crate::config::MusicApiConfig;
use crate::credentials::Credential;
use crate::error::MusicApiError;
use serde::Serialize;
use serde_json::{Value, json};

pub const MAX_PAGE_SIZE: u32 = 50;

/// Upper bound on playlist pages scanned when matching video ids to items.
const MAX_SCAN_PAGES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    Private,
    Public,
    Unlisted,
}

impl Privacy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PRIVATE" => Some(Privacy::Private),
            "PUBLIC" => Some(Privacy::Public),
            "UNLISTED" => Some(Privacy::Unlisted),
            _ => None,
        }
    }

    pub fn as_api_str(self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
        }
    }
}

/// Fields to change on an existing playlist.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaylistChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub privacy: Option<Privacy>,
}

impl PlaylistChanges<'_> {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.privacy.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct RemovedItems {
    /// Playlist item ids that were deleted.
    pub removed: Vec<String>,
    /// Requested video ids with no entry in the playlist.
    pub not_found: Vec<String>,
}

/// Maps a music-catalog filter onto a search `type`.
fn search_type(filter: Option<&str>) -> &'static str {
    match filter.map(|f| f.to_ascii_lowercase()).as_deref() {
        Some("albums") | Some("playlists") | Some("community_playlists")
        | Some("featured_playlists") => "playlist",
        Some("artists") | Some("uploads") => "channel",
        _ => "video",
    }
}

#[derive(Clone)]
pub struct MusicClient {
    http: reqwest::Client,
    base_url: String,
}

impl MusicClient {
    pub fn new(config: &MusicApiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    pub async fn search(
        &self,
        credential: &Credential,
        query: &str,
        filter: Option<&str>,
        limit: u32,
    ) -> Result<Value, MusicApiError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let kind = search_type(filter);
        let mut params = vec![
            ("part", "snippet"),
            ("q", query),
            ("type", kind),
            ("maxResults", limit.as_str()),
        ];
        // Music category only exists for videos.
        if kind == "video" {
            params.push(("videoCategoryId", "10"));
        }
        let request = self.http.get(self.url("search")).query(&params);
        self.send(credential, request).await
    }

    pub async fn create_playlist(
        &self,
        credential: &Credential,
        title: &str,
        description: &str,
        privacy: Privacy,
    ) -> Result<Value, MusicApiError> {
        let body = json!({
            "snippet": { "title": title, "description": description },
            "status": { "privacyStatus": privacy.as_api_str() },
        });
        let request = self
            .http
            .post(self.url("playlists"))
            .query(&[("part", "snippet,status")])
            .json(&body);
        self.send(credential, request).await
    }

    /// Appends videos in order. Stops at the first failure.
    pub async fn add_items(
        &self,
        credential: &Credential,
        playlist_id: &str,
        video_ids: &[String],
    ) -> Result<Vec<Value>, MusicApiError> {
        let mut added = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            let body = json!({
                "snippet": {
                    "playlistId": playlist_id,
                    "resourceId": { "kind": "youtube#video", "videoId": video_id },
                }
            });
            let request = self
                .http
                .post(self.url("playlistItems"))
                .query(&[("part", "snippet")])
                .json(&body);
            added.push(self.send(credential, request).await?);
        }
        Ok(added)
    }

    pub async fn get_playlists(
        &self,
        credential: &Credential,
        limit: u32,
    ) -> Result<Value, MusicApiError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let request = self.http.get(self.url("playlists")).query(&[
            ("part", "snippet,contentDetails,status"),
            ("mine", "true"),
            ("maxResults", limit.as_str()),
        ]);
        self.send(credential, request).await
    }

    /// Playlist metadata plus its first page of items.
    pub async fn get_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str,
        limit: Option<u32>,
    ) -> Result<Value, MusicApiError> {
        let playlist = self.playlist_resource(credential, playlist_id).await?;

        let limit = limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE).to_string();
        let items_request = self.http.get(self.url("playlistItems")).query(&[
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", limit.as_str()),
        ]);
        let items = self.send(credential, items_request).await?;

        Ok(json!({
            "playlist": playlist,
            "items": items.get("items").cloned().unwrap_or_else(|| json!([])),
            "totalResults": items.pointer("/pageInfo/totalResults").cloned(),
        }))
    }

    /// Updates title, description and privacy. Unset fields keep their
    /// current value, since the API replaces the whole snippet.
    pub async fn update_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str,
        changes: PlaylistChanges<'_>,
    ) -> Result<Value, MusicApiError> {
        let current = self.playlist_resource(credential, playlist_id).await?;
        let title = changes
            .title
            .or_else(|| current.pointer("/snippet/title").and_then(Value::as_str))
            .unwrap_or_default();
        let description = changes
            .description
            .or_else(|| current.pointer("/snippet/description").and_then(Value::as_str))
            .unwrap_or_default();
        let privacy = changes
            .privacy
            .map(Privacy::as_api_str)
            .or_else(|| current.pointer("/status/privacyStatus").and_then(Value::as_str))
            .unwrap_or(Privacy::Private.as_api_str());

        let body = json!({
            "id": playlist_id,
            "snippet": { "title": title, "description": description },
            "status": { "privacyStatus": privacy },
        });
        let request = self
            .http
            .put(self.url("playlists"))
            .query(&[("part", "snippet,status")])
            .json(&body);
        self.send(credential, request).await
    }

    pub async fn delete_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str,
    ) -> Result<(), MusicApiError> {
        let request = self
            .http
            .delete(self.url("playlists"))
            .query(&[("id", playlist_id)]);
        self.send_checked(credential, request).await.map(drop)
    }

    /// Deletes playlist entries. Video ids are matched against the
    /// playlist's items; every occurrence of a video is removed.
    pub async fn remove_items(
        &self,
        credential: &Credential,
        playlist_id: &str,
        video_ids: &[String],
        item_ids: &[String],
    ) -> Result<RemovedItems, MusicApiError> {
        let mut targets: Vec<String> = item_ids.to_vec();
        let mut not_found = Vec::new();
        if !video_ids.is_empty() {
            let items = self.all_items(credential, playlist_id).await?;
            for video_id in video_ids {
                let matches: Vec<String> = items
                    .iter()
                    .filter(|item| {
                        item.pointer("/snippet/resourceId/videoId").and_then(Value::as_str)
                            == Some(video_id.as_str())
                    })
                    .filter_map(|item| item.get("id").and_then(Value::as_str).map(String::from))
                    .collect();
                if matches.is_empty() {
                    not_found.push(video_id.clone());
                }
                targets.extend(matches);
            }
        }
        targets.sort();
        targets.dedup();

        for item_id in &targets {
            let request = self
                .http
                .delete(self.url("playlistItems"))
                .query(&[("id", item_id.as_str())]);
            self.send_checked(credential, request).await?;
        }
        Ok(RemovedItems {
            removed: targets,
            not_found,
        })
    }

    async fn all_items(
        &self,
        credential: &Credential,
        playlist_id: &str,
    ) -> Result<Vec<Value>, MusicApiError> {
        let page_size = MAX_PAGE_SIZE.to_string();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_SCAN_PAGES {
            let mut params = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let request = self.http.get(self.url("playlistItems")).query(&params);
            let page = self.send(credential, request).await?;
            if let Some(batch) = page.get("items").and_then(Value::as_array) {
                items.extend(batch.iter().cloned());
            }
            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(String::from);
            if page_token.is_none() {
                break;
            }
        }
        Ok(items)
    }

    async fn playlist_resource(
        &self,
        credential: &Credential,
        playlist_id: &str,
    ) -> Result<Value, MusicApiError> {
        let request = self.http.get(self.url("playlists")).query(&[
            ("part", "snippet,contentDetails,status"),
            ("id", playlist_id),
        ]);
        let meta = self.send(credential, request).await?;
        meta.get("items")
            .and_then(|items| items.get(0))
            .cloned()
            .ok_or(MusicApiError::Http {
                status: 404,
                context: format!("playlist {playlist_id} not found"),
            })
    }

    async fn send(
        &self,
        credential: &Credential,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, MusicApiError> {
        let response = self.send_checked(credential, request).await?;
        Ok(response.json::<Value>().await?)
    }

    /// Sends the request and maps non-success statuses to errors.
    async fn send_checked(
        &self,
        credential: &Credential,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MusicApiError> {
        let response = credential.apply(request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MusicApiError::Unauthorized);
        }
        if !status.is_success() {
            let context = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            tracing::warn!(status = status.as_u16(), %context, "music API call failed");
            return Err(MusicApiError::Http {
                status: status.as_u16(),
                context,
            });
        }
        Ok(response)
    }
}
