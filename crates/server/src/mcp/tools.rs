//! Static tool registry: name -> {description, input schema, handler}.

use crate::AppResources;
use crate::credentials::Credential;
use crate::error::ToolError;
use crate::music::{MusicClient, PlaylistChanges, Privacy};
use crate::session::{Session, SessionState};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::OffsetDateTime;

pub type ToolFuture<'a> = BoxFuture<'a, Result<Value, ToolError>>;
pub type MusicHandler = for<'a> fn(&'a MusicClient, &'a Credential, Value) -> ToolFuture<'a>;
pub type StatusHandler = for<'a> fn(&'a AppResources, &'a Session, Value) -> ToolFuture<'a>;

pub enum ToolHandler {
    /// Runs against the music API with the caller's credential.
    Music(MusicHandler),
    /// Answers from server state; needs no credential.
    Status(StatusHandler),
}

pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: fn() -> Value,
    pub handler: ToolHandler,
}

impl ToolDefinition {
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": (self.input_schema)(),
        })
    }
}

pub static TOOLS: [ToolDefinition; 10] = [
    ToolDefinition {
        name: "search_music",
        description: "Search the music catalog for songs, albums, artists or playlists.",
        input_schema: search_music_schema,
        handler: ToolHandler::Music(search_music),
    },
    ToolDefinition {
        name: "create_playlist",
        description: "Create a new playlist in the linked account.",
        input_schema: create_playlist_schema,
        handler: ToolHandler::Music(create_playlist),
    },
    ToolDefinition {
        name: "add_songs_to_playlist",
        description: "Add songs (by video id) to an existing playlist.",
        input_schema: add_songs_schema,
        handler: ToolHandler::Music(add_songs_to_playlist),
    },
    ToolDefinition {
        name: "get_playlists",
        description: "List the playlists owned by the linked account.",
        input_schema: get_playlists_schema,
        handler: ToolHandler::Music(get_playlists),
    },
    ToolDefinition {
        name: "get_playlist_details",
        description: "Get a playlist's metadata and tracks.",
        input_schema: get_playlist_details_schema,
        handler: ToolHandler::Music(get_playlist_details),
    },
    ToolDefinition {
        name: "remove_songs_from_playlist",
        description: "Remove songs from a playlist, by video id or playlist item id.",
        input_schema: remove_songs_schema,
        handler: ToolHandler::Music(remove_songs_from_playlist),
    },
    ToolDefinition {
        name: "delete_playlist",
        description: "Delete a playlist from the linked account.",
        input_schema: delete_playlist_schema,
        handler: ToolHandler::Music(delete_playlist),
    },
    ToolDefinition {
        name: "edit_playlist",
        description: "Change a playlist's title, description or privacy.",
        input_schema: edit_playlist_schema,
        handler: ToolHandler::Music(edit_playlist),
    },
    ToolDefinition {
        name: "get_auth_status",
        description: "Report whether this session has a usable music account and what it can do.",
        input_schema: empty_schema,
        handler: ToolHandler::Status(get_auth_status),
    },
    ToolDefinition {
        name: "get_server_status",
        description: "Report server version, uptime and live session counts.",
        input_schema: empty_schema,
        handler: ToolHandler::Status(get_server_status),
    },
];

pub fn find(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|tool| tool.name == name)
}

pub fn list() -> Value {
    json!({ "tools": TOOLS.iter().map(ToolDefinition::describe).collect::<Vec<_>>() })
}

/// Wraps a tool payload as MCP text content.
pub fn text_content(payload: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        result["isError"] = Value::Bool(true);
    }
    result
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

fn parse_privacy(value: &str) -> Result<Privacy, ToolError> {
    Privacy::parse(value).ok_or_else(|| {
        ToolError::InvalidParams(format!(
            "privacy must be PRIVATE, PUBLIC or UNLISTED, got {value}"
        ))
    })
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    filter: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

fn default_search_limit() -> u32 {
    20
}

fn search_music_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search query" },
            "filter": {
                "type": "string",
                "enum": ["songs", "videos", "albums", "artists", "playlists"],
                "description": "Restrict results to one kind of item"
            },
            "limit": { "type": "integer", "default": 20, "minimum": 1, "maximum": 50 }
        },
        "required": ["query"]
    })
}

fn search_music<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: SearchArgs = parse_args(args)?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidParams("query must not be empty".into()));
        }
        Ok(client
            .search(credential, &args.query, args.filter.as_deref(), args.limit)
            .await?)
    })
}

#[derive(Debug, Deserialize)]
struct CreatePlaylistArgs {
    #[serde(alias = "name")]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_privacy")]
    privacy: String,
}

fn default_privacy() -> String {
    "PRIVATE".to_string()
}

fn create_playlist_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string", "description": "Playlist title" },
            "description": { "type": "string", "default": "" },
            "privacy": {
                "type": "string",
                "enum": ["PRIVATE", "PUBLIC", "UNLISTED"],
                "default": "PRIVATE"
            }
        },
        "required": ["title"]
    })
}

fn create_playlist<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: CreatePlaylistArgs = parse_args(args)?;
        let privacy = parse_privacy(&args.privacy)?;
        let created = client
            .create_playlist(credential, &args.title, &args.description, privacy)
            .await?;
        Ok(json!({
            "playlist_id": created.get("id").cloned(),
            "playlist": created,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct AddSongsArgs {
    playlist_id: String,
    video_ids: Vec<String>,
}

fn add_songs_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "playlist_id": { "type": "string" },
            "video_ids": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
        },
        "required": ["playlist_id", "video_ids"]
    })
}

fn add_songs_to_playlist<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: AddSongsArgs = parse_args(args)?;
        if args.video_ids.is_empty() {
            return Err(ToolError::InvalidParams("video_ids must not be empty".into()));
        }
        let items = client
            .add_items(credential, &args.playlist_id, &args.video_ids)
            .await?;
        Ok(json!({
            "playlist_id": args.playlist_id,
            "added": items.len(),
            "items": items,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct GetPlaylistsArgs {
    #[serde(default = "default_playlists_limit")]
    limit: u32,
}

fn default_playlists_limit() -> u32 {
    25
}

fn get_playlists_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": { "type": "integer", "default": 25, "minimum": 1, "maximum": 50 }
        }
    })
}

fn get_playlists<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: GetPlaylistsArgs = parse_args(args)?;
        Ok(client.get_playlists(credential, args.limit).await?)
    })
}

#[derive(Debug, Deserialize)]
struct PlaylistDetailsArgs {
    playlist_id: String,
    limit: Option<u32>,
}

fn get_playlist_details_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "playlist_id": { "type": "string" },
            "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
        },
        "required": ["playlist_id"]
    })
}

fn get_playlist_details<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: PlaylistDetailsArgs = parse_args(args)?;
        Ok(client
            .get_playlist(credential, &args.playlist_id, args.limit)
            .await?)
    })
}

#[derive(Debug, Deserialize)]
struct RemoveSongsArgs {
    playlist_id: String,
    #[serde(default)]
    video_ids: Vec<String>,
    #[serde(default)]
    item_ids: Vec<String>,
}

fn remove_songs_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "playlist_id": { "type": "string" },
            "video_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Videos to remove; every occurrence is removed"
            },
            "item_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Playlist item ids, as returned by get_playlist_details"
            }
        },
        "required": ["playlist_id"]
    })
}

fn remove_songs_from_playlist<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: RemoveSongsArgs = parse_args(args)?;
        if args.video_ids.is_empty() && args.item_ids.is_empty() {
            return Err(ToolError::InvalidParams(
                "one of video_ids or item_ids must be non-empty".into(),
            ));
        }
        let outcome = client
            .remove_items(credential, &args.playlist_id, &args.video_ids, &args.item_ids)
            .await?;
        Ok(json!({
            "playlist_id": args.playlist_id,
            "removed": outcome.removed.len(),
            "removed_item_ids": outcome.removed,
            "not_found": outcome.not_found,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct PlaylistIdArgs {
    playlist_id: String,
}

fn delete_playlist_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "playlist_id": { "type": "string" } },
        "required": ["playlist_id"]
    })
}

fn delete_playlist<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: PlaylistIdArgs = parse_args(args)?;
        client.delete_playlist(credential, &args.playlist_id).await?;
        Ok(json!({ "playlist_id": args.playlist_id, "deleted": true }))
    })
}

#[derive(Debug, Deserialize)]
struct EditPlaylistArgs {
    playlist_id: String,
    #[serde(alias = "name")]
    title: Option<String>,
    description: Option<String>,
    privacy: Option<String>,
}

fn edit_playlist_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "playlist_id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "privacy": { "type": "string", "enum": ["PRIVATE", "PUBLIC", "UNLISTED"] }
        },
        "required": ["playlist_id"]
    })
}

fn edit_playlist<'a>(
    client: &'a MusicClient,
    credential: &'a Credential,
    args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let args: EditPlaylistArgs = parse_args(args)?;
        let changes = PlaylistChanges {
            title: args.title.as_deref(),
            description: args.description.as_deref(),
            privacy: args.privacy.as_deref().map(parse_privacy).transpose()?,
        };
        if changes.is_empty() {
            return Err(ToolError::InvalidParams(
                "nothing to change: pass title, description or privacy".into(),
            ));
        }
        let updated = client
            .update_playlist(credential, &args.playlist_id, changes)
            .await?;
        Ok(json!({ "playlist_id": args.playlist_id, "playlist": updated }))
    })
}

fn get_auth_status<'a>(
    resources: &'a AppResources,
    session: &'a Session,
    _args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let mode = resources.credentials.mode();
        if mode != "oauth_session" {
            return Ok(json!({
                "authenticated": true,
                "credential_mode": mode,
                "session_id": session.session_id,
                "capabilities": capabilities(true),
            }));
        }

        let current = resources
            .sessions
            .get_session(&session.session_id)
            .await
            .unwrap_or_else(|| session.clone());
        let authenticated = current.state == SessionState::Authenticated;
        let mut status = json!({
            "authenticated": authenticated,
            "credential_mode": mode,
            "session_id": current.session_id,
            "state": current.state,
            "capabilities": capabilities(authenticated),
        });
        match current.credential.as_ref().filter(|_| authenticated) {
            Some(credential) => {
                status["expires_in"] = json!(credential.expires_in());
                status["refreshable"] = json!(credential.refresh_token.is_some());
            }
            None => status["authorization_url"] = json!(current.authorization_url),
        }
        Ok(status)
    })
}

fn capabilities(authenticated: bool) -> Value {
    json!({
        "search": authenticated,
        "playlist_management": authenticated,
        "library_access": authenticated,
    })
}

fn get_server_status<'a>(
    resources: &'a AppResources,
    _session: &'a Session,
    _args: Value,
) -> ToolFuture<'a> {
    Box::pin(async move {
        let uptime = OffsetDateTime::now_utc() - resources.started_at;
        Ok(json!({
            "server": resources.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "status": "healthy",
            "credential_mode": resources.credentials.mode(),
            "uptime_secs": uptime.whole_seconds(),
            "sessions": resources.sessions.len(),
            "registered_clients": resources.oauth2.clients.len(),
            "pending_upstream_authorizations": resources.upstream.pending_len(),
        }))
    })
}
