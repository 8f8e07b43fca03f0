//! Read access to the source workspace.
//!
//! [`RestSourcePlatform`] speaks the platform's REST interface through the
//! rate-limited fetch layer; the trait keeps the resolver and backfill paths
//! testable against in-memory fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::fetch::{FetchError, RateLimitedFetcher};
use crate::models::EntityKind;
use crate::platform::types::{SourceChannel, SourceMessage};

/// Typed read interface over the source platform.
///
/// Errors keep their HTTP classification: callers branch on 403 (permission
/// denial) versus everything else (not-found / auto-creation path).
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Fetch channel metadata; doubles as the access-permission probe
    async fn fetch_channel(&self, channel_id: &str) -> Result<SourceChannel, FetchError>;

    /// List every channel-family entity of a source workspace
    async fn list_workspace_channels(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<SourceChannel>, FetchError>;

    /// Most recent messages of a channel, newest first as served by the
    /// platform
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, FetchError>;
}

/// REST-backed source platform reader
#[derive(Debug, Clone)]
pub struct RestSourcePlatform {
    fetcher: RateLimitedFetcher,
    base_url: String,
    credential: String,
    max_retries: u32,
}

impl RestSourcePlatform {
    pub fn new(
        fetcher: RateLimitedFetcher,
        base_url: impl Into<String>,
        credential: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential: credential.into(),
            max_retries,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl SourcePlatform for RestSourcePlatform {
    async fn fetch_channel(&self, channel_id: &str) -> Result<SourceChannel, FetchError> {
        let body = self
            .fetcher
            .fetch_json(
                channel_id,
                &self.url(&format!("/channels/{channel_id}")),
                &self.credential,
                self.max_retries,
            )
            .await?;
        parse_channel(&body)
            .ok_or_else(|| FetchError::Decode(format!("malformed channel body for {channel_id}")))
    }

    async fn list_workspace_channels(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<SourceChannel>, FetchError> {
        let body = self
            .fetcher
            .fetch_json(
                workspace_id,
                &self.url(&format!("/guilds/{workspace_id}/channels")),
                &self.credential,
                self.max_retries,
            )
            .await?;
        let items = body
            .as_array()
            .ok_or_else(|| FetchError::Decode("channel list is not an array".to_string()))?;
        Ok(items.iter().filter_map(parse_channel).collect())
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, FetchError> {
        let body = self
            .fetcher
            .fetch_json(
                channel_id,
                &self.url(&format!("/channels/{channel_id}/messages?limit={limit}")),
                &self.credential,
                self.max_retries,
            )
            .await?;
        let items = body
            .as_array()
            .ok_or_else(|| FetchError::Decode("message list is not an array".to_string()))?;
        Ok(items
            .iter()
            .filter_map(|item| parse_message(item, channel_id))
            .collect())
    }
}

fn parse_channel(body: &serde_json::Value) -> Option<SourceChannel> {
    let kind_code = u8::try_from(body.get("type")?.as_u64()?).ok()?;
    Some(SourceChannel {
        id: body.get("id")?.as_str()?.to_string(),
        workspace_id: body
            .get("guild_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        name: body
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        kind: EntityKind::from_code(kind_code)?,
        parent_id: body
            .get("parent_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

fn parse_message(body: &serde_json::Value, channel_id: &str) -> Option<SourceMessage> {
    let timestamp = body
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));
    Some(SourceMessage {
        id: body.get("id")?.as_str()?.to_string(),
        channel_id: channel_id.to_string(),
        timestamp,
        raw: body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_channel_reads_platform_shape() {
        let body = json!({
            "id": "123",
            "guild_id": "g1",
            "name": "general",
            "type": 0,
            "parent_id": "cat9"
        });
        let channel = parse_channel(&body).unwrap();
        assert_eq!(channel.id, "123");
        assert_eq!(channel.workspace_id, "g1");
        assert_eq!(channel.kind, EntityKind::Text);
        assert_eq!(channel.parent_id.as_deref(), Some("cat9"));
    }

    #[test]
    fn test_parse_channel_rejects_unknown_kind() {
        let body = json!({"id": "1", "name": "x", "type": 14});
        assert!(parse_channel(&body).is_none());
    }

    #[test]
    fn test_parse_message_keeps_raw_body() {
        let body = json!({
            "id": "m1",
            "timestamp": "2024-05-01T12:00:00+00:00",
            "content": "hello"
        });
        let message = parse_message(&body, "c1").unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.channel_id, "c1");
        assert_eq!(message.raw.get("content").unwrap(), "hello");
    }
}
