//! Notification message bodies.

use serde::{Deserialize, Serialize};

use crate::domain::StreamerId;
use crate::feed::LiveRecord;

/// Embed color for live notifications (Discord's "red").
pub const LIVE_COLOR: u32 = 0xe74c3c;

const FOOTER_TEXT: &str = "Twitch Monitor";

/// Body of a chat message: plain text, embeds, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// ISO-8601 timestamp shown in the embed footer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// The live notification for `record`.
///
/// Rendering is deterministic: the same record always yields the same
/// content, which is what lets unchanged streams skip the edit.
pub fn render_live(record: &LiveRecord) -> MessageContent {
    let url = record.id.channel_url();
    let viewers = record
        .viewer_count
        .map_or_else(|| "N/A".to_string(), |n| n.to_string());

    MessageContent::embed(Embed {
        title: Some(record.title.clone()),
        description: Some(format!(
            "Game: **{}**\nViewers: **{}**",
            record.category, viewers
        )),
        url: Some(url.clone()),
        color: Some(LIVE_COLOR),
        timestamp: record.started_at.map(|t| t.to_rfc3339()),
        author: Some(EmbedAuthor {
            name: format!("{} is live!", record.id),
            url: Some(url),
        }),
        footer: Some(EmbedFooter {
            text: FOOTER_TEXT.to_string(),
        }),
    })
}

/// The announcement sent after a stream goes offline.
pub fn render_ended(id: &StreamerId) -> MessageContent {
    MessageContent::text(format!("⚫ **{id}** ended the stream."))
}
