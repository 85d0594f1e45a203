//! Outbound message payloads: plain text or rich attachments with labeled fields.
//!
//! Field names follow the Slack attachment wire format (title_link, thumb_url,
//! short) so the structs serialize directly into chat.postMessage bodies.

use serde::{Deserialize, Serialize};

/// A message to send to a conversation: free text, rich attachments, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(text: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            text: Some(text.into()),
            attachments: vec![attachment],
        }
    }
}

/// A rich attachment: title, link, thumbnail, body text, and labeled fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AttachmentAction>,
    /// Which parts render markdown (Slack convention: "text", "pretext", "fields").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
}

/// One labeled field in an attachment. `short` hints a two-column layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    pub fn short(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: true,
        }
    }

    pub fn long(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: false,
        }
    }
}

/// Interactive button element on an attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentAction {
    pub name: String,
    pub text: String,
    pub value: String,
    #[serde(rename = "type")]
    pub action_type: String,
}
