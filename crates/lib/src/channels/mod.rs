//! Chat channel layer: inbound events, outbound message payloads, and the Slack connector.

pub mod inbound;
pub mod message;
pub mod slack;

pub use inbound::{EventScope, InboundEvent};
pub use message::{Attachment, AttachmentAction, AttachmentField, OutboundMessage};
pub use slack::{BotIdentity, ChatChannel, SlackChannel};
