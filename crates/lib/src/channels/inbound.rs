//! Inbound text event from the chat platform: delivered to the dispatcher for
//! session and router handling.

/// Message context a rule can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// One-on-one message in a DM channel.
    DirectMessage,
    /// Message in a channel starting with a mention of the bot.
    DirectMention,
    /// Message in a channel mentioning the bot somewhere in the text.
    Mention,
    /// Channel message that does not mention the bot.
    Ambient,
}

/// A text event from the chat platform. Immutable once built.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender_id: String,
    pub channel_id: String,
    pub text: String,
    /// Platform timestamp of the message (Slack `ts`, e.g. "1704067200.000100").
    pub ts: String,
    pub scope: EventScope,
}

/// Classify a raw message into a scope and strip a leading bot mention.
///
/// DM channel ids start with `D`. A message beginning with `<@bot>` is a direct
/// mention and the mention itself is removed from the text so patterns match the
/// remainder; a mention elsewhere leaves the text untouched.
pub fn classify(
    bot_user_id: &str,
    channel_id: &str,
    text: &str,
) -> (EventScope, String) {
    let mention = format!("<@{}>", bot_user_id);
    if channel_id.starts_with('D') {
        return (EventScope::DirectMessage, text.to_string());
    }
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix(&mention) {
        let rest = rest.trim_start_matches([':', ' ']).to_string();
        return (EventScope::DirectMention, rest);
    }
    if text.contains(&mention) {
        return (EventScope::Mention, text.to_string());
    }
    (EventScope::Ambient, text.to_string())
}
