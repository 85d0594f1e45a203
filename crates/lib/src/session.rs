//! Conversation sessions: a linear state machine that asks a question, waits for
//! the owner's next reply, and matches it against expected patterns.
//!
//! At most one active session exists per owner. Every session ends in exactly one
//! terminal status (completed, stopped, or timedOut) and fires its end
//! notification once with the captured answers.

use crate::channels::ChatChannel;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};

/// Session lifecycle status. `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Ran through its steps (or a branch ended it explicitly).
    Completed,
    /// A branch stopped it (e.g. the user declined).
    Stopped,
    /// The wait window expired or the repeat cap was hit.
    TimedOut,
}

/// What happens after a reply branch matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Move to the next step (completing when there is none).
    Advance,
    /// Re-send the current prompt without advancing. Counts against the repeat cap.
    Repeat,
    /// End the session with `Completed`.
    Complete,
    /// End the session with `Stopped`.
    Stop,
}

/// One expected reply: an optional pattern (None = default branch), an optional
/// message sent when taken, and the action to apply.
pub struct ReplyBranch {
    pattern: Option<Regex>,
    say: Option<String>,
    action: StepAction,
}

/// One step of a conversation: a prompt, the branches its reply is matched
/// against, and an optional key the reply text is captured under.
///
/// Prompts and branch messages may reference earlier answers as `{key}`.
pub struct Step {
    prompt: String,
    branches: Vec<ReplyBranch>,
    capture_key: Option<String>,
}

impl Step {
    pub fn ask(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            branches: Vec::new(),
            capture_key: None,
        }
    }

    /// Capture the accepted reply text under this key.
    pub fn capture(mut self, key: impl Into<String>) -> Self {
        self.capture_key = Some(key.into());
        self
    }

    pub fn on(self, pattern: &str, action: StepAction) -> Self {
        self.branch(Some(pattern), None, action)
    }

    pub fn on_say(self, pattern: &str, say: impl Into<String>, action: StepAction) -> Self {
        self.branch(Some(pattern), Some(say.into()), action)
    }

    /// Default branch, taken when no pattern matches.
    pub fn otherwise(self, action: StepAction) -> Self {
        self.branch(None, None, action)
    }

    pub fn otherwise_say(self, say: impl Into<String>, action: StepAction) -> Self {
        self.branch(None, Some(say.into()), action)
    }

    fn branch(mut self, pattern: Option<&str>, say: Option<String>, action: StepAction) -> Self {
        let pattern = pattern.map(|p| {
            Regex::new(p).unwrap_or_else(|e| panic!("invalid reply pattern {p:?}: {e}"))
        });
        self.branches.push(ReplyBranch {
            pattern,
            say,
            action,
        });
        self
    }
}

/// Final notification fired once per session.
#[derive(Debug)]
pub struct SessionEnd {
    pub status: SessionStatus,
    pub answers: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("user {0} already has an active conversation")]
    AlreadyActive(String),
    #[error("a conversation needs at least one step")]
    NoSteps,
}

struct ConversationSession {
    channel_id: String,
    steps: Vec<Step>,
    current_step: usize,
    answers: HashMap<String, String>,
    repeats: u32,
    deadline: Instant,
    end_tx: oneshot::Sender<SessionEnd>,
}

/// Replace `{key}` placeholders with captured answers. Unknown keys are left as-is.
fn interpolate(template: &str, answers: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in answers {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Owns all active sessions and drives them from inbound replies.
pub struct SessionManager {
    chat: Arc<dyn ChatChannel>,
    timeout: Duration,
    max_repeats: u32,
    sessions: Mutex<HashMap<String, ConversationSession>>,
}

impl SessionManager {
    pub fn new(chat: Arc<dyn ChatChannel>, timeout: Duration, max_repeats: u32) -> Self {
        Self {
            chat,
            timeout,
            max_repeats,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a conversation with `owner_id` in `channel_id`: sends the first
    /// prompt and returns a receiver for the end notification. Fails when the
    /// owner already has an active session.
    pub async fn start(
        &self,
        owner_id: &str,
        channel_id: &str,
        steps: Vec<Step>,
    ) -> Result<oneshot::Receiver<SessionEnd>, SessionError> {
        if steps.is_empty() {
            return Err(SessionError::NoSteps);
        }
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(owner_id) {
            return Err(SessionError::AlreadyActive(owner_id.to_string()));
        }
        let (end_tx, end_rx) = oneshot::channel();
        let session = ConversationSession {
            channel_id: channel_id.to_string(),
            steps,
            current_step: 0,
            answers: HashMap::new(),
            repeats: 0,
            deadline: Instant::now() + self.timeout,
            end_tx,
        };
        self.say(channel_id, &session.steps[0].prompt, &session.answers)
            .await;
        sessions.insert(owner_id.to_string(), session);
        Ok(end_rx)
    }

    /// True when `owner_id` has an active session.
    pub async fn has_active(&self, owner_id: &str) -> bool {
        self.sessions.lock().await.contains_key(owner_id)
    }

    /// Feed one inbound reply. Returns true when a session consumed the event.
    /// Only the session owner's messages in the session's channel count.
    pub async fn on_reply(&self, sender_id: &str, channel_id: &str, text: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(mut session) = sessions.remove(sender_id) else {
            return false;
        };
        if session.channel_id != channel_id {
            sessions.insert(sender_id.to_string(), session);
            return false;
        }

        let step = &session.steps[session.current_step];
        let matched = step
            .branches
            .iter()
            .find(|b| b.pattern.as_ref().is_some_and(|p| p.is_match(text)))
            .or_else(|| step.branches.iter().find(|b| b.pattern.is_none()));

        let Some(branch) = matched else {
            // No pattern and no default: re-send the prompt, no state advance.
            session.repeats += 1;
            if session.repeats > self.max_repeats {
                self.end(session, SessionStatus::TimedOut);
                return true;
            }
            self.say(channel_id, &step.prompt, &session.answers).await;
            sessions.insert(sender_id.to_string(), session);
            return true;
        };

        let action = branch.action;
        if action != StepAction::Repeat {
            if let Some(key) = &step.capture_key {
                session.answers.insert(key.clone(), text.to_string());
            }
        }
        if let Some(say) = &branch.say {
            self.say(channel_id, say, &session.answers).await;
        }

        match action {
            StepAction::Advance => {
                session.current_step += 1;
                session.repeats = 0;
                if session.current_step >= session.steps.len() {
                    self.end(session, SessionStatus::Completed);
                    return true;
                }
                session.deadline = Instant::now() + self.timeout;
                let prompt = &session.steps[session.current_step].prompt;
                self.say(channel_id, prompt, &session.answers).await;
                sessions.insert(sender_id.to_string(), session);
            }
            StepAction::Repeat => {
                session.repeats += 1;
                if session.repeats > self.max_repeats {
                    self.end(session, SessionStatus::TimedOut);
                    return true;
                }
                let prompt = &session.steps[session.current_step].prompt;
                self.say(channel_id, prompt, &session.answers).await;
                sessions.insert(sender_id.to_string(), session);
            }
            StepAction::Complete => self.end(session, SessionStatus::Completed),
            StepAction::Stop => self.end(session, SessionStatus::Stopped),
        }
        true
    }

    /// End every session whose wait window has expired. Run periodically.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(owner, _)| owner.clone())
            .collect();
        for owner in expired {
            if let Some(session) = sessions.remove(&owner) {
                log::debug!("conversation with {} timed out", owner);
                self.end(session, SessionStatus::TimedOut);
            }
        }
    }

    fn end(&self, session: ConversationSession, status: SessionStatus) {
        let _ = session.end_tx.send(SessionEnd {
            status,
            answers: session.answers,
        });
    }

    async fn say(&self, channel_id: &str, template: &str, answers: &HashMap<String, String>) {
        let text = interpolate(template, answers);
        if let Err(e) = self.chat.send_text(channel_id, &text).await {
            log::warn!("conversation send failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::OutboundMessage;
    use async_trait::async_trait;

    /// Test double that records every sent text.
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        async fn texts(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatChannel for RecordingChannel {
        async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), String> {
            self.sent
                .lock()
                .await
                .push((channel_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_message(
            &self,
            channel_id: &str,
            message: &OutboundMessage,
        ) -> Result<(), String> {
            let text = message.text.clone().unwrap_or_default();
            self.send_text(channel_id, &text).await
        }
    }

    fn manager(chat: Arc<RecordingChannel>) -> SessionManager {
        SessionManager::new(chat, Duration::from_secs(60), 3)
    }

    fn confirm_steps() -> Vec<Step> {
        vec![Step::ask("Are you sure?")
            .capture("confirm")
            .on_say("^yes", "Bye!", StepAction::Complete)
            .on_say("^no", "*Phew!*", StepAction::Stop)
            .otherwise(StepAction::Repeat)]
    }

    #[tokio::test]
    async fn confirm_reply_completes() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "yes").await);
        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::Completed);
        assert_eq!(end.answers.get("confirm").map(String::as_str), Some("yes"));
        assert_eq!(chat.texts().await, vec!["Are you sure?", "Bye!"]);
        assert!(!mgr.has_active("U1").await);
    }

    #[tokio::test]
    async fn deny_reply_stops() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "no").await);
        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn no_default_resends_prompt_without_advancing() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let steps = vec![
            Step::ask("Pick yes or no.")
                .capture("answer")
                .on("^yes", StepAction::Advance),
            Step::ask("Second step."),
        ];
        let _rx = mgr.start("U1", "D1", steps).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "maybe").await);
        // Prompt re-sent, still on step 0, nothing captured.
        assert_eq!(chat.texts().await, vec!["Pick yes or no.", "Pick yes or no."]);
        assert!(mgr.has_active("U1").await);

        assert!(mgr.on_reply("U1", "D1", "yes").await);
        assert_eq!(
            chat.texts().await,
            vec!["Pick yes or no.", "Pick yes or no.", "Second step."]
        );
    }

    #[tokio::test]
    async fn captures_persist_across_steps_and_interpolate() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let steps = vec![
            Step::ask("What should I call you?")
                .capture("nickname")
                .otherwise(StepAction::Advance),
            Step::ask("You want me to call you `{nickname}`?")
                .on("^yes", StepAction::Complete)
                .on("^no", StepAction::Stop)
                .otherwise(StepAction::Repeat),
        ];
        let rx = mgr.start("U1", "D1", steps).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "Roy Batty").await);
        assert!(mgr.on_reply("U1", "D1", "yes").await);

        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::Completed);
        assert_eq!(
            end.answers.get("nickname").map(String::as_str),
            Some("Roy Batty")
        );
        assert_eq!(
            chat.texts().await,
            vec![
                "What should I call you?",
                "You want me to call you `Roy Batty`?"
            ]
        );
    }

    #[tokio::test]
    async fn advancing_past_last_step_completes() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let steps = vec![Step::ask("Say anything.")
            .capture("said")
            .otherwise(StepAction::Advance)];
        let rx = mgr.start("U1", "D1", steps).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "something").await);
        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::Completed);
        assert_eq!(end.answers.get("said").map(String::as_str), Some("something"));
    }

    #[tokio::test]
    async fn second_session_for_same_owner_is_rejected() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let _rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();
        let err = mgr.start("U1", "D1", confirm_steps()).await.err().unwrap();
        assert!(matches!(err, SessionError::AlreadyActive(_)));
    }

    #[tokio::test]
    async fn other_users_and_channels_do_not_consume() {
        let chat = RecordingChannel::new();
        let mgr = manager(chat.clone());
        let _rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();

        assert!(!mgr.on_reply("U2", "D1", "yes").await);
        assert!(!mgr.on_reply("U1", "D9", "yes").await);
        assert!(mgr.has_active("U1").await);
    }

    #[tokio::test]
    async fn repeat_cap_ends_timed_out() {
        let chat = RecordingChannel::new();
        let mgr = SessionManager::new(chat.clone(), Duration::from_secs(60), 2);
        let rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();

        assert!(mgr.on_reply("U1", "D1", "maybe").await);
        assert!(mgr.on_reply("U1", "D1", "dunno").await);
        assert!(mgr.on_reply("U1", "D1", "hmm").await);

        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::TimedOut);
        assert!(!mgr.has_active("U1").await);
    }

    #[tokio::test]
    async fn sweep_times_out_idle_sessions() {
        let chat = RecordingChannel::new();
        let mgr = SessionManager::new(chat.clone(), Duration::from_millis(0), 3);
        let rx = mgr.start("U1", "D1", confirm_steps()).await.unwrap();

        mgr.sweep().await;
        let end = rx.await.unwrap();
        assert_eq!(end.status, SessionStatus::TimedOut);
        assert!(!mgr.has_active("U1").await);
    }
}
