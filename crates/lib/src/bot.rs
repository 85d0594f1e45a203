//! Bot behavior: the hear rules, the nickname and shutdown dialogs, and the
//! identity/uptime reply.

use crate::channels::{BotIdentity, ChatChannel, EventScope, InboundEvent};
use crate::config::BotConfig;
use crate::movies;
use crate::router::{DispatchOutcome, Router, RuleMatch};
use crate::session::{SessionManager, SessionStatus, Step, StepAction};
use crate::storage::{UserRecord, UserStore};
use crate::tmdb::{ImageConfiguration, TmdbClient};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Yes/no utterances recognized by confirmation steps.
const UTTERANCE_YES: &str = r"(?i)^(yes|yea|yup|yep|ya|sure|ok|y|yeah|yah)\b";
const UTTERANCE_NO: &str = r"(?i)^(no|nah|nope|n)\b";

const ADDRESSED: &[EventScope] = &[
    EventScope::DirectMessage,
    EventScope::DirectMention,
    EventScope::Mention,
];

/// Everything the handlers need: outbound channel, user store, TMDB, sessions,
/// and the identity/config fetched during startup. Built once, shared immutably.
pub struct BotContext {
    pub chat: Arc<dyn ChatChannel>,
    pub users: Arc<dyn UserStore>,
    pub tmdb: TmdbClient,
    pub images: ImageConfiguration,
    pub identity: BotIdentity,
    pub sessions: Arc<SessionManager>,
    pub started_at: Instant,
    /// Signals the server to shut down. Fired after the confirmed-shutdown delay.
    pub shutdown_tx: mpsc::Sender<()>,
    pub shutdown_delay: Duration,
}

impl BotContext {
    /// Build a session manager from bot config.
    pub fn session_manager(chat: Arc<dyn ChatChannel>, bot: &BotConfig) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            chat,
            Duration::from_secs(bot.session_timeout_secs),
            bot.session_max_repeats,
        ))
    }

    async fn say(&self, channel_id: &str, text: &str) -> Result<()> {
        self.chat
            .send_text(channel_id, text)
            .await
            .map_err(anyhow::Error::msg)
    }
}

/// Route one inbound event: an active conversation for the sender consumes it
/// first, otherwise the hear rules run. Returns the router outcome (NoMatch when
/// a session consumed the event).
pub async fn handle_event(
    ctx: &Arc<BotContext>,
    router: &Router,
    event: &InboundEvent,
) -> DispatchOutcome {
    if ctx
        .sessions
        .on_reply(&event.sender_id, &event.channel_id, &event.text)
        .await
    {
        return DispatchOutcome::NoMatch;
    }
    router.dispatch(event).await
}

/// Register all hear rules in their fixed order. First match wins.
pub fn register_rules(router: &mut Router, ctx: Arc<BotContext>) {
    greeting_rule(router, ctx.clone());
    call_me_rule(router, ctx.clone());
    my_name_rule(router, ctx.clone());
    shutdown_rule(router, ctx.clone());
    identity_rule(router, ctx.clone());
    movie_rule(router, ctx);
}

fn greeting_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(&[r"\bhello\b", r"\bhi\b"], ADDRESSED, move |m: RuleMatch| {
        let ctx = ctx.clone();
        async move {
            if let Err(e) = ctx
                .chat
                .add_reaction(&m.event.channel_id, &m.event.ts, "robot_face")
                .await
            {
                log::debug!("adding reaction failed: {}", e);
            }
            let name = ctx.users.get(&m.event.sender_id).await.and_then(|u| u.name);
            let text = match name {
                Some(n) => format!("Hello {}.", n),
                None => "Hello.".to_string(),
            };
            ctx.say(&m.event.channel_id, &text).await
        }
    });
}

fn call_me_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(
        &["call me (.*)", "my name is (.*)"],
        ADDRESSED,
        move |m: RuleMatch| {
            let ctx = ctx.clone();
            async move {
                let name = m
                    .group(1)
                    .ok_or_else(|| anyhow::anyhow!("empty name capture"))?
                    .to_string();
                ctx.users
                    .save(UserRecord {
                        id: m.event.sender_id.clone(),
                        name: Some(name.clone()),
                    })
                    .await
                    .map_err(anyhow::Error::msg)?;
                ctx.say(
                    &m.event.channel_id,
                    &format!("Got it. I will call you {} from now on.", name),
                )
                .await
            }
        },
    );
}

fn nickname_steps() -> Vec<Step> {
    vec![
        Step::ask("What should I call you?")
            .capture("nickname")
            .otherwise(StepAction::Advance),
        Step::ask("You want me to call you `{nickname}`?")
            .on(UTTERANCE_YES, StepAction::Complete)
            .on(UTTERANCE_NO, StepAction::Stop)
            .otherwise(StepAction::Repeat),
    ]
}

fn my_name_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(
        &["what is my name", "who am i"],
        ADDRESSED,
        move |m: RuleMatch| {
            let ctx = ctx.clone();
            async move {
                if let Some(name) = ctx.users.get(&m.event.sender_id).await.and_then(|u| u.name) {
                    return ctx
                        .say(&m.event.channel_id, &format!("Your name is {}.", name))
                        .await;
                }
                ctx.say(&m.event.channel_id, "I do not know your name yet!")
                    .await?;
                let end_rx = match ctx
                    .sessions
                    .start(&m.event.sender_id, &m.event.channel_id, nickname_steps())
                    .await
                {
                    Ok(rx) => rx,
                    Err(e) => {
                        log::debug!("nickname dialog not started: {}", e);
                        return ctx
                            .say(&m.event.channel_id, "Let's finish what we were doing first.")
                            .await;
                    }
                };
                let ctx = ctx.clone();
                let sender = m.event.sender_id.clone();
                let channel = m.event.channel_id.clone();
                tokio::spawn(async move {
                    let Ok(end) = end_rx.await else { return };
                    let nickname = end.answers.get("nickname").cloned();
                    let reply = match (end.status, nickname) {
                        (SessionStatus::Completed, Some(nick)) => {
                            if let Err(e) = ctx
                                .users
                                .save(UserRecord {
                                    id: sender,
                                    name: Some(nick.clone()),
                                })
                                .await
                            {
                                log::warn!("saving nickname failed: {}", e);
                            }
                            format!("Got it. I will call you {} from now on.", nick)
                        }
                        _ => "OK, nevermind!".to_string(),
                    };
                    if let Err(e) = ctx.say(&channel, &reply).await {
                        log::warn!("nickname dialog close reply failed: {:#}", e);
                    }
                });
                Ok(())
            }
        },
    );
}

fn shutdown_steps() -> Vec<Step> {
    vec![Step::ask("Are you sure you want me to shutdown?")
        .on_say(UTTERANCE_YES, "Bye!", StepAction::Complete)
        .on_say(UTTERANCE_NO, "*Phew!*", StepAction::Stop)
        .otherwise_say("*Phew!*", StepAction::Stop)]
}

fn shutdown_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(&["shutdown"], ADDRESSED, move |m: RuleMatch| {
        let ctx = ctx.clone();
        async move {
            let end_rx = match ctx
                .sessions
                .start(&m.event.sender_id, &m.event.channel_id, shutdown_steps())
                .await
            {
                Ok(rx) => rx,
                Err(e) => {
                    log::debug!("shutdown dialog not started: {}", e);
                    return Ok(());
                }
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let Ok(end) = end_rx.await else { return };
                if end.status != SessionStatus::Completed {
                    return;
                }
                // Once scheduled there is no way to cancel it; matches the
                // original delayed process.exit.
                tokio::time::sleep(ctx.shutdown_delay).await;
                let _ = ctx.shutdown_tx.send(()).await;
            });
            Ok(())
        }
    });
}

fn identity_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(
        &["uptime", "identify yourself", "who are you", "what is your name"],
        ADDRESSED,
        move |m: RuleMatch| {
            let ctx = ctx.clone();
            async move {
                let uptime = format_uptime(ctx.started_at.elapsed().as_secs() as f64);
                let hostname =
                    whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
                let text = format!(
                    ":robot_face: I am a bot named <{}>. I have been running for {} on {}.",
                    ctx.identity.name, uptime, hostname
                );
                ctx.say(&m.event.channel_id, &text).await
            }
        },
    );
}

fn movie_rule(router: &mut Router, ctx: Arc<BotContext>) {
    router.hear(&["movie (.*)"], ADDRESSED, move |m: RuleMatch| {
        let ctx = ctx.clone();
        async move {
            let query = m
                .group(1)
                .ok_or_else(|| anyhow::anyhow!("empty movie query"))?
                .to_string();
            match movies::lookup_any(&ctx.tmdb, &ctx.images, &query).await {
                Ok(Some(reply)) => ctx
                    .chat
                    .send_message(&m.event.channel_id, &reply)
                    .await
                    .map_err(anyhow::Error::msg),
                Ok(None) => ctx
                    .chat
                    .send_message(&m.event.channel_id, &movies::no_results_reply(&query))
                    .await
                    .map_err(anyhow::Error::msg),
                // Remote failure: no reply is sent, the error is only logged.
                Err(e) => Err(e.into()),
            }
        }
    });
}

/// Human uptime: seconds below a minute, then minutes, then hours, with a
/// singular unit at exactly one.
pub fn format_uptime(seconds: f64) -> String {
    let mut value = seconds;
    let mut unit = "second";
    if value > 60.0 {
        value /= 60.0;
        unit = "minute";
    }
    if value > 60.0 {
        value /= 60.0;
        unit = "hour";
    }
    let rounded = (value * 10.0).round() / 10.0;
    let number = if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    };
    if (rounded - 1.0).abs() < f64::EPSILON {
        format!("{} {}", number, unit)
    } else {
        format!("{} {}s", number, unit)
    }
}
