//! Webhook server and event loop: Slack Events API inbound, slash commands,
//! health probe, dispatcher task, and graceful shutdown.

use crate::bot::{self, BotContext};
use crate::channels::{inbound, ChatChannel, InboundEvent, SlackChannel};
use crate::config::{self, Config};
use crate::movies;
use crate::router::{DispatchOutcome, Router};
use crate::storage::FileUserStore;
use crate::tmdb::TmdbClient;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state for the webhook server.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub ctx: Arc<BotContext>,
    pub router: Arc<Router>,
    /// Sender for inbound events from the Events API webhook. Dispatcher task receives.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    /// Used for response_url replies to slash commands.
    pub slack: Arc<SlackChannel>,
    pub movie_token: Option<String>,
    pub actor_token: Option<String>,
}

/// Slack Events API envelope (url_verification or event_callback).
#[derive(Debug, Deserialize)]
struct EventsPayload {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<MessageEvent>,
}

#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Slash command form payload (subset used).
#[derive(Debug, Deserialize)]
pub struct SlashPayload {
    #[serde(default)]
    pub token: String,
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
}

/// Build the axum router for the given state.
pub fn app(state: ServerState) -> axum::Router {
    axum::Router::new()
        .route("/", get(health_http))
        .route("/slack/events", post(slack_events))
        .route("/slack/commands", post(slack_commands))
        .with_state(state)
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "bot": state.ctx.identity.name,
        "port": state.config.server.port,
    }))
}

/// POST /slack/events — Events API: echo url_verification challenges, convert
/// message events to inbound events for the dispatcher. The bot's own messages
/// and message subtypes (edits, joins) are ignored.
async fn slack_events(
    State(state): State<ServerState>,
    Json(payload): Json<EventsPayload>,
) -> Response {
    match payload.typ.as_str() {
        "url_verification" => {
            let challenge = payload.challenge.unwrap_or_default();
            Json(json!({ "challenge": challenge })).into_response()
        }
        "event_callback" => {
            let Some(event) = payload.event else {
                return StatusCode::OK.into_response();
            };
            if event.typ != "message" || event.subtype.is_some() || event.bot_id.is_some() {
                return StatusCode::OK.into_response();
            }
            let (Some(user), Some(channel), Some(text)) =
                (event.user, event.channel, event.text)
            else {
                return StatusCode::OK.into_response();
            };
            if user == state.ctx.identity.user_id {
                return StatusCode::OK.into_response();
            }
            let (scope, text) = inbound::classify(&state.ctx.identity.user_id, &channel, &text);
            let inbound = InboundEvent {
                sender_id: user,
                channel_id: channel,
                text,
                ts: event.ts.unwrap_or_default(),
                scope,
            };
            if state.inbound_tx.send(inbound).await.is_err() {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            StatusCode::OK.into_response()
        }
        _ => StatusCode::OK.into_response(),
    }
}

/// POST /slack/commands — slash commands. Known commands ack immediately and
/// reply through response_url; a configured verification token that does not
/// match drops the payload without a reply. Unknown commands get an ephemeral
/// refusal.
async fn slack_commands(
    State(state): State<ServerState>,
    Form(payload): Form<SlashPayload>,
) -> Response {
    match payload.command.as_str() {
        "/movie" => run_lookup_command(state, payload, CommandKind::Movie),
        "/actor" => run_lookup_command(state, payload, CommandKind::Actor),
        _ => Json(json!({
            "response_type": "ephemeral",
            "text": "Your command is not allowed",
        }))
        .into_response(),
    }
}

#[derive(Clone, Copy)]
enum CommandKind {
    Movie,
    Actor,
}

fn run_lookup_command(state: ServerState, payload: SlashPayload, kind: CommandKind) -> Response {
    let expected = match kind {
        CommandKind::Movie => state.movie_token.as_deref(),
        CommandKind::Actor => state.actor_token.as_deref(),
    };
    if let Some(expected) = expected {
        if payload.token != expected {
            log::debug!("{} command token mismatch, ignoring", payload.command);
            return StatusCode::OK.into_response();
        }
    }
    let visibility = state.config.slack.response_visibility;
    tokio::spawn(async move {
        let query = payload.text.clone();
        let result = match kind {
            CommandKind::Movie => {
                movies::lookup_movie(&state.ctx.tmdb, &state.ctx.images, &query).await
            }
            CommandKind::Actor => {
                movies::lookup_person(&state.ctx.tmdb, &state.ctx.images, &query).await
            }
        };
        let reply = match result {
            Ok(Some(msg)) => msg,
            Ok(None) => movies::no_results_reply(&query),
            Err(e) => {
                // Lookup failed: no reply at all, same as the pattern rules.
                log::warn!("{} lookup failed: {}", payload.command, e);
                return;
            }
        };
        if let Err(e) = state
            .slack
            .respond(&payload.response_url, &reply, visibility)
            .await
        {
            log::warn!("{} response_url reply failed: {}", payload.command, e);
        }
    });
    StatusCode::OK.into_response()
}

/// Run the bot server; binds to config.server.bind:config.server.port.
///
/// Startup is an explicit init phase the process awaits before accepting
/// events: credentials are resolved (fatal when missing), the bot identity is
/// fetched from Slack, and the TMDB image configuration is fetched once and
/// held immutably. Blocks until shutdown (signal or a confirmed shutdown
/// dialog).
pub async fn run_server(config: Config, config_path: PathBuf) -> Result<()> {
    let (slack_token, tmdb_key) = config::require_credentials(&config)?;

    let slack = Arc::new(SlackChannel::new(slack_token));
    let identity = slack
        .auth_test()
        .await
        .map_err(|e| anyhow::anyhow!("slack auth.test failed: {}", e))?;
    log::info!("connected to slack as {} ({})", identity.name, identity.user_id);

    let tmdb = TmdbClient::new(tmdb_key, None);
    let images = tmdb
        .configuration()
        .await
        .context("fetching tmdb configuration")?
        .images;

    let users = Arc::new(
        FileUserStore::load(config::default_user_store_path(&config_path)).await,
    );
    let chat: Arc<dyn ChatChannel> = slack.clone();
    let sessions = BotContext::session_manager(chat.clone(), &config.bot);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let ctx = Arc::new(BotContext {
        chat,
        users,
        tmdb,
        images,
        identity,
        sessions,
        started_at: Instant::now(),
        shutdown_tx,
        shutdown_delay: Duration::from_secs(config.bot.shutdown_delay_secs),
    });

    let mut router = Router::new();
    bot::register_rules(&mut router, ctx.clone());
    let router = Arc::new(router);

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundEvent>(64);
    {
        let ctx = ctx.clone();
        let router = router.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                if bot::handle_event(&ctx, &router, &event).await == DispatchOutcome::NoMatch {
                    log::trace!("event from {} not handled", event.sender_id);
                }
            }
        });
    }
    {
        let sessions = ctx.sessions.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                sessions.sweep().await;
            }
        });
    }

    let state = ServerState {
        config: Arc::new(config.clone()),
        ctx,
        router,
        inbound_tx,
        slack,
        movie_token: config::resolve_movie_command_token(&config),
        actor_token: config::resolve_actor_command_token(&config),
    };
    let app = app(state);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("reelbot listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await
        .context("server exited")?;
    log::info!("reelbot stopped");
    Ok(())
}

/// Future that completes when the process should shut down: SIGINT, SIGTERM,
/// or a confirmed shutdown dialog.
async fn shutdown_signal(mut shutdown_rx: mpsc::Receiver<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("shutdown signal received, draining connections");
        },
        _ = terminate => {
            log::info!("shutdown signal received, draining connections");
        },
        _ = shutdown_rx.recv() => {
            log::info!("shutdown confirmed via conversation, draining connections");
        },
    }
}
