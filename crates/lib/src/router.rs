//! Pattern router: ordered regex rules dispatching inbound events to handlers.
//!
//! Rules are evaluated in registration order; the first rule whose scope filter
//! and any pattern match wins, and its handler runs exactly once. No match is an
//! explicit `NoMatch` outcome, not a silent fallthrough.

use crate::channels::{EventScope, InboundEvent};
use regex::Regex;
use std::future::Future;
use std::pin::Pin;

/// Boxed async handler invoked with the matched event and its capture groups.
pub type Handler =
    Box<dyn Fn(RuleMatch) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Event plus positional capture groups from the winning pattern.
/// `captures[0]` is the whole match; group N is at index N.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub event: InboundEvent,
    pub captures: Vec<Option<String>>,
}

impl RuleMatch {
    /// Capture group N as a trimmed &str, or None when absent/empty.
    pub fn group(&self, n: usize) -> Option<&str> {
        self.captures
            .get(n)
            .and_then(|g| g.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

struct HearRule {
    patterns: Vec<Regex>,
    scopes: Vec<EventScope>,
    handler: Handler,
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The rule at this registration index handled the event.
    Handled(usize),
    /// No rule matched; the event is dropped.
    NoMatch,
}

/// Ordered list of hear rules.
#[derive(Default)]
pub struct Router {
    rules: Vec<HearRule>,
}

impl Router {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule. Patterns are unanchored, case-sensitive regexes tried in
    /// the given order; invalid patterns are a programming error and panic at
    /// registration (rules are built once at startup).
    pub fn hear<F, Fut>(&mut self, patterns: &[&str], scopes: &[EventScope], handler: F)
    where
        F: Fn(RuleMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid hear pattern {p:?}: {e}")))
            .collect();
        self.rules.push(HearRule {
            patterns,
            scopes: scopes.to_vec(),
            handler: Box::new(move |m| Box::pin(handler(m))),
        });
    }

    /// Evaluate rules in registration order and run the first match's handler.
    /// Handler errors are logged; dispatch itself never fails.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchOutcome {
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.scopes.contains(&event.scope) {
                continue;
            }
            let Some(caps) = rule
                .patterns
                .iter()
                .find_map(|p| p.captures(&event.text))
            else {
                continue;
            };
            let captures = caps
                .iter()
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect();
            let m = RuleMatch {
                event: event.clone(),
                captures,
            };
            if let Err(e) = (rule.handler)(m).await {
                log::warn!("handler for rule {} failed: {:#}", index, e);
            }
            return DispatchOutcome::Handled(index);
        }
        DispatchOutcome::NoMatch
    }
}
