use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bot::HandlerContext;
use crate::cache::DirectoryError;
use crate::emitter::SinkError;
use crate::events::{EventScope, MessageEvent};

/// How a rule decides whether it applies to an event's text.
#[derive(Clone)]
pub enum Matcher {
    /// Case-insensitive equality against the trimmed message text.
    Keyword(String),
    /// Regular expression; the first match becomes the matched text.
    Pattern(Regex),
    /// Matches every event, including ones with no text.
    Any,
    /// Arbitrary predicate over the whole event.
    Predicate(Arc<dyn Fn(&MessageEvent) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&MessageEvent) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Returns the matched text when the matcher applies. Keyword and
    /// pattern matchers report what they matched so handlers can echo it
    /// back; the others report the full (possibly empty) text.
    fn matched_text(&self, event: &MessageEvent) -> Option<String> {
        let text = event.text_or_empty();
        match self {
            Self::Keyword(keyword) => text
                .trim()
                .eq_ignore_ascii_case(keyword)
                .then(|| text.trim().to_owned()),
            Self::Pattern(pattern) => pattern.find(text).map(|found| found.as_str().to_owned()),
            Self::Any => Some(text.to_owned()),
            Self::Predicate(predicate) => predicate(event).then(|| text.to_owned()),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword(keyword) => f.debug_tuple("Keyword").field(keyword).finish(),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
            Self::Any => f.write_str("Any"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// The handler sent at least one reply.
    Responded,
    /// The handler ran but chose not to reply.
    Processed,
    /// The handler decided the event was not for it.
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("handler failure: {0}")]
    Other(String),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        event: &MessageEvent,
        matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError>;
}

struct Rule {
    matcher: Matcher,
    /// Scopes this rule accepts. Empty means every scope.
    scopes: Vec<EventScope>,
    handler: Arc<dyn MessageHandler>,
}

impl Rule {
    fn accepts_scope(&self, scope: EventScope) -> bool {
        self.scopes.is_empty() || self.scopes.contains(&scope)
    }
}

/// What one `dispatch` call did: how many rules matched, how many
/// handlers replied, and any handler failures (which never abort the
/// fan-out).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: usize,
    pub responded: usize,
    pub failures: Vec<HandlerError>,
}

/// Ordered rule table. Rules are evaluated in registration order and
/// EVERY matching rule fires; registration order is the documented
/// tie-break, and fan-out to multiple handlers is intentional.
#[derive(Default)]
pub struct PatternDispatcher {
    rules: Vec<Rule>,
}

impl PatternDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, matcher: Matcher, scopes: Vec<EventScope>, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.rules.push(Rule { matcher, scopes, handler: Arc::new(handler) });
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub async fn dispatch(&self, event: &MessageEvent, ctx: &HandlerContext<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.accepts_scope(event.scope) {
                continue;
            }
            let Some(matched) = rule.matcher.matched_text(event) else {
                continue;
            };

            report.matched += 1;
            match rule.handler.handle(event, &matched, ctx).await {
                Ok(HandlerResult::Responded) => report.responded += 1,
                Ok(HandlerResult::Processed) | Ok(HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        rule_index = index,
                        matcher = ?rule.matcher,
                        error = %error,
                        "handler failed; continuing dispatch fan-out"
                    );
                    report.failures.push(error);
                }
            }
        }

        if report.matched == 0 {
            // Unmatched events are silently ignored, not an error.
            debug!(channel_id = %event.channel_id, "no dispatch rule matched");
        }

        report
    }
}
