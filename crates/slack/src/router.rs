use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bot::HandlerContext;
use crate::dispatch::{HandlerError, HandlerResult};
use crate::events::{ConversationKey, MessageEvent};

/// Handler-defined fields accumulated across the turns of one
/// conversation (`greeting`, `status`, `color`, ...). Ordered so the
/// final recap renders deterministically.
pub type ConversationState = BTreeMap<String, String>;

/// Continues a multi-turn exchange: invoked with the next event from a
/// conversation that has a pending route armed for this handler's name.
/// Re-arm via `ctx.router.continue_with` to keep the exchange going;
/// returning without re-arming is the terminal transition.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn resume(
        &self,
        event: &MessageEvent,
        state: ConversationState,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError>;
}

struct PendingRoute {
    route: String,
    state: ConversationState,
    armed_at: Instant,
}

/// Explicitly owned store of pending conversation routes. Built once at
/// wiring time (route handlers registered up front), then shared by
/// reference; the pending map lives behind a mutex because handlers
/// re-arm it while a resolve is in flight.
///
/// Invariant: at most one pending route per conversation key;
/// `continue_with` overwrites.
#[derive(Default)]
pub struct ConversationRouter {
    routes: HashMap<String, Arc<dyn RouteHandler>>,
    pending: Mutex<HashMap<ConversationKey, PendingRoute>>,
    ttl: Option<Duration>,
}

impl ConversationRouter {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { routes: HashMap::new(), pending: Mutex::new(HashMap::new()), ttl }
    }

    pub fn register_route<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: RouteHandler + 'static,
    {
        self.routes.insert(name.into(), Arc::new(handler));
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Arms (or re-arms) the route the next event from this conversation
    /// is sent to. Overwrites any previously pending entry for the key.
    pub async fn continue_with(
        &self,
        key: ConversationKey,
        route: impl Into<String>,
        state: ConversationState,
    ) {
        let route = route.into();
        if !self.routes.contains_key(&route) {
            warn!(route = %route, "arming a route with no registered handler");
        }

        let mut pending = self.pending.lock().await;
        pending.insert(key, PendingRoute { route, state, armed_at: Instant::now() });
    }

    /// Consumes the pending route for this event's conversation, if any,
    /// and runs its handler instead of pattern dispatch. `Ok(None)` means
    /// no pending route applied and the caller should fall through to the
    /// dispatcher. The entry is removed before the handler runs, so a
    /// handler that does not re-arm terminates the conversation.
    pub async fn resolve(
        &self,
        event: &MessageEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Option<HandlerResult>, HandlerError> {
        let key = event.conversation_key();
        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove(&key)
        };

        let Some(entry) = entry else {
            return Ok(None);
        };

        if let Some(ttl) = self.ttl {
            if entry.armed_at.elapsed() > ttl {
                debug!(route = %entry.route, "discarding expired pending route");
                return Ok(None);
            }
        }

        let Some(handler) = self.routes.get(&entry.route).cloned() else {
            warn!(route = %entry.route, "pending route has no registered handler; dropping");
            return Ok(None);
        };

        handler.resume(event, entry.state, ctx).await.map(Some)
    }

    /// Pending route name and state for a key, without consuming it.
    pub async fn pending_route(
        &self,
        key: &ConversationKey,
    ) -> Option<(String, ConversationState)> {
        let pending = self.pending.lock().await;
        pending.get(key).map(|entry| (entry.route.clone(), entry.state.clone()))
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ConversationRouter, ConversationState, RouteHandler};
    use crate::bot::HandlerContext;
    use crate::cache::ChannelNameCache;
    use crate::dispatch::{HandlerError, HandlerResult};
    use crate::emitter::ResponseEmitter;
    use crate::events::test_support::direct_message;
    use crate::events::MessageEvent;

    struct Fixture {
        emitter: ResponseEmitter,
        channels: ChannelNameCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self { emitter: ResponseEmitter::default(), channels: ChannelNameCache::default() }
        }

        fn ctx<'a>(&'a self, router: &'a ConversationRouter) -> HandlerContext<'a> {
            HandlerContext { emitter: &self.emitter, router, channels: &self.channels }
        }
    }

    /// Re-arms the same route while the event has no usable text, then
    /// terminates; mirrors the re-prompt shape of the demo flows.
    struct EchoUntilText {
        route: &'static str,
    }

    #[async_trait]
    impl RouteHandler for EchoUntilText {
        async fn resume(
            &self,
            event: &MessageEvent,
            mut state: ConversationState,
            ctx: &HandlerContext<'_>,
        ) -> Result<HandlerResult, HandlerError> {
            if !event.has_text() {
                ctx.router
                    .continue_with(event.conversation_key(), self.route, state)
                    .await;
                return Ok(HandlerResult::Responded);
            }

            state.insert("answer".to_owned(), event.text_or_empty().to_owned());
            Ok(HandlerResult::Responded)
        }
    }

    fn state_with(entries: &[(&str, &str)]) -> ConversationState {
        entries.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[tokio::test]
    async fn second_continue_with_overwrites_the_first() {
        let mut router = ConversationRouter::default();
        router.register_route("first", EchoUntilText { route: "first" });
        router.register_route("second", EchoUntilText { route: "second" });

        let event = direct_message("U1", "hi");
        let key = event.conversation_key();

        router.continue_with(key.clone(), "first", state_with(&[("greeting", "hi")])).await;
        router.continue_with(key.clone(), "second", state_with(&[("greeting", "hey")])).await;

        let (route, state) = router.pending_route(&key).await.expect("entry should exist");
        assert_eq!(route, "second");
        assert_eq!(state, state_with(&[("greeting", "hey")]));
        assert_eq!(router.pending_len().await, 1);
    }

    #[tokio::test]
    async fn resolve_returns_none_when_nothing_is_pending() {
        let router = ConversationRouter::default();
        let fixture = Fixture::new();

        let resolved = fixture
            .ctx(&router)
            .router
            .resolve(&direct_message("U1", "hi"), &fixture.ctx(&router))
            .await
            .expect("resolve should not fail");

        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn empty_text_self_loop_keeps_the_entry_armed() {
        let mut router = ConversationRouter::default();
        router.register_route("ask", EchoUntilText { route: "ask" });
        let fixture = Fixture::new();

        let armed = direct_message("U1", "hi");
        let key = armed.conversation_key();
        router.continue_with(key.clone(), "ask", state_with(&[("greeting", "hi")])).await;

        let silent = direct_message("U1", "");
        let resolved = router
            .resolve(&silent, &fixture.ctx(&router))
            .await
            .expect("resolve should not fail");
        assert_eq!(resolved, Some(HandlerResult::Responded));

        // Still pending with unchanged state.
        let (route, state) = router.pending_route(&key).await.expect("entry should survive");
        assert_eq!(route, "ask");
        assert_eq!(state, state_with(&[("greeting", "hi")]));
    }

    #[tokio::test]
    async fn terminal_resume_clears_the_pending_entry() {
        let mut router = ConversationRouter::default();
        router.register_route("ask", EchoUntilText { route: "ask" });
        let fixture = Fixture::new();

        let armed = direct_message("U1", "hi");
        let key = armed.conversation_key();
        router.continue_with(key.clone(), "ask", ConversationState::new()).await;

        let answered = direct_message("U1", "blue");
        router
            .resolve(&answered, &fixture.ctx(&router))
            .await
            .expect("resolve should not fail");

        assert!(router.pending_route(&key).await.is_none());
        assert_eq!(router.pending_len().await, 0);
    }

    #[tokio::test]
    async fn expired_entry_is_discarded_and_falls_through() {
        let mut router = ConversationRouter::new(Some(Duration::from_millis(5)));
        router.register_route("ask", EchoUntilText { route: "ask" });
        let fixture = Fixture::new();

        let armed = direct_message("U1", "hi");
        let key = armed.conversation_key();
        router.continue_with(key.clone(), "ask", ConversationState::new()).await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        let late = direct_message("U1", "still there?");
        let resolved = router
            .resolve(&late, &fixture.ctx(&router))
            .await
            .expect("resolve should not fail");

        assert!(resolved.is_none(), "expired entry should fall through to dispatch");
        assert!(router.pending_route(&key).await.is_none());
    }

    #[tokio::test]
    async fn unregistered_route_is_dropped_without_failing() {
        let router = ConversationRouter::default();
        let fixture = Fixture::new();

        let armed = direct_message("U1", "hi");
        router
            .continue_with(armed.conversation_key(), "ghost-route", ConversationState::new())
            .await;

        let resolved = router
            .resolve(&armed, &fixture.ctx(&router))
            .await
            .expect("resolve should not fail");

        assert!(resolved.is_none());
        assert_eq!(router.pending_len().await, 0);
    }
}
