use tracing::{debug, warn};

use crate::cache::ChannelNameCache;
use crate::dispatch::{DispatchReport, HandlerError, HandlerResult, PatternDispatcher};
use crate::emitter::ResponseEmitter;
use crate::events::MessageEvent;
use crate::router::ConversationRouter;

/// Borrowed access handed to handlers at call time. Handlers never own
/// the stores; the bot does, with one lifecycle from bootstrap to
/// shutdown.
pub struct HandlerContext<'a> {
    pub emitter: &'a ResponseEmitter,
    pub router: &'a ConversationRouter,
    pub channels: &'a ChannelNameCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotOutcome {
    /// A pending conversation route consumed the event.
    Routed(HandlerResult),
    /// The pending route's handler failed; the event was not re-matched.
    RouteFailed(HandlerError),
    /// No route was pending (or it had expired); the pattern table ran.
    Dispatched(DispatchReport),
}

/// One bot instance: the ordered pattern table, the conversation route
/// store, the channel name cache and the reply emitter.
#[derive(Default)]
pub struct Bot {
    dispatcher: PatternDispatcher,
    router: ConversationRouter,
    emitter: ResponseEmitter,
    channels: ChannelNameCache,
}

impl Bot {
    pub fn new(
        dispatcher: PatternDispatcher,
        router: ConversationRouter,
        emitter: ResponseEmitter,
        channels: ChannelNameCache,
    ) -> Self {
        Self { dispatcher, router, emitter, channels }
    }

    /// Handles one inbound event: a pending conversation route wins over
    /// pattern matching; only when no route consumed the event does the
    /// rule table run.
    pub async fn handle_event(&self, event: &MessageEvent) -> BotOutcome {
        let ctx = HandlerContext {
            emitter: &self.emitter,
            router: &self.router,
            channels: &self.channels,
        };

        match self.router.resolve(event, &ctx).await {
            Ok(Some(result)) => {
                debug!(channel_id = %event.channel_id, "pending route consumed event");
                BotOutcome::Routed(result)
            }
            Ok(None) => {
                let report = self.dispatcher.dispatch(event, &ctx).await;
                BotOutcome::Dispatched(report)
            }
            Err(error) => {
                warn!(
                    channel_id = %event.channel_id,
                    error = %error,
                    "route handler failed"
                );
                BotOutcome::RouteFailed(error)
            }
        }
    }

    pub fn router(&self) -> &ConversationRouter {
        &self.router
    }

    pub fn rule_count(&self) -> usize {
        self.dispatcher.rule_count()
    }
}
