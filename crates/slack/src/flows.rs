//! The demo bot behavior: every rule, route and canned reply the bot
//! ships with, plus `demo_bot` which wires them into a ready `Bot`.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use parley_core::config::BotConfig;

use crate::bot::{Bot, HandlerContext};
use crate::cache::{ChannelDirectory, ChannelNameCache};
use crate::dispatch::{
    HandlerError, HandlerResult, Matcher, MessageHandler, PatternDispatcher,
};
use crate::emitter::{
    passes_gate, Attachment, MessageSink, OutgoingMessage, Reply, ResponseEmitter,
};
use crate::events::{EventScope, MessageEvent};
use crate::router::{ConversationRouter, ConversationState, RouteHandler};

/// Route names of the greeting conversation.
pub const ROUTE_HOW_ARE_YOU: &str = "how-are-you";
pub const ROUTE_COLOR: &str = "color";

const STATE_GREETING: &str = "greeting";
const STATE_STATUS: &str = "status";
const STATE_COLOR: &str = "color";

pub const HELP_TEXT: &str = "\
I will respond to the following messages:
`help` - to see this message.
`hi` - to demonstrate a conversation that tracks state.
`thanks` - to demonstrate a simple response.
`<type-any-other-text>` - to demonstrate a random emoticon response, some of the time :wink:.
`attachment` - to see a message with an attachment.
";

const THANKS_REPLIES: [&str; 4] = [
    "You're welcome :smile:",
    "You bet",
    ":+1: Of course",
    "Anytime :sun_with_face: :full_moon_with_face:",
];

const CATCH_ALL_REPLIES: [&str; 3] = [":wave:", ":pray:", ":raised_hands:"];

fn greeting_pattern() -> Regex {
    Regex::new("(?i)^(hi|hello|hey)$").expect("valid greeting pattern")
}

fn thanks_pattern() -> Regex {
    Regex::new("(?i)^(thanks|thank you)").expect("valid thanks pattern")
}

/// Scopes for rules that answer wherever the bot is addressed.
fn any_mention_or_dm() -> Vec<EventScope> {
    vec![EventScope::DirectMention, EventScope::Mention, EventScope::DirectMessage]
}

struct Help;

#[async_trait]
impl MessageHandler for Help {
    async fn handle(
        &self,
        event: &MessageEvent,
        _matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        ctx.emitter.say(&event.origin(), HELP_TEXT).await?;
        Ok(HandlerResult::Responded)
    }
}

/// Kicks off the stateful exchange: greets back and arms `how-are-you`
/// with the greeting word the user actually typed.
struct Greeting;

#[async_trait]
impl MessageHandler for Greeting {
    async fn handle(
        &self,
        event: &MessageEvent,
        matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        ctx.emitter.say(&event.origin(), format!("{matched}, how are you?")).await?;

        let mut state = ConversationState::new();
        state.insert(STATE_GREETING.to_owned(), matched.to_owned());
        ctx.router
            .continue_with(event.conversation_key(), ROUTE_HOW_ARE_YOU, state)
            .await;
        Ok(HandlerResult::Responded)
    }
}

/// Second turn of the greeting exchange. An event with no usable text
/// re-prompts and re-arms the same route with unchanged state; otherwise
/// the answer is recorded as `status` and the conversation advances.
struct HowAreYou;

#[async_trait]
impl RouteHandler for HowAreYou {
    async fn resume(
        &self,
        event: &MessageEvent,
        mut state: ConversationState,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        if !event.has_text() {
            ctx.emitter
                .say(&event.origin(), "Whoops, I'm still waiting to hear how you're doing.")
                .await?;
            ctx.emitter.say(&event.origin(), "How are you?").await?;
            ctx.router
                .continue_with(event.conversation_key(), ROUTE_HOW_ARE_YOU, state)
                .await;
            return Ok(HandlerResult::Responded);
        }

        state.insert(STATE_STATUS.to_owned(), event.text_or_empty().to_owned());
        ctx.emitter.say(&event.origin(), "Ok then. What's your favorite color?").await?;
        ctx.router.continue_with(event.conversation_key(), ROUTE_COLOR, state).await;
        Ok(HandlerResult::Responded)
    }
}

/// Final turn: records `color` and replies with the accumulated state.
/// Not re-arming any route is what ends the conversation.
struct Color;

#[async_trait]
impl RouteHandler for Color {
    async fn resume(
        &self,
        event: &MessageEvent,
        mut state: ConversationState,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        if !event.has_text() {
            ctx.emitter
                .say(&event.origin(), "I'm eagerly awaiting to hear your favorite color.")
                .await?;
            ctx.router.continue_with(event.conversation_key(), ROUTE_COLOR, state).await;
            return Ok(HandlerResult::Responded);
        }

        state.insert(STATE_COLOR.to_owned(), event.text_or_empty().to_owned());
        let recap = serde_json::to_string(&state)
            .map_err(|error| HandlerError::Other(format!("state recap failed: {error}")))?;

        ctx.emitter.say(&event.origin(), "Thanks for sharing.").await?;
        ctx.emitter
            .say(&event.origin(), format!("Here's what you've told me so far: ```{recap}```"))
            .await?;
        Ok(HandlerResult::Responded)
    }
}

struct Thanks;

#[async_trait]
impl MessageHandler for Thanks {
    async fn handle(
        &self,
        event: &MessageEvent,
        _matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        ctx.emitter.say(&event.origin(), Reply::one_of_texts(THANKS_REPLIES)).await?;
        Ok(HandlerResult::Responded)
    }
}

struct AttachmentDemo;

#[async_trait]
impl MessageHandler for AttachmentDemo {
    async fn handle(
        &self,
        event: &MessageEvent,
        _matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        let message = OutgoingMessage::text("Check out this amazing attachment! :confetti_ball:")
            .attachment(
                Attachment::new()
                    .title("Parley - a stateful demo bot")
                    .text("Parley demonstrates pattern dispatch, multi-turn conversations and channel lookups over a pluggable transport.")
                    .title_link("https://api.slack.com/events-api")
                    .image_url("https://example.com/parley-bot.png")
                    .color("#7CD197"),
            );

        ctx.emitter.say(&event.origin(), message).await?;
        Ok(HandlerResult::Responded)
    }
}

/// Greets users joining the configured channel. A directory lookup
/// failure is logged and treated as "not the channel" - the join event
/// is dropped rather than surfaced as an error.
struct WelcomeOnJoin {
    channel_name: String,
}

#[async_trait]
impl MessageHandler for WelcomeOnJoin {
    async fn handle(
        &self,
        event: &MessageEvent,
        _matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        let in_channel = match ctx.channels.is_named_channel(&self.channel_name, event).await {
            Ok(in_channel) => in_channel,
            Err(error) => {
                warn!(
                    channel_name = %self.channel_name,
                    error = %error,
                    "channel lookup failed during join welcome; skipping"
                );
                return Ok(HandlerResult::Processed);
            }
        };

        if !in_channel {
            return Ok(HandlerResult::Ignored);
        }

        let message = OutgoingMessage::text(format!(
            "Welcome <@{}> to the team! Here's a guide to get you started:\n\
             https://api.slack.com/start/overview",
            event.user_id
        ))
        .unfurl(true, true);

        ctx.emitter.say(&event.origin(), message).await?;
        Ok(HandlerResult::Responded)
    }
}

/// Last rule in the table: replies with a random emoticon, but only some
/// of the time, per an independent random draw.
struct CatchAll {
    probability: f64,
}

#[async_trait]
impl MessageHandler for CatchAll {
    async fn handle(
        &self,
        event: &MessageEvent,
        _matched: &str,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        if !passes_gate(self.probability) {
            return Ok(HandlerResult::Ignored);
        }

        ctx.emitter.say(&event.origin(), Reply::one_of_texts(CATCH_ALL_REPLIES)).await?;
        Ok(HandlerResult::Responded)
    }
}

/// Builds the full demo bot over the given sink and channel directory.
/// Rule order matters and is part of the behavior: the catch-all must be
/// registered last so every specific rule gets its chance first (fan-out
/// still lets both fire for, say, a greeting in a direct message).
pub fn demo_bot(
    config: &BotConfig,
    sink: Arc<dyn MessageSink>,
    directory: Arc<dyn ChannelDirectory>,
) -> Bot {
    let mut dispatcher = PatternDispatcher::new();

    dispatcher.register(Matcher::Keyword("help".to_owned()), any_mention_or_dm(), Help);
    dispatcher.register(
        Matcher::Pattern(greeting_pattern()),
        vec![EventScope::DirectMention, EventScope::DirectMessage],
        Greeting,
    );
    dispatcher.register(Matcher::Pattern(thanks_pattern()), any_mention_or_dm(), Thanks);
    dispatcher.register(
        Matcher::Keyword("attachment".to_owned()),
        any_mention_or_dm(),
        AttachmentDemo,
    );
    dispatcher.register(
        Matcher::predicate(|event: &MessageEvent| event.is_channel_join()),
        Vec::new(),
        WelcomeOnJoin { channel_name: config.welcome_channel.clone() },
    );
    dispatcher.register(
        Matcher::Any,
        vec![EventScope::DirectMention, EventScope::DirectMessage],
        CatchAll { probability: config.catch_all_probability },
    );

    let mut router =
        ConversationRouter::new(config.route_ttl_secs.map(std::time::Duration::from_secs));
    router.register_route(ROUTE_HOW_ARE_YOU, HowAreYou);
    router.register_route(ROUTE_COLOR, Color);

    Bot::new(
        dispatcher,
        router,
        ResponseEmitter::new(sink),
        ChannelNameCache::new(directory),
    )
}
