//! Slack bot core - pattern matching, conversations, replies
//!
//! This crate holds everything between the inbound event stream and the
//! outbound message sink:
//! - **Events** (`events`) - typed inbound message events and the
//!   conversation key derived from them
//! - **Dispatch** (`dispatch`) - ordered pattern rules, fan-out dispatch
//! - **Router** (`router`) - pending multi-turn conversation routes
//! - **Cache** (`cache`) - lazy channel name → channel id lookups
//! - **Emitter** (`emitter`) - outgoing messages, random reply selection
//! - **Transport** (`transport`) - event pump with reconnect policy
//! - **Flows** (`flows`) - the demo bot behavior wired over all of the
//!   above
//!
//! # Architecture
//!
//! ```text
//! EventTransport → EventPump → Bot ──► ConversationRouter (pending route?)
//!                                  └─► PatternDispatcher (ordered fan-out)
//!                                           ↓
//!                                   ResponseEmitter → MessageSink
//! ```
//!
//! The external surfaces (event delivery, the Slack Web API for posting
//! messages and listing channels) are traits with no-op defaults; nothing
//! in this crate performs HTTP on its own.

pub mod bot;
pub mod cache;
pub mod dispatch;
pub mod emitter;
pub mod events;
pub mod flows;
pub mod router;
pub mod transport;

pub use bot::{Bot, BotOutcome, HandlerContext};
pub use cache::{
    ChannelDirectory, ChannelInfo, ChannelNameCache, DirectoryError, NoopChannelDirectory,
};
pub use dispatch::{
    DispatchReport, HandlerError, HandlerResult, Matcher, MessageHandler, PatternDispatcher,
};
pub use emitter::{
    Attachment, MessageSink, NoopMessageSink, OutgoingMessage, RecordingMessageSink, Reply,
    ResponseEmitter, SinkError,
};
pub use events::{ConversationKey, EventScope, EventSubtype, MessageEvent, MessageOrigin};
pub use flows::demo_bot;
pub use router::{ConversationRouter, ConversationState, RouteHandler};
pub use transport::{
    EventEnvelope, EventPump, EventTransport, NoopEventTransport, ReconnectPolicy, TransportError,
};
