use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::MessageOrigin;

/// Legacy-style message attachment, the shape the outbound transport
/// accepts: `{text, title, image_url, title_link, color}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn title_link(mut self, title_link: impl Into<String>) -> Self {
        self.title_link = Some(title_link.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// One outbound message: plain text plus optional attachments and unfurl
/// flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unfurl_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unfurl_media: Option<bool>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), attachments: Vec::new(), unfurl_links: None, unfurl_media: None }
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn unfurl(mut self, links: bool, media: bool) -> Self {
        self.unfurl_links = Some(links);
        self.unfurl_media = Some(media);
        self
    }
}

/// A reply is either one message or a set of candidates the emitter
/// narrows to one by uniform random selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    One(OutgoingMessage),
    OneOf(Vec<OutgoingMessage>),
}

impl Reply {
    /// Candidate set built from plain text lines.
    pub fn one_of_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(texts.into_iter().map(OutgoingMessage::text).collect())
    }
}

impl From<OutgoingMessage> for Reply {
    fn from(message: OutgoingMessage) -> Self {
        Self::One(message)
    }
}

impl From<Vec<OutgoingMessage>> for Reply {
    fn from(messages: Vec<OutgoingMessage>) -> Self {
        Self::OneOf(messages)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::One(OutgoingMessage::text(text))
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::One(OutgoingMessage::text(text))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("outbound post failed: {0}")]
    Post(String),
    #[error("reply candidate list was empty")]
    EmptyReplySet,
}

/// Outbound transport seam. The real implementation would call
/// `chat.postMessage`; tests and the default wiring use the fakes below.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn post_message(
        &self,
        origin: &MessageOrigin,
        message: &OutgoingMessage,
    ) -> Result<(), SinkError>;
}

#[derive(Default)]
pub struct NoopMessageSink;

#[async_trait]
impl MessageSink for NoopMessageSink {
    async fn post_message(
        &self,
        _origin: &MessageOrigin,
        _message: &OutgoingMessage,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that records every post, for assertions in tests and smoke runs.
#[derive(Default)]
pub struct RecordingMessageSink {
    posts: Mutex<Vec<(MessageOrigin, OutgoingMessage)>>,
}

impl RecordingMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn posts(&self) -> Vec<(MessageOrigin, OutgoingMessage)> {
        self.posts.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.posts.lock().await.iter().map(|(_, message)| message.text.clone()).collect()
    }
}

#[async_trait]
impl MessageSink for RecordingMessageSink {
    async fn post_message(
        &self,
        origin: &MessageOrigin,
        message: &OutgoingMessage,
    ) -> Result<(), SinkError> {
        self.posts.lock().await.push((origin.clone(), message.clone()));
        Ok(())
    }
}

/// Uniform random pick over a candidate slice.
pub fn pick_uniform<T>(candidates: &[T]) -> Option<&T> {
    candidates.choose(&mut rand::thread_rng())
}

/// Independent random draw used for probabilistic gating (the catch-all
/// rule replies only some of the time).
pub fn passes_gate(probability: f64) -> bool {
    if probability >= 1.0 {
        return true;
    }
    if probability <= 0.0 {
        return false;
    }
    rand::thread_rng().gen::<f64>() < probability
}

/// Sends replies through the configured sink. Exactly one outbound call
/// per `say` invocation; a candidate list is reduced to a single message
/// before the sink is touched.
pub struct ResponseEmitter {
    sink: Arc<dyn MessageSink>,
}

impl ResponseEmitter {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub async fn say(
        &self,
        origin: &MessageOrigin,
        reply: impl Into<Reply> + Send,
    ) -> Result<(), SinkError> {
        let message = match reply.into() {
            Reply::One(message) => message,
            Reply::OneOf(candidates) => {
                let picked = pick_uniform(&candidates).ok_or(SinkError::EmptyReplySet)?;
                picked.clone()
            }
        };

        debug!(channel_id = %origin.channel_id, text_len = message.text.len(), "posting reply");
        self.sink.post_message(origin, &message).await
    }
}

impl Default for ResponseEmitter {
    fn default() -> Self {
        Self::new(Arc::new(NoopMessageSink))
    }
}
