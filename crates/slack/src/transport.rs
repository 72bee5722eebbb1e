use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bot::{Bot, BotOutcome};
use crate::events::MessageEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// One delivery from the event stream. The delivery id is what gets
/// acknowledged; the webhook layer that verifies signatures and parses
/// payloads lives behind implementations of `EventTransport`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEnvelope {
    pub delivery_id: String,
    pub event: MessageEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<EventEnvelope>, TransportError>;
    async fn acknowledge(&self, delivery_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopEventTransport;

#[async_trait]
impl EventTransport for NoopEventTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<EventEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _delivery_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pulls envelopes from the transport and feeds them to the bot, one at
/// a time in delivery order. Deliveries are acknowledged before
/// handling; duplicate or out-of-order deliveries are not detected here.
pub struct EventPump {
    transport: Arc<dyn EventTransport>,
    bot: Arc<Bot>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for EventPump {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopEventTransport),
            bot: Arc::new(Bot::default()),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl EventPump {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        bot: Arc<Bot>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, bot, reconnect_policy }
    }

    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "event transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "event transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening event transport connection");
        self.transport.connect().await?;
        info!(attempt, "event transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "event transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            info!(
                event_name = "ingress.envelope_received",
                delivery_id = %envelope.delivery_id,
                team_id = %envelope.event.team_id,
                channel_id = %envelope.event.channel_id,
                scope = ?envelope.event.scope,
                "received event envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.delivery_id).await {
                warn!(
                    event_name = "ingress.ack_sent",
                    delivery_id = %envelope.delivery_id,
                    error = %error,
                    "failed to acknowledge event envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.ack_sent",
                    delivery_id = %envelope.delivery_id,
                    "acknowledged event envelope"
                );
            }

            match self.bot.handle_event(&envelope.event).await {
                BotOutcome::Routed(result) => {
                    debug!(
                        delivery_id = %envelope.delivery_id,
                        result = ?result,
                        "event consumed by pending conversation route"
                    );
                }
                BotOutcome::RouteFailed(error) => {
                    warn!(
                        delivery_id = %envelope.delivery_id,
                        error = %error,
                        "route handler failed; continuing pump loop"
                    );
                }
                BotOutcome::Dispatched(report) => {
                    debug!(
                        delivery_id = %envelope.delivery_id,
                        matched = report.matched,
                        responded = report.responded,
                        failures = report.failures.len(),
                        "event went through pattern dispatch"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{EventEnvelope, EventPump, EventTransport, ReconnectPolicy, TransportError};
    use crate::bot::Bot;
    use crate::events::test_support::direct_message;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<EventEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<EventEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl EventTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<EventEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, delivery_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(delivery_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    fn envelope(delivery_id: &str) -> EventEnvelope {
        EventEnvelope {
            delivery_id: delivery_id.to_owned(),
            event: direct_message("U1", "hello"),
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(envelope("env-1"))), Ok(None)],
        ));

        let pump = EventPump::new(
            transport.clone(),
            Arc::new(Bot::default()),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        pump.start().await.expect("pump should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let pump = EventPump::new(
            transport.clone(),
            Arc::new(Bot::default()),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        pump.start().await.expect("pump should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn deliveries_are_acknowledged_in_order() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(envelope("env-1"))), Ok(Some(envelope("env-2"))), Ok(None)],
        ));

        let pump = EventPump::new(
            transport.clone(),
            Arc::new(Bot::default()),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );

        pump.start().await.expect("pump should not fail");
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2"]);
    }

    #[test]
    fn backoff_is_capped_at_the_configured_maximum() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(1).as_millis(), 500);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(12).as_millis(), 1_000);
    }
}
