use std::sync::Arc;

use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_slack::flows::demo_bot;
use parley_slack::transport::{EventPump, NoopEventTransport, ReconnectPolicy};
use parley_slack::{NoopChannelDirectory, NoopMessageSink};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub pump: EventPump,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the demo bot behind an event pump. The transport, message sink
/// and channel directory are no-op placeholders until a concrete Slack
/// connection is plugged in.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let bot = demo_bot(&config.bot, Arc::new(NoopMessageSink), Arc::new(NoopChannelDirectory));
    info!(
        event_name = "system.bootstrap.bot_wired",
        rule_count = bot.rule_count(),
        route_count = bot.router().route_count(),
        "demo bot rules and routes registered"
    );

    let pump =
        EventPump::new(Arc::new(NoopEventTransport), Arc::new(bot), ReconnectPolicy::default());

    Ok(Application { config, pump })
}
