use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::MessageEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("channel list lookup failed: {0}")]
    Lookup(String),
}

/// Directory lookup seam. The real implementation would call the
/// `conversations.list` Web API scoped to the delivery's credential.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(&self, bot_token: &str) -> Result<Vec<ChannelInfo>, DirectoryError>;
}

#[derive(Default)]
pub struct NoopChannelDirectory;

#[async_trait]
impl ChannelDirectory for NoopChannelDirectory {
    async fn list_channels(&self, _bot_token: &str) -> Result<Vec<ChannelInfo>, DirectoryError> {
        Ok(Vec::new())
    }
}

/// Lazy two-level cache: channel name → team id → channel id. An entry,
/// once populated, is treated as permanently valid; channel identity is
/// assumed stable for the bot's lifetime, so there is no invalidation
/// path.
pub struct ChannelNameCache {
    directory: Arc<dyn ChannelDirectory>,
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl ChannelNameCache {
    pub fn new(directory: Arc<dyn ChannelDirectory>) -> Self {
        Self { directory, entries: Mutex::new(HashMap::new()) }
    }

    /// Did this event originate in the channel with the given name?
    ///
    /// Cache hit answers without an external call. On a miss, one
    /// directory listing is issued with the event's credential and the
    /// first channel carrying the target name is recorded (duplicate
    /// names later in the list are never consulted). A failed lookup
    /// propagates without touching the cache; the caller decides what a
    /// lookup failure means.
    pub async fn is_named_channel(
        &self,
        name: &str,
        event: &MessageEvent,
    ) -> Result<bool, DirectoryError> {
        {
            let entries = self.entries.lock().await;
            if let Some(channel_id) = entries.get(name).and_then(|teams| teams.get(&event.team_id))
            {
                if channel_id == &event.channel_id {
                    return Ok(true);
                }
            }
        }

        let channels = self.directory.list_channels(&event.bot_token).await?;

        let mut entries = self.entries.lock().await;
        let teams = entries.entry(name.to_owned()).or_default();
        if !teams.contains_key(&event.team_id) {
            if let Some(found) = channels.iter().find(|channel| channel.name == name) {
                debug!(name, channel_id = %found.id, "caching channel name mapping");
                teams.insert(event.team_id.clone(), found.id.clone());
            }
        }

        Ok(teams.get(&event.team_id) == Some(&event.channel_id))
    }

    /// Cached channel id for (name, team), if populated.
    pub async fn cached_channel_id(&self, name: &str, team_id: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries.get(name).and_then(|teams| teams.get(team_id)).cloned()
    }
}

impl Default for ChannelNameCache {
    fn default() -> Self {
        Self::new(Arc::new(NoopChannelDirectory))
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::{FailingDirectory, StaticDirectory};
    use super::{ChannelNameCache, DirectoryError};
    use crate::events::test_support::channel_join;

    #[tokio::test]
    async fn miss_populates_cache_and_hit_skips_the_directory() {
        let directory =
            Arc::new(StaticDirectory::new(vec![("C1", "general"), ("C2", "random")]));
        let cache = ChannelNameCache::new(directory.clone());
        let event = channel_join("T1", "C1", "U1");

        assert!(cache.is_named_channel("general", &event).await.expect("lookup"));
        assert_eq!(cache.cached_channel_id("general", "T1").await.as_deref(), Some("C1"));
        assert_eq!(directory.lookups(), 1);

        // Second check is a pure cache hit.
        assert!(cache.is_named_channel("general", &event).await.expect("lookup"));
        assert_eq!(directory.lookups(), 1);
    }

    #[tokio::test]
    async fn wrong_channel_returns_false_without_poisoning_the_cache() {
        let directory =
            Arc::new(StaticDirectory::new(vec![("C1", "general"), ("C2", "random")]));
        let cache = ChannelNameCache::new(directory);
        let elsewhere = channel_join("T1", "C9", "U1");

        assert!(!cache.is_named_channel("general", &elsewhere).await.expect("lookup"));
        // The lookup still recorded the true mapping, never C9.
        assert_eq!(cache.cached_channel_id("general", "T1").await.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn unknown_name_populates_nothing() {
        let directory = Arc::new(StaticDirectory::new(vec![("C1", "general")]));
        let cache = ChannelNameCache::new(directory);
        let event = channel_join("T1", "C1", "U1");

        assert!(!cache.is_named_channel("lounge", &event).await.expect("lookup"));
        assert!(cache.cached_channel_id("lounge", "T1").await.is_none());
    }

    #[tokio::test]
    async fn first_name_match_wins_over_duplicates() {
        let directory =
            Arc::new(StaticDirectory::new(vec![("C1", "general"), ("C7", "general")]));
        let cache = ChannelNameCache::new(directory);
        let event = channel_join("T1", "C7", "U1");

        // The scan short-circuits on C1, so the later duplicate is never
        // recorded and C7 does not count as `general`.
        assert!(!cache.is_named_channel("general", &event).await.expect("lookup"));
        assert_eq!(cache.cached_channel_id("general", "T1").await.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn teams_are_cached_independently() {
        let directory = Arc::new(StaticDirectory::new(vec![("C5", "general")]));
        let cache = ChannelNameCache::new(directory.clone());

        assert!(cache
            .is_named_channel("general", &channel_join("T1", "C5", "U1"))
            .await
            .expect("lookup"));
        assert!(cache
            .is_named_channel("general", &channel_join("T2", "C5", "U1"))
            .await
            .expect("lookup"));

        // One lookup per team; names do not leak across workspaces.
        assert_eq!(directory.lookups(), 2);
        assert_eq!(cache.cached_channel_id("general", "T1").await.as_deref(), Some("C5"));
        assert_eq!(cache.cached_channel_id("general", "T2").await.as_deref(), Some("C5"));
    }

    #[tokio::test]
    async fn directory_failure_propagates_and_leaves_cache_untouched() {
        let cache = ChannelNameCache::new(Arc::new(FailingDirectory));
        let event = channel_join("T1", "C1", "U1");

        let result = cache.is_named_channel("general", &event).await;
        assert_eq!(result, Err(DirectoryError::Lookup("directory unavailable".to_owned())));
        assert!(cache.cached_channel_id("general", "T1").await.is_none());
    }
}
