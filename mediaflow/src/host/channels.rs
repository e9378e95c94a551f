//! Channels and an in-memory resolver.

use super::ChannelResolver;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named, configured combination of a backend plus credentials,
/// parameters and feature flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable identifier.
    pub id: String,
    /// Human-facing unique name.
    pub name: String,
    /// Backend id this channel dispatches to.
    pub connector_id: String,
    /// Backend configuration (endpoint, credentials, model).
    #[serde(default)]
    pub connector_config: serde_json::Value,
    /// Per-stage or per-config-group overrides, e.g. `{"billing": {"enabled": false}}`.
    #[serde(default)]
    pub plugin_overrides: HashMap<String, serde_json::Value>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the channel accepts requests.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Creates an enabled channel with an empty configuration.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        connector_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connector_id: connector_id.into(),
            connector_config: serde_json::json!({}),
            plugin_overrides: HashMap::new(),
            tags: Vec::new(),
            enabled: true,
        }
    }

    /// Sets the backend configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.connector_config = config;
        self
    }

    /// Adds a per-stage override.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.plugin_overrides.insert(key.into(), value);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the `enabled` override stored under `key`, if any.
    #[must_use]
    pub fn override_enabled(&self, key: &str) -> Option<bool> {
        self.plugin_overrides
            .get(key)
            .and_then(|v| v.get("enabled"))
            .and_then(serde_json::Value::as_bool)
    }
}

/// Channel resolver backed by a map. Matches ids first, then names.
#[derive(Debug, Default)]
pub struct InMemoryChannels {
    channels: RwLock<Vec<Channel>>,
}

impl InMemoryChannels {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver holding `channels`.
    #[must_use]
    pub fn with_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: RwLock::new(channels.into_iter().collect()),
        }
    }

    /// Adds or replaces a channel (matched by id).
    pub fn upsert(&self, channel: Channel) {
        let mut channels = self.channels.write();
        if let Some(existing) = channels.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel;
        } else {
            channels.push(channel);
        }
    }

    /// Removes a channel by id.
    pub fn remove(&self, id: &str) -> Option<Channel> {
        let mut channels = self.channels.write();
        let index = channels.iter().position(|c| c.id == id)?;
        Some(channels.remove(index))
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Returns true if no channels are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    fn lookup(&self, id_or_name: &str) -> Option<Channel> {
        let channels = self.channels.read();
        channels
            .iter()
            .find(|c| c.id == id_or_name)
            .or_else(|| channels.iter().find(|c| c.name == id_or_name))
            .cloned()
    }
}

#[async_trait]
impl ChannelResolver for InMemoryChannels {
    async fn get_channel(&self, id_or_name: &str) -> Option<Channel> {
        self.lookup(id_or_name)
    }
}
