//! Host collaborators the engine consumes.
//!
//! The host application owns channels, plugin state and configuration.
//! The engine only sees them through the traits in this module, which
//! keeps every lookup explicit and replaceable in tests.

mod channels;
mod enablement;

pub use channels::{Channel, InMemoryChannels};
pub use enablement::{
    resolve_stage_enabled, AllPluginsEnabled, EnablementScopes, PluginStates, ScopedEnablement,
};

use crate::stages::StageDefinition;
use async_trait::async_trait;

/// Resolves a channel by id or name.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Returns the channel whose id or name matches, if any.
    async fn get_channel(&self, id_or_name: &str) -> Option<Channel>;
}

/// Decides whether a stage runs for a channel.
pub trait StageEnablement: Send + Sync {
    /// Returns true if the stage should take part in this request.
    fn is_stage_enabled(&self, stage: &StageDefinition, channel: &Channel) -> bool;
}

/// Supplies per-stage configuration.
pub trait StageConfigSource: Send + Sync {
    /// Returns the configuration stored under `name`.
    fn stage_config(&self, name: &str) -> Option<serde_json::Value>;
}

/// Reports whether a plugin is currently enabled.
pub trait PluginStatus: Send + Sync {
    /// Returns true if the plugin is enabled.
    fn is_plugin_enabled(&self, plugin_id: &str) -> bool;
}

/// Looks up a stage's configuration, falling back to its config group
/// when the stage has no dedicated entry.
pub fn resolve_stage_config(
    source: &dyn StageConfigSource,
    stage: &StageDefinition,
) -> Option<serde_json::Value> {
    source.stage_config(stage.name()).or_else(|| {
        stage
            .config_group()
            .and_then(|group| source.stage_config(group))
    })
}

/// A config source with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStageConfig;

impl StageConfigSource for NoStageConfig {
    fn stage_config(&self, _name: &str) -> Option<serde_json::Value> {
        None
    }
}
