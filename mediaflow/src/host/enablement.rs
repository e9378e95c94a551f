//! Stage enablement across plugin, channel and global scopes.

use super::{Channel, PluginStatus, StageEnablement};
use crate::config::EngineConfig;
use crate::stages::StageDefinition;
use dashmap::DashMap;
use std::sync::Arc;

/// The three scopes that decide whether a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnablementScopes {
    /// Whether the stage's owning plugin is enabled.
    pub plugin_enabled: bool,
    /// The channel's override, if the channel sets one.
    pub channel_override: Option<bool>,
    /// The global configuration switch, if configured.
    pub global: Option<bool>,
}

/// Resolves the scopes, most specific first.
///
/// A disabled owning plugin always wins. Otherwise the channel override
/// beats the global switch, and a stage nobody configured is enabled.
#[must_use]
pub fn resolve_stage_enabled(scopes: EnablementScopes) -> bool {
    if !scopes.plugin_enabled {
        return false;
    }
    scopes.channel_override.or(scopes.global).unwrap_or(true)
}

/// Plugin status that reports every plugin as enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPluginsEnabled;

impl PluginStatus for AllPluginsEnabled {
    fn is_plugin_enabled(&self, _plugin_id: &str) -> bool {
        true
    }
}

/// Mutable plugin on/off table. Unknown plugins count as enabled.
#[derive(Debug, Default)]
pub struct PluginStates {
    states: DashMap<String, bool>,
}

impl PluginStates {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a plugin's state.
    pub fn set(&self, plugin_id: impl Into<String>, enabled: bool) {
        self.states.insert(plugin_id.into(), enabled);
    }

    /// Forgets a plugin.
    pub fn remove(&self, plugin_id: &str) {
        self.states.remove(plugin_id);
    }
}

impl PluginStatus for PluginStates {
    fn is_plugin_enabled(&self, plugin_id: &str) -> bool {
        self.states.get(plugin_id).map_or(true, |entry| *entry)
    }
}

/// The default [`StageEnablement`]: gathers the three scopes from plugin
/// status, the channel's overrides and the engine configuration, then
/// defers to [`resolve_stage_enabled`].
pub struct ScopedEnablement {
    plugins: Arc<dyn PluginStatus>,
    config: Arc<EngineConfig>,
}

impl ScopedEnablement {
    /// Creates the predicate.
    #[must_use]
    pub fn new(plugins: Arc<dyn PluginStatus>, config: Arc<EngineConfig>) -> Self {
        Self { plugins, config }
    }

    /// Collects the scopes for a stage on a channel.
    #[must_use]
    pub fn scopes(&self, stage: &StageDefinition, channel: &Channel) -> EnablementScopes {
        let group = stage.config_group();
        EnablementScopes {
            plugin_enabled: stage
                .plugin()
                .map_or(true, |plugin| self.plugins.is_plugin_enabled(plugin)),
            channel_override: channel
                .override_enabled(stage.name())
                .or_else(|| group.and_then(|g| channel.override_enabled(g))),
            global: self.config.stage_enabled(stage.name(), group),
        }
    }
}

impl StageEnablement for ScopedEnablement {
    fn is_stage_enabled(&self, stage: &StageDefinition, channel: &Channel) -> bool {
        resolve_stage_enabled(self.scopes(stage, channel))
    }
}

impl std::fmt::Debug for ScopedEnablement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedEnablement")
            .field("configured_stages", &self.config.stages.len())
            .finish()
    }
}
