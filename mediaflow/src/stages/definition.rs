//! Stage definitions.

use super::Stage;
use crate::core::Phase;
use crate::errors::RegistryError;
use std::fmt;
use std::sync::Arc;

/// A stage as registered: its name, phase, ownership and ordering hints.
///
/// Immutable once registered and identified by name.
#[derive(Clone)]
pub struct StageDefinition {
    name: String,
    phase: Phase,
    config_group: Option<String>,
    plugin: Option<String>,
    run_after: Vec<String>,
    run_before: Vec<String>,
    stage: Arc<dyn Stage>,
}

impl StageDefinition {
    /// Creates a definition.
    pub fn new(name: impl Into<String>, phase: Phase, stage: impl Stage + 'static) -> Self {
        Self::from_arc(name, phase, Arc::new(stage))
    }

    /// Creates a definition around a shared stage.
    pub fn from_arc(name: impl Into<String>, phase: Phase, stage: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            phase,
            config_group: None,
            plugin: None,
            run_after: Vec::new(),
            run_before: Vec::new(),
            stage,
        }
    }

    /// Sets the config group used for enablement and configuration lookups.
    #[must_use]
    pub fn with_config_group(mut self, group: impl Into<String>) -> Self {
        self.config_group = Some(group.into());
        self
    }

    /// Sets the owning plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Requests that this stage run after `other` when both share a phase.
    #[must_use]
    pub fn run_after(mut self, other: impl Into<String>) -> Self {
        self.run_after.push(other.into());
        self
    }

    /// Requests that this stage run before `other` when both share a phase.
    #[must_use]
    pub fn run_before(mut self, other: impl Into<String>) -> Self {
        self.run_before.push(other.into());
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the config group.
    #[must_use]
    pub fn config_group(&self) -> Option<&str> {
        self.config_group.as_deref()
    }

    /// Returns the owning plugin.
    #[must_use]
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Returns the `run_after` hints.
    #[must_use]
    pub fn after(&self) -> &[String] {
        &self.run_after
    }

    /// Returns the `run_before` hints.
    #[must_use]
    pub fn before(&self) -> &[String] {
        &self.run_before
    }

    /// Returns the stage implementation.
    #[must_use]
    pub fn stage(&self) -> &Arc<dyn Stage> {
        &self.stage
    }

    /// Validates the definition on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage hints against itself.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let hints_self = self
            .run_after
            .iter()
            .chain(&self.run_before)
            .any(|other| other == &self.name);
        if hints_self {
            return Err(RegistryError::SelfReference {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("config_group", &self.config_group)
            .field("plugin", &self.plugin)
            .field("run_after", &self.run_after)
            .field("run_before", &self.run_before)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    #[test]
    fn test_definition_builder() {
        let def = StageDefinition::new("billing-hold", Phase::PreRequest, NoOpStage)
            .with_config_group("billing")
            .with_plugin("billing-plugin")
            .run_after("preset")
            .run_before("request");

        assert_eq!(def.name(), "billing-hold");
        assert_eq!(def.phase(), Phase::PreRequest);
        assert_eq!(def.config_group(), Some("billing"));
        assert_eq!(def.plugin(), Some("billing-plugin"));
        assert_eq!(def.after().to_vec(), vec!["preset".to_string()]);
        assert_eq!(def.before().to_vec(), vec!["request".to_string()]);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_self_hint_rejected() {
        let def = StageDefinition::new("a", Phase::Prepare, NoOpStage).run_after("a");
        assert!(matches!(def.validate(), Err(RegistryError::SelfReference { .. })));
    }
}
