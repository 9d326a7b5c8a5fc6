//! Module descriptors and lifecycle states
//!
//! A module is identified by a dotted name: `phase` for a whole phase or
//! `phase.submodule` for a unit inside a phase. A `_legacy` suffix on the last
//! segment marks the old static-access variant of a module that also exists as
//! a dependency-injected implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Suffix that marks a legacy variant of a logical module
pub const LEGACY_SUFFIX: &str = "_legacy";

/// Default load priority (lower loads earlier within a batch)
pub const DEFAULT_LOAD_PRIORITY: i32 = 100;

// ============================================================================
// Module Name
// ============================================================================

/// Parsed module identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName {
    phase: String,
    submodule: Option<String>,
    legacy: bool,
}

impl ModuleName {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        if input.is_empty() {
            return Err(DomainError::parse("Empty module name"));
        }

        let (phase, submodule) = match input.split_once('.') {
            Some((phase, sub)) => (phase, Some(sub)),
            None => (input, None),
        };

        validate_segment(phase, input)?;
        if let Some(sub) = submodule {
            validate_segment(sub, input)?;
        }

        let last = submodule.unwrap_or(phase);
        let legacy = last.len() > LEGACY_SUFFIX.len() && last.ends_with(LEGACY_SUFFIX);

        Ok(Self {
            phase: phase.to_string(),
            submodule: submodule.map(str::to_string),
            legacy,
        })
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Submodule segment with any legacy suffix removed
    pub fn submodule(&self) -> Option<&str> {
        self.submodule.as_deref().map(|sub| {
            if self.legacy {
                &sub[..sub.len() - LEGACY_SUFFIX.len()]
            } else {
                sub
            }
        })
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// True for a bare phase name with no submodule segment
    pub fn is_phase(&self) -> bool {
        self.submodule.is_none()
    }

    /// The name with the legacy suffix stripped. Dependencies and
    /// configuration toggles always refer to logical names.
    pub fn logical_name(&self) -> String {
        let phase = if self.legacy && self.submodule.is_none() {
            &self.phase[..self.phase.len() - LEGACY_SUFFIX.len()]
        } else {
            self.phase.as_str()
        };
        match self.submodule() {
            Some(sub) => format!("{}.{}", phase, sub),
            None => phase.to_string(),
        }
    }
}

fn validate_segment(segment: &str, full: &str) -> Result<(), DomainError> {
    if segment.is_empty() {
        return Err(DomainError::parse(format!(
            "Empty segment in module name '{}'",
            full
        )));
    }
    if !segment
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(DomainError::parse(format!(
            "Invalid module name '{}': segments use [a-z0-9_] and at most one '.'",
            full
        )));
    }
    Ok(())
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.submodule {
            Some(sub) => write!(f, "{}.{}", self.phase, sub),
            None => write!(f, "{}", self.phase),
        }
    }
}

impl FromStr for ModuleName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Sides and Scopes
// ============================================================================

/// Runtime context a module may live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSide {
    /// Loads everywhere
    Common,
    /// Rendering, input and other client-only concerns
    Client,
    /// Dedicated-server-only concerns
    Server,
}

/// Which runtime the loader is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSide {
    Client,
    DedicatedServer,
}

impl ModuleSide {
    pub fn is_available_on(self, runtime: RuntimeSide) -> bool {
        matches!(
            (self, runtime),
            (ModuleSide::Common, _)
                | (ModuleSide::Client, RuntimeSide::Client)
                | (ModuleSide::Server, RuntimeSide::DedicatedServer)
        )
    }
}

/// Lifetime of services a dependency-injected module registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiScope {
    /// Services outlive the module; it unregisters them itself if it wants to
    #[default]
    Singleton,
    /// Services the module registers during initialization are released by
    /// the loader when the module stops
    PerModule,
}

// ============================================================================
// Module Descriptor
// ============================================================================

/// Static metadata about a module, available without constructing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: ModuleName,
    /// Logical names of modules that must be processed first
    pub dependencies: Vec<String>,
    pub load_priority: i32,
    pub supports_hot_reload: bool,
    pub side: ModuleSide,
}

impl ModuleDescriptor {
    pub fn new(name: &str) -> Result<Self, DomainError> {
        Ok(Self {
            name: ModuleName::parse(name)?,
            dependencies: Vec::new(),
            load_priority: DEFAULT_LOAD_PRIORITY,
            supports_hot_reload: false,
            side: ModuleSide::Common,
        })
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.load_priority = priority;
        self
    }

    pub fn with_hot_reload(mut self, supported: bool) -> Self {
        self.supports_hot_reload = supported;
        self
    }

    pub fn with_side(mut self, side: ModuleSide) -> Self {
        self.side = side;
        self
    }

    /// Full registered name, including any legacy suffix
    pub fn id(&self) -> String {
        self.name.to_string()
    }

    pub fn logical_name(&self) -> String {
        self.name.logical_name()
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Per-module lifecycle state.
///
/// `Unloaded -> Initializing -> Active -> ShuttingDown -> Unloaded`, with
/// `Failed` reachable from the two transitional states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unloaded,
    Initializing,
    Active,
    ShuttingDown,
    Failed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unloaded, Initializing)
                | (Initializing, Active)
                | (Initializing, Failed)
                | (Active, ShuttingDown)
                | (ShuttingDown, Unloaded)
                | (ShuttingDown, Failed)
                | (Failed, Unloaded)
        )
    }

    pub fn transition(self, next: LifecycleState) -> Result<LifecycleState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_state_transition(format!(
                "{} -> {}",
                self, next
            )))
        }
    }

    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unloaded => write!(f, "unloaded"),
            LifecycleState::Initializing => write!(f, "initializing"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::ShuttingDown => write!(f, "shutting_down"),
            LifecycleState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phase_name() {
        let name = ModuleName::parse("turtle").unwrap();
        assert!(name.is_phase());
        assert_eq!(name.phase(), "turtle");
        assert_eq!(name.submodule(), None);
        assert!(!name.is_legacy());
    }

    #[test]
    fn test_parse_submodule_name() {
        let name = ModuleName::parse("turtle.entity").unwrap();
        assert_eq!(name.phase(), "turtle");
        assert_eq!(name.submodule(), Some("entity"));
        assert_eq!(name.to_string(), "turtle.entity");
    }

    #[test]
    fn test_legacy_suffix_stripped_from_logical_name() {
        let name = ModuleName::parse("turtle.entity_legacy").unwrap();
        assert!(name.is_legacy());
        assert_eq!(name.submodule(), Some("entity"));
        assert_eq!(name.logical_name(), "turtle.entity");
        assert_eq!(name.to_string(), "turtle.entity_legacy");

        let phase = ModuleName::parse("core_legacy").unwrap();
        assert_eq!(phase.logical_name(), "core");
    }

    #[test]
    fn test_bare_suffix_is_not_legacy() {
        let name = ModuleName::parse("turtle._legacy").unwrap();
        assert!(!name.is_legacy());
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for bad in [
            "", "Turtle", "turtle.", ".entity", "a.b.c", "turtle entity", " turtle", "turtle ",
            "turtle.entity\n",
        ] {
            assert!(ModuleName::parse(bad).is_err(), "'{}' should fail", bad);
        }
    }

    #[test]
    fn test_side_availability() {
        assert!(ModuleSide::Common.is_available_on(RuntimeSide::DedicatedServer));
        assert!(ModuleSide::Client.is_available_on(RuntimeSide::Client));
        assert!(!ModuleSide::Client.is_available_on(RuntimeSide::DedicatedServer));
        assert!(!ModuleSide::Server.is_available_on(RuntimeSide::Client));
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = ModuleDescriptor::new("turtle.spawning")
            .unwrap()
            .with_dependencies(["turtle.entity"])
            .with_priority(20)
            .with_hot_reload(true)
            .with_side(ModuleSide::Server);
        assert_eq!(desc.dependencies, vec!["turtle.entity".to_string()]);
        assert_eq!(desc.load_priority, 20);
        assert!(desc.supports_hot_reload);
        assert_eq!(desc.id(), "turtle.spawning");
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let state = LifecycleState::Unloaded
            .transition(LifecycleState::Initializing)
            .and_then(|s| s.transition(LifecycleState::Active))
            .and_then(|s| s.transition(LifecycleState::ShuttingDown))
            .and_then(|s| s.transition(LifecycleState::Unloaded))
            .unwrap();
        assert_eq!(state, LifecycleState::Unloaded);
    }

    #[test]
    fn test_lifecycle_rejects_skipping_initialization() {
        let err = LifecycleState::Unloaded
            .transition(LifecycleState::Active)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
        assert!(err.to_string().contains("unloaded -> active"));
    }
}
