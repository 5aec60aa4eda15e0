use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::recovery::{RecoveryStrategy, SelectionCriteria};

/// Top-level configuration: store capacities plus recovery defaults.
///
/// ```toml
/// [store]
/// max_processes = 128
///
/// [recovery]
/// strategy = "terminate_lowest"
/// selection = "minimum_cost"
/// critical_priority_threshold = 95
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default = "default_max_resources")]
    pub max_resources: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            max_resources: default_max_resources(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_strategy")]
    pub strategy: RecoveryStrategy,
    #[serde(default = "default_selection")]
    pub selection: SelectionCriteria,
    /// Cap on processes terminated by one recovery call; 0 is unlimited.
    #[serde(default)]
    pub max_terminations: u32,
    /// Bound for iterative termination; 0 is unbounded.
    #[serde(default)]
    pub max_iterations: u32,
    /// Skip processes at or above the critical threshold when choosing
    /// victims, unless every candidate is critical.
    #[serde(default = "default_true")]
    pub preserve_critical: bool,
    #[serde(default = "default_critical_priority_threshold")]
    pub critical_priority_threshold: i32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            selection: default_selection(),
            max_terminations: 0,
            max_iterations: 0,
            preserve_critical: default_true(),
            critical_priority_threshold: default_critical_priority_threshold(),
        }
    }
}

/// Load configuration from a TOML file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<CoreConfig> {
    if !path.exists() {
        return Ok(CoreConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse configuration from TOML text.
///
/// # Errors
///
/// Returns an error on invalid TOML, unknown enum values or zero store
/// capacities. The outermost context names [`ErrorCode::ConfigParseError`].
pub fn parse_config(content: &str) -> Result<CoreConfig> {
    let code = ErrorCode::ConfigParseError;
    let config = toml::from_str::<CoreConfig>(content)
        .with_context(|| format!("{code}: {}", code.message()))?;
    if config.store.max_processes == 0 || config.store.max_resources == 0 {
        anyhow::bail!("{code}: store capacities must be positive");
    }
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_max_processes() -> usize {
    64
}

const fn default_max_resources() -> usize {
    64
}

const fn default_strategy() -> RecoveryStrategy {
    RecoveryStrategy::TerminateLowest
}

const fn default_selection() -> SelectionCriteria {
    SelectionCriteria::LowestPriority
}

const fn default_critical_priority_threshold() -> i32 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_config(&dir.path().join("deadlock.toml")).expect("load should succeed");
        assert_eq!(cfg.store.max_processes, 64);
        assert_eq!(cfg.store.max_resources, 64);
        assert_eq!(cfg.recovery.strategy, RecoveryStrategy::TerminateLowest);
        assert_eq!(cfg.recovery.selection, SelectionCriteria::LowestPriority);
        assert!(cfg.recovery.preserve_critical);
        assert_eq!(cfg.recovery.critical_priority_threshold, 90);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg = parse_config(
            r#"
[store]
max_processes = 8

[recovery]
strategy = "preempt_resources"
selection = "minimum_cost"
max_iterations = 5
"#,
        )
        .expect("parse");

        assert_eq!(cfg.store.max_processes, 8);
        assert_eq!(cfg.store.max_resources, 64);
        assert_eq!(cfg.recovery.strategy, RecoveryStrategy::PreemptResources);
        assert_eq!(cfg.recovery.selection, SelectionCriteria::MinimumCost);
        assert_eq!(cfg.recovery.max_iterations, 5);
        assert!(cfg.recovery.preserve_critical);
    }

    #[test]
    fn config_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let path = dir.path().join("deadlock.toml");
        std::fs::write(&path, "[recovery]\npreserve_critical = false\n").expect("write config");

        let cfg = load_config(&path).expect("load");
        assert!(!cfg.recovery.preserve_critical);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = parse_config("[recovery]\nstrategy = \"pray\"\n").expect_err("bad enum");
        assert!(err.to_string().starts_with("E4001"), "{err}");
        assert!(format!("{err:#}").contains("unknown variant"), "{err:#}");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = parse_config("[store]\nmax_resources = 0\n").expect_err("zero");
        assert!(err.to_string().starts_with("E4001"), "{err}");
    }

    #[test]
    fn malformed_file_keeps_parse_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("deadlock.toml");
        std::fs::write(&path, "[recovery\n").expect("write config");

        let err = load_config(&path).expect_err("malformed");
        assert!(err.chain().any(|cause| cause.to_string().starts_with("E4001")), "{err:#}");
    }
}
