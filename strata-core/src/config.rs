//! Configuration types

use crate::{ConfigError, OperationKind, OperationTags, StrataResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compaction configuration.
/// ALL values are required - no serde defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// An operation joins the candidate sequence if it carries any of these tags
    pub candidate_tags: OperationTags,
    /// Kinds whose lineage is reported to mapping generation
    pub terminal_kinds: Vec<OperationKind>,
    /// Keep operations outside the candidate scope in place on commit
    pub retain_out_of_scope: bool,
    /// Abandon the candidate if a pass takes longer than this (milliseconds)
    pub time_budget_ms: Option<u64>,
}

impl CompactionConfig {
    /// The settings mapping export uses: modeling and transformation
    /// operations are candidates, semantic type and meta property
    /// assignments are terminal, other worksheets are left alone.
    pub fn standard() -> Self {
        Self {
            candidate_tags: OperationTags::MODELING | OperationTags::TRANSFORMATION,
            terminal_kinds: vec![
                OperationKind::SetSemanticType,
                OperationKind::SetMetaProperty,
            ],
            retain_out_of_scope: true,
            time_budget_ms: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> StrataResult<Self> {
        let config: CompactionConfig =
            toml::from_str(source).map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the time budget, rounded up to whole milliseconds.
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        let millis = budget.as_nanos().div_ceil(1_000_000);
        self.time_budget_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn with_retain_out_of_scope(mut self, retain: bool) -> Self {
        self.retain_out_of_scope = retain;
        self
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    pub fn is_terminal(&self, kind: &OperationKind) -> bool {
        self.terminal_kinds.contains(kind)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - candidate_tags is not empty
    /// - terminal_kinds is not empty
    /// - time_budget_ms, when set, is positive
    pub fn validate(&self) -> StrataResult<()> {
        if self.candidate_tags.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "candidate_tags".to_string(),
                value: format!("{:?}", self.candidate_tags),
                reason: "at least one tag must select candidates".to_string(),
            }
            .into());
        }

        if self.terminal_kinds.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "terminal_kinds".to_string(),
                value: "[]".to_string(),
                reason: "terminal_kinds must not be empty".to_string(),
            }
            .into());
        }

        if self.time_budget_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "time_budget_ms".to_string(),
                value: "0".to_string(),
                reason: "time_budget_ms must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
