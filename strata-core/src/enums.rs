//! Enum and flag types for STRATA records

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COLUMN KIND
// ============================================================================

/// Classification of a schema column for provenance reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Genuine column, visible to the user or produced by an import
    Regular,
    /// Synthesized by a transformation, not meaningful as a source on its own
    Derived,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Regular => "Regular",
            ColumnKind::Derived => "Derived",
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, ColumnKind::Regular)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = ColumnKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(ColumnKind::Regular),
            "derived" => Ok(ColumnKind::Derived),
            _ => Err(ColumnKindParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid column kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKindParseError(pub String);

impl fmt::Display for ColumnKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid column kind: {}", self.0)
    }
}

impl std::error::Error for ColumnKindParseError {}

// ============================================================================
// OPERATION KIND
// ============================================================================

/// Kind of a recorded transformation.
///
/// Kinds outside the built-in set are kept verbatim in `Custom` so a history
/// recorded by a newer front end still round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    ImportColumn,
    Fold,
    Glue,
    GroupBy,
    SubmitTransform,
    /// Amends an earlier `SubmitTransform` on the same output columns
    SubmitEditTransform,
    SetSemanticType,
    SetMetaProperty,
    Custom(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::ImportColumn => "ImportColumn",
            OperationKind::Fold => "Fold",
            OperationKind::Glue => "Glue",
            OperationKind::GroupBy => "GroupBy",
            OperationKind::SubmitTransform => "SubmitTransform",
            OperationKind::SubmitEditTransform => "SubmitEditTransform",
            OperationKind::SetSemanticType => "SetSemanticType",
            OperationKind::SetMetaProperty => "SetMetaProperty",
            OperationKind::Custom(name) => name,
        }
    }

    /// Whether this kind amends an earlier operation instead of standing alone.
    pub fn is_edit(&self) -> bool {
        self.edit_base().is_some()
    }

    /// The kind an edit of this kind folds into, if it is an edit.
    pub fn edit_base(&self) -> Option<OperationKind> {
        match self {
            OperationKind::SubmitEditTransform => Some(OperationKind::SubmitTransform),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for OperationKind {
    fn from(s: &str) -> Self {
        match s {
            "ImportColumn" => OperationKind::ImportColumn,
            "Fold" => OperationKind::Fold,
            "Glue" => OperationKind::Glue,
            "GroupBy" => OperationKind::GroupBy,
            "SubmitTransform" => OperationKind::SubmitTransform,
            "SubmitEditTransform" => OperationKind::SubmitEditTransform,
            "SetSemanticType" => OperationKind::SetSemanticType,
            "SetMetaProperty" => OperationKind::SetMetaProperty,
            other => OperationKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for OperationKind {
    fn from(s: String) -> Self {
        OperationKind::from(s.as_str())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_string()
    }
}

// ============================================================================
// OPERATION TAGS
// ============================================================================

bitflags! {
    /// Tags recorded with an operation, used to pick compaction candidates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct OperationTags: u8 {
        /// Changes the semantic model (types, properties, links)
        const MODELING = 0b0000_0001;
        /// Rewrites worksheet data or structure
        const TRANSFORMATION = 0b0000_0010;
        /// Row selection / filtering
        const SELECTION = 0b0000_0100;
        /// Brings source data into the worksheet
        const IMPORT = 0b0000_1000;
        /// Worksheet metadata only
        const METADATA = 0b0001_0000;
    }
}

impl Default for OperationTags {
    fn default() -> Self {
        Self::empty()
    }
}
