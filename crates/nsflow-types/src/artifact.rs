use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ClientError;

/// Selects among the artifacts cached for one subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Static,
    #[default]
    Dynamic,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Static => "static",
            Variant::Dynamic => "dynamic",
        }
    }

    pub fn all() -> &'static [Variant] {
        &[Variant::Static, Variant::Dynamic]
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Variant::Static),
            "dynamic" => Ok(Variant::Dynamic),
            other => Err(ClientError::Config(format!("unknown variant: {}", other))),
        }
    }
}

/// What the persistence collaborator holds for one subject.
/// A `null` slot is the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default, alias = "static", skip_serializing_if = "Option::is_none")]
    pub static_theme: Option<Value>,
    #[serde(default, alias = "dynamic", skip_serializing_if = "Option::is_none")]
    pub dynamic_theme: Option<Value>,
}

impl ArtifactRecord {
    pub fn slot(&self, variant: Variant) -> Option<&Value> {
        let slot = match variant {
            Variant::Static => self.static_theme.as_ref(),
            Variant::Dynamic => self.dynamic_theme.as_ref(),
        };
        slot.filter(|v| !v.is_null())
    }

    pub fn set_slot(&mut self, variant: Variant, value: Value) {
        match variant {
            Variant::Static => self.static_theme = Some(value),
            Variant::Dynamic => self.dynamic_theme = Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub subject: String,
    pub variant: Variant,
}

impl ArtifactKey {
    pub fn new(subject: impl Into<String>, variant: Variant) -> Self {
        Self {
            subject: subject.into(),
            variant,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.variant)
    }
}

/// Where a returned artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSource {
    Cache,
    /// Freshly generated; `persisted` is false when the store write failed
    Generated { persisted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub subject: String,
    pub variant: Variant,
    pub value: Value,
    pub source: ArtifactSource,
}

impl GeneratedArtifact {
    /// The artifact's `type` discriminant.
    pub fn artifact_type(&self) -> Option<&str> {
        self.value.get("type").and_then(Value::as_str)
    }
}

/// Lifecycle of one `(subject, variant)` slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Uncached,
    Generating,
    Refreshing,
    Cached,
    /// Last call failed; earlier cached values stay valid in the store
    Failed,
}
