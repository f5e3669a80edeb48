//! Core domain types shared across the crawler workspace: person
//! identifiers, the color/gender convention, relationship types, and the
//! `Individual` vertex shape.

use std::fmt;
use std::sync::OnceLock;

use fstree_error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{3}$").expect("valid regex"))
}

/// An opaque FamilySearch person or relationship identifier, validated
/// against `[A-Z0-9]{4}-[A-Z0-9]{3}` at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsId(String);

impl FsId {
    /// Validates `raw` against the identifier pattern.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if id_pattern().is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(Error::decode_invariant(format!(
                "identifier {raw:?} does not match [A-Z0-9]{{4}}-[A-Z0-9]{{3}}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FsId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The signed color convention: `Male = -1`, `Unknown = 0`, `Female = 1`.
///
/// This supersedes the historical `1`/`2` convention found in raw
/// `http://gedcomx.org/Male` / `.../Female` URIs off the wire; that form is
/// translated into this one at decode time and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum Color {
    Male = -1,
    Unknown = 0,
    Female = 1,
}

impl Color {
    pub fn from_gender_uri(uri: Option<&str>) -> Self {
        match uri {
            Some("http://gedcomx.org/Male") => Self::Male,
            Some("http://gedcomx.org/Female") => Self::Female,
            _ => Self::Unknown,
        }
    }

    pub fn as_i8(self) -> i8 {
        self as i8
    }

    pub fn from_i8(value: i8) -> Self {
        match value {
            -1 => Self::Male,
            1 => Self::Female,
            _ => Self::Unknown,
        }
    }
}

/// A resolved person vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub id: FsId,
    pub color: Color,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub iteration: u32,
    pub lifespan: Option<String>,
}

/// The closed set of parent-child edge types.
///
/// `UntypedParent` is the initial state every discovered edge starts in.
/// `AssumedBiological` and `Resolve` are resolution-engine tags; every
/// other variant is a concrete type a follow-up fact fetch can resolve to.
/// A concrete type is never downgraded back to `UntypedParent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    UntypedParent,
    AssumedBiological,
    Resolve,
    UnspecifiedParentType,
    UntypedCouple,
    AdoptiveParent,
    BiologicalParent,
    FosterParent,
    GuardianParent,
    StepParent,
    SociologicalParent,
    SurrogateParent,
}

impl RelationshipType {
    /// True once a type is considered "concrete" and therefore must never
    /// be overwritten by a coarser tag.
    pub fn is_concrete(self) -> bool {
        !matches!(self, Self::UntypedParent | Self::AssumedBiological | Self::Resolve)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UntypedParent => "UntypedParent",
            Self::AssumedBiological => "AssumedBiological",
            Self::Resolve => "Resolve",
            Self::UnspecifiedParentType => "UnspecifiedParentType",
            Self::UntypedCouple => "UntypedCouple",
            Self::AdoptiveParent => "AdoptiveParent",
            Self::BiologicalParent => "BiologicalParent",
            Self::FosterParent => "FosterParent",
            Self::GuardianParent => "GuardianParent",
            Self::StepParent => "StepParent",
            Self::SociologicalParent => "SociologicalParent",
            Self::SurrogateParent => "SurrogateParent",
        }
    }

    pub fn from_fact_type_uri(uri: &str) -> Option<Self> {
        let tag = uri.rsplit('/').next().unwrap_or(uri);
        Self::from_str(tag)
    }

    pub fn from_str(tag: &str) -> Option<Self> {
        Some(match tag {
            "UntypedParent" => Self::UntypedParent,
            "AssumedBiological" => Self::AssumedBiological,
            "Resolve" => Self::Resolve,
            "UnspecifiedParentType" | "UnspecifiedParent" => Self::UnspecifiedParentType,
            "UntypedCouple" => Self::UntypedCouple,
            "AdoptiveParent" => Self::AdoptiveParent,
            "BiologicalParent" => Self::BiologicalParent,
            "FosterParent" => Self::FosterParent,
            "GuardianParent" => Self::GuardianParent,
            "StepParent" => Self::StepParent,
            "SociologicalParent" => Self::SociologicalParent,
            "SurrogateParent" => Self::SurrogateParent,
            _ => return None,
        })
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed parent-child edge: `child` points at `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub child: FsId,
    pub parent: FsId,
    pub rel_type: RelationshipType,
    pub rel_id: FsId,
}

/// Tunables governing the crawl's request volume, mirroring the original
/// crawler's `ThrottleConfig` defaults exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub person_batch_size: usize,
    pub max_concurrent_person_requests: usize,
    pub max_concurrent_relationship_requests: usize,
    pub delay_between_person_batches: f64,
    pub delay_between_relationship_batches: f64,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub backoff_base_seconds: f64,
    pub backoff_multiplier: f64,
    pub backoff_max_seconds: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            person_batch_size: 200,
            max_concurrent_person_requests: 40,
            max_concurrent_relationship_requests: 200,
            delay_between_person_batches: 2.0,
            delay_between_relationship_batches: 2.0,
            requests_per_second: 6.0,
            max_retries: 5,
            backoff_base_seconds: 1.0,
            backoff_multiplier: 2.0,
            backoff_max_seconds: 60.0,
        }
    }
}

/// Checkpoints are written after this many completed rows since the last
/// one, instead of sleeping the inter-row delay.
pub const PARTIAL_WRITE_THRESHOLD: u32 = 20;
