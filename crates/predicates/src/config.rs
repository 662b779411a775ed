//! Immutable configuration snapshot for one search.
//!
//! A snapshot maps predicate ids (or group + member keys) to importance and
//! carries the global engine parameters. Snapshots are read from TOML:
//!
//! ```toml
//! [params]
//! max_results = 10
//! scoring_model = "continuous"
//!
//! [importance]
//! river = "must_have"
//!
//! [ranges.temperature]
//! min = 10.0
//! max = 25.0
//!
//! [groups.biome]
//! operator = "any"
//! members = { Forest = "must_have", Desert = "must_not_have" }
//!
//! [[fallback]]
//! importance = { river = "priority" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::types::Importance;

/// Which scoring model combines per-category values into the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringModelKind {
    /// k-of-n hard matches mixed with soft match fractions by κ
    #[default]
    Binary,
    /// Fuzzy membership with a penalty curve on the worst MustHave
    Continuous,
}

/// Global engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Initial fraction of MustHave predicates a result must hard-match
    pub strictness: f32,
    /// Size of the top-N result set
    pub max_results: usize,
    /// Stage A keeps at most this many strict candidates
    pub max_candidates: usize,
    pub scoring_model: ScoringModelKind,
    /// Range membership decays to 0 over this fraction of the range width
    pub membership_margin: f32,
    pub penalty_alpha: f32,
    pub penalty_gamma: f32,
    /// Items per heavy-predicate evaluation window
    pub chunk_size: usize,
    /// Time a single precompute step may spend; 0 means one window per step
    pub heavy_budget_ms: u64,
    pub priority_weight: f32,
    pub preferred_weight: f32,
    /// Fraction of the continuous score reserved for the auxiliary column
    pub auxiliary_share: f32,
    /// Numeric column in `[0,1]` used as the auxiliary score
    pub auxiliary_column: Option<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            strictness: 1.0,
            max_results: 25,
            max_candidates: 5000,
            scoring_model: ScoringModelKind::Binary,
            membership_margin: 0.3,
            penalty_alpha: 0.1,
            penalty_gamma: 2.0,
            chunk_size: 4096,
            heavy_budget_ms: 0,
            priority_weight: 1.0,
            preferred_weight: 1.0,
            auxiliary_share: 0.1,
            auxiliary_column: None,
        }
    }
}

/// Acceptable numeric range for a range predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub min: f32,
    pub max: f32,
}

impl RangeSpec {
    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// How the selected members of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupOperator {
    /// Item matches if it has any selected member
    #[default]
    Any,
    /// Item matches only if it has every selected member
    All,
}

/// Multi-value predicate configuration: each member has its own importance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSpec {
    pub operator: GroupOperator,
    pub members: BTreeMap<String, Importance>,
}

impl GroupSpec {
    /// Group importance: the strongest member importance.
    pub fn importance(&self) -> Importance {
        Importance::strongest(self.members.values().copied())
    }

    /// Members configured at the group's resolved importance, sorted.
    pub fn selected_members(&self) -> Vec<&str> {
        let importance = self.importance();
        if importance == Importance::Ignored {
            return Vec::new();
        }
        self.members
            .iter()
            .filter(|(_, member_importance)| **member_importance == importance)
            .map(|(member, _)| member.as_str())
            .collect()
    }

    /// MustNotHave members of a MustHave group, sorted.
    ///
    /// They veto the group match: an item carrying any of them fails the
    /// group even when it has the selected members.
    pub fn excluded_members(&self) -> Vec<&str> {
        if self.importance() != Importance::MustHave {
            return Vec::new();
        }
        self.members
            .iter()
            .filter(|(_, member_importance)| **member_importance == Importance::MustNotHave)
            .map(|(member, _)| member.as_str())
            .collect()
    }
}

/// Overrides applied on top of the primary snapshot when Stage A finds nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackTier {
    pub importance: BTreeMap<String, Importance>,
    pub groups: BTreeMap<String, GroupSpec>,
    pub ranges: BTreeMap<String, RangeSpec>,
    pub params: Option<SearchParams>,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub params: SearchParams,
    pub importance: BTreeMap<String, Importance>,
    pub groups: BTreeMap<String, GroupSpec>,
    pub ranges: BTreeMap<String, RangeSpec>,
    #[serde(rename = "fallback")]
    pub fallbacks: Vec<FallbackTier>,
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SearchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    // Builder helpers

    pub fn with_importance(mut self, id: impl Into<String>, importance: Importance) -> Self {
        self.importance.insert(id.into(), importance);
        self
    }

    pub fn with_range(mut self, id: impl Into<String>, min: f32, max: f32) -> Self {
        self.ranges.insert(id.into(), RangeSpec { min, max });
        self
    }

    pub fn with_group_member(
        mut self,
        group: impl Into<String>,
        member: impl Into<String>,
        importance: Importance,
    ) -> Self {
        self.groups
            .entry(group.into())
            .or_default()
            .members
            .insert(member.into(), importance);
        self
    }

    pub fn with_group_operator(mut self, group: impl Into<String>, operator: GroupOperator) -> Self {
        self.groups.entry(group.into()).or_default().operator = operator;
        self
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_fallback(mut self, tier: FallbackTier) -> Self {
        self.fallbacks.push(tier);
        self
    }

    /// Importance configured for a plain predicate id (`Ignored` if absent)
    pub fn importance_of(&self, id: &str) -> Importance {
        self.importance.get(id).copied().unwrap_or_default()
    }

    pub fn group(&self, id: &str) -> Option<&GroupSpec> {
        self.groups.get(id)
    }

    pub fn range(&self, id: &str) -> Option<&RangeSpec> {
        self.ranges.get(id)
    }

    /// Fallback snapshots in order, each the primary with one tier's overrides applied.
    pub fn fallback_configs(&self) -> Vec<SearchConfig> {
        self.fallbacks
            .iter()
            .map(|tier| {
                let mut config = self.clone();
                config.fallbacks.clear();
                config
                    .importance
                    .extend(tier.importance.iter().map(|(k, v)| (k.clone(), *v)));
                config
                    .groups
                    .extend(tier.groups.iter().map(|(k, v)| (k.clone(), v.clone())));
                config
                    .ranges
                    .extend(tier.ranges.iter().map(|(k, v)| (k.clone(), *v)));
                if let Some(params) = &tier.params {
                    config.params = params.clone();
                }
                config
            })
            .collect()
    }

    /// Reject parameter values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        if !(p.strictness > 0.0 && p.strictness <= 1.0) {
            return Err(invalid("strictness", format!("{} is outside (0, 1]", p.strictness)));
        }
        if p.max_results == 0 {
            return Err(invalid("max_results", "must be at least 1".to_string()));
        }
        if p.max_candidates == 0 {
            return Err(invalid("max_candidates", "must be at least 1".to_string()));
        }
        if p.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&p.penalty_alpha) {
            return Err(invalid("penalty_alpha", format!("{} is outside [0, 1]", p.penalty_alpha)));
        }
        if !(p.penalty_gamma > 0.0) {
            return Err(invalid("penalty_gamma", format!("{} must be positive", p.penalty_gamma)));
        }
        if !(p.membership_margin >= 0.0) {
            return Err(invalid(
                "membership_margin",
                format!("{} must not be negative", p.membership_margin),
            ));
        }
        if !(0.0..1.0).contains(&p.auxiliary_share) {
            return Err(invalid(
                "auxiliary_share",
                format!("{} is outside [0, 1)", p.auxiliary_share),
            ));
        }
        if p.priority_weight < 0.0 || p.preferred_weight < 0.0 {
            return Err(invalid("tier weights", "must not be negative".to_string()));
        }
        for (id, range) in &self.ranges {
            if !(range.min <= range.max) {
                return Err(ConfigError::InvalidPredicate {
                    id: id.clone(),
                    reason: format!("range min {} is above max {}", range.min, range.max),
                });
            }
        }
        for config in self.fallback_configs() {
            config.validate()?;
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidParameter { name, reason }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable FNV-1a hash over a predicate's configuration-relevant parameters.
///
/// Callers feed the parts that affect the predicate's match bitmap; two
/// snapshots that agree on those parts produce the same fingerprint, in any
/// process.
pub struct Fingerprint {
    hash: u64,
}

impl Fingerprint {
    pub fn new(id: &str) -> Self {
        let mut fingerprint = Self {
            hash: FNV_OFFSET_BASIS,
        };
        fingerprint.write(id.as_bytes());
        fingerprint
    }

    /// Length-prefixed, so adjacent strings can't run together
    pub fn str(mut self, value: &str) -> Self {
        self.write(&(value.len() as u64).to_le_bytes());
        self.write(value.as_bytes());
        self
    }

    pub fn f32(mut self, value: f32) -> Self {
        self.write(&value.to_bits().to_le_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.write(&value.to_le_bytes());
        self
    }

    pub fn finish(self) -> u64 {
        self.hash
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.hash ^= u64::from(*byte);
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }
}
