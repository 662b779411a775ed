//! Predicate registry: holds predicates and partitions them per configuration.

use std::sync::Arc;
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::{ConfigError, Result};
use crate::traits::Predicate;
use crate::types::{Heaviness, Importance, TierCounts};

/// A predicate paired with the importance it resolved to for one snapshot.
#[derive(Clone)]
pub struct ResolvedPredicate {
    pub predicate: Arc<dyn Predicate>,
    pub importance: Importance,
}

impl ResolvedPredicate {
    pub fn id(&self) -> &str {
        self.predicate.id()
    }

    pub fn heaviness(&self) -> Heaviness {
        self.predicate.heaviness()
    }
}

impl std::fmt::Debug for ResolvedPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPredicate")
            .field("id", &self.id())
            .field("heaviness", &self.heaviness())
            .field("importance", &self.importance)
            .finish()
    }
}

/// Active predicates for one snapshot, split by cost tier.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub cheap: Vec<ResolvedPredicate>,
    pub heavy: Vec<ResolvedPredicate>,
}

impl Partition {
    pub fn cheap_counts(&self) -> TierCounts {
        count_tiers(&self.cheap)
    }

    pub fn heavy_counts(&self) -> TierCounts {
        count_tiers(&self.heavy)
    }

    pub fn total_counts(&self) -> TierCounts {
        self.cheap_counts().combined(&self.heavy_counts())
    }

    pub fn is_empty(&self) -> bool {
        self.cheap.is_empty() && self.heavy.is_empty()
    }

    /// All active predicates, cheap first
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPredicate> {
        self.cheap.iter().chain(self.heavy.iter())
    }
}

fn count_tiers(predicates: &[ResolvedPredicate]) -> TierCounts {
    let mut counts = TierCounts::default();
    for predicate in predicates {
        counts.add(predicate.importance);
    }
    counts
}

/// Holds registered predicates, cheap before heavy.
#[derive(Default, Clone)]
pub struct PredicateRegistry {
    predicates: Vec<Arc<dyn Predicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a predicate, keeping cheap predicates ahead of heavy ones.
    ///
    /// Registration order is preserved within each tier.
    pub fn register(&mut self, predicate: Arc<dyn Predicate>) -> Result<()> {
        if self.get(predicate.id()).is_some() {
            return Err(ConfigError::DuplicatePredicate(predicate.id().to_string()));
        }
        let position = match predicate.heaviness() {
            Heaviness::Cheap => self
                .predicates
                .iter()
                .position(|p| p.heaviness() == Heaviness::Heavy)
                .unwrap_or(self.predicates.len()),
            Heaviness::Heavy => self.predicates.len(),
        };
        debug!(id = predicate.id(), ?position, "Registered predicate");
        self.predicates.insert(position, predicate);
        Ok(())
    }

    /// Builder-style registration (duplicates are rejected the same way)
    pub fn with(mut self, predicate: Arc<dyn Predicate>) -> Result<Self> {
        self.register(predicate)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Predicate>> {
        self.predicates.iter().find(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(|p| p.id())
    }

    /// Resolve every predicate against `config` and drop the ignored ones.
    ///
    /// Pure in `config`: fallback tiers call this repeatedly and rely on the
    /// same snapshot always producing the same partition.
    pub fn partition(&self, config: &SearchConfig) -> Partition {
        let mut partition = Partition::default();
        for predicate in &self.predicates {
            let importance = predicate.importance(config);
            if importance == Importance::Ignored {
                continue;
            }
            let resolved = ResolvedPredicate {
                predicate: Arc::clone(predicate),
                importance,
            };
            match predicate.heaviness() {
                Heaviness::Cheap => partition.cheap.push(resolved),
                Heaviness::Heavy => partition.heavy.push(resolved),
            }
        }
        partition
    }
}
