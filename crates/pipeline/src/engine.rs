//! # Search Engine
//!
//! The job-control surface of the ranking engine. It owns everything that
//! outlives a single search:
//! - the predicate registry
//! - the heavy-predicate cache (reused across searches and relaxation)
//! - the selectivity estimator
//! - at most one in-flight `RankingJob`
//!
//! ## Lifecycle of a search
//! 1. `create_job(config)` validates the snapshot and runs Stage A
//!    synchronously; when it finds no strict candidates, each fallback tier
//!    is tried in order and the first non-empty one wins
//! 2. heavy predicates are handed to the cache
//! 3. the caller drives `step(iterations)` until it returns `true`
//! 4. `results()` holds the ranked items
//!
//! Creating a job drops the previous one. Nothing else refers to it, so a
//! superseded job is never stepped again.

use data_loader::DataSource;
use predicates::{EvalContext, Partition, PredicateRegistry, SearchConfig};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheLookup, PredicateCache};
use crate::error::{EngineError, Result};
use crate::gate::{AggregateGate, Candidate, GateOutput};
use crate::job::{JobId, JobState, JobStats, RankedItem, RankingJob};
use crate::models;
use crate::selectivity::{SelectivityEstimator, SelectivityReport};
use crate::traits::ScoringModel;

pub struct SearchEngine {
    source: Arc<dyn DataSource>,
    registry: PredicateRegistry,
    cache: PredicateCache,
    estimator: SelectivityEstimator,
    job: Option<RankingJob>,
    next_job_id: JobId,
}

impl SearchEngine {
    /// Create an engine over a dataset.
    ///
    /// # Arguments
    /// * `source` - Shared dataset
    /// * `registry` - Every predicate a search may refer to
    pub fn new(source: Arc<dyn DataSource>, registry: PredicateRegistry) -> Self {
        info!(
            items = source.len(),
            predicates = registry.len(),
            generation = source.generation(),
            "Search engine ready"
        );
        Self {
            source,
            registry,
            cache: PredicateCache::new(),
            estimator: SelectivityEstimator::new(),
            job: None,
            next_job_id: 1,
        }
    }

    /// Start a new search, superseding any in-flight job.
    ///
    /// Runs Stage A (and fallback tiers) before returning; Stage B only
    /// advances through `step`.
    ///
    /// # Returns
    /// * `Ok(JobId)` - The new job, possibly already completed with no results
    /// * `Err` - If the snapshot is invalid or the dataset is empty
    #[instrument(skip_all, fields(items = self.source.len()))]
    pub fn create_job(&mut self, config: SearchConfig) -> Result<JobId> {
        config.validate()?;
        if self.source.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        if let Some(previous) = self.job.take() {
            if !previous.is_completed() {
                debug!(job = previous.id(), "Superseding in-flight job");
            }
        }

        let id = self.next_job_id;
        self.next_job_id += 1;

        let (config, fallback_tier, partition, model, gate) = self.run_stage_a(config);
        let source = Arc::clone(&self.source);
        let ctx = EvalContext::new(source.as_ref(), &config);

        let mut cache_hits = 0;
        let mut cache_misses = 0;
        if !gate.is_empty() {
            for resolved in &partition.heavy {
                match self.cache.start_evaluation(&resolved.predicate, &ctx) {
                    CacheLookup::Hit => cache_hits += 1,
                    CacheLookup::Miss => cache_misses += 1,
                }
            }
        }

        info!(
            job = id,
            candidates = gate.candidates.len(),
            near_misses = gate.near_misses.len(),
            heavy = partition.heavy.len(),
            fallback_tier,
            "Created ranking job"
        );

        let mut job = RankingJob::new(id, source, Arc::new(config), &partition, model, gate);
        let stats = job.stats_mut();
        stats.cache_hits = cache_hits;
        stats.cache_misses = cache_misses;
        stats.fallback_tier = fallback_tier;
        self.job = Some(job);
        Ok(id)
    }

    /// Stage A on the primary snapshot, then on each fallback tier until one
    /// yields strict candidates. All empty keeps the primary outcome.
    fn run_stage_a(
        &self,
        config: SearchConfig,
    ) -> (SearchConfig, Option<usize>, Partition, Box<dyn ScoringModel>, GateOutput) {
        let (partition, model, gate) = self.gate(&config);
        if !gate.is_empty() || config.fallbacks.is_empty() {
            return (config, None, partition, model, gate);
        }

        for (tier, fallback) in config.fallback_configs().into_iter().enumerate() {
            let (partition, model, gate) = self.gate(&fallback);
            if !gate.is_empty() {
                info!(tier, candidates = gate.candidates.len(), "Fallback tier produced candidates");
                return (fallback, Some(tier), partition, model, gate);
            }
        }
        warn!(tiers = config.fallbacks.len(), "No fallback tier produced candidates");
        (config, None, partition, model, gate)
    }

    fn gate(&self, config: &SearchConfig) -> (Partition, Box<dyn ScoringModel>, GateOutput) {
        let partition = self.registry.partition(config);
        let model = models::for_params(&config.params, partition.total_counts());
        let ctx = EvalContext::new(self.source.as_ref(), config);
        let gate = AggregateGate::new(&partition, model.as_ref(), config.params.max_candidates).run(&ctx);
        (partition, model, gate)
    }

    /// Advance the current job by one bounded slice of work.
    ///
    /// # Returns
    /// `true` when there is nothing left to do (no job, or job completed)
    pub fn step(&mut self, iterations: usize) -> bool {
        match self.job.as_mut() {
            Some(job) => job.step(&mut self.cache, iterations),
            None => true,
        }
    }

    /// Drive the current job to completion. Intended for tools and tests.
    pub fn run_to_completion(&mut self, iterations: usize) {
        while !self.step(iterations) {}
    }

    /// Completion of the current job in `[0, 1]`; 1.0 with no job.
    pub fn progress(&self) -> f32 {
        self.job
            .as_ref()
            .map_or(1.0, |job| job.progress(&self.cache))
    }

    /// Final results of the current job, `None` while it is still running.
    pub fn results(&self) -> Option<&[RankedItem]> {
        self.job
            .as_ref()
            .filter(|job| job.is_completed())
            .map(|job| job.results())
    }

    pub fn near_misses(&self) -> &[Candidate] {
        match &self.job {
            Some(job) => job.near_misses(),
            None => &[],
        }
    }

    pub fn stats(&self) -> Option<&JobStats> {
        self.job.as_ref().map(|job| job.stats())
    }

    pub fn state(&self) -> Option<JobState> {
        self.job.as_ref().map(|job| job.state())
    }

    pub fn job(&self) -> Option<&RankingJob> {
        self.job.as_ref()
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.job.as_ref().map(|job| job.id())
    }

    /// Abandon the current job.
    pub fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            debug!(job = job.id(), "Cancelled job");
        }
    }

    /// Selectivity estimate for a snapshot's hard constraints.
    pub fn estimate(&mut self, config: &SearchConfig) -> Result<SelectivityReport> {
        config.validate()?;
        let partition = self.registry.partition(config);
        let ctx = EvalContext::new(self.source.as_ref(), config);
        Ok(self.estimator.estimate(&ctx, &partition))
    }

    /// Replace the dataset.
    ///
    /// Cached bitmaps and selectivity counts from other generations are
    /// dropped, and the current job is abandoned.
    pub fn swap_dataset(&mut self, source: Arc<dyn DataSource>) {
        let generation = source.generation();
        if generation == self.source.generation() {
            warn!(generation, "Swapped in a dataset with the same generation");
        }
        self.cancel();
        self.cache.retain_generation(generation);
        self.estimator.invalidate();
        info!(items = source.len(), generation, "Dataset swapped");
        self.source = source;
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &PredicateCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{Dataset, ItemRecord};
    use predicates::builtin::TagPredicate;
    use predicates::{FallbackTier, Importance};

    fn create_test_engine() -> SearchEngine {
        let records = (0..30)
            .map(|i| {
                let mut record = ItemRecord::new(i);
                if i % 2 == 0 {
                    record = record.with_tag("even");
                }
                if i % 7 == 0 {
                    record = record.with_tag("seventh");
                }
                record
            })
            .collect();
        let dataset = Arc::new(Dataset::from_records(records).unwrap());
        let registry = PredicateRegistry::new()
            .with(Arc::new(TagPredicate::new("even", "even")))
            .unwrap()
            .with(Arc::new(TagPredicate::new("seventh", "seventh").heavy()))
            .unwrap()
            .with(Arc::new(TagPredicate::new("missing", "missing")))
            .unwrap();
        SearchEngine::new(dataset, registry)
    }

    #[test]
    fn test_create_and_complete_job() {
        let mut engine = create_test_engine();
        let config = SearchConfig::new()
            .with_importance("even", Importance::MustHave)
            .with_importance("seventh", Importance::Priority);

        engine.create_job(config).unwrap();
        assert!(engine.results().is_none());
        engine.run_to_completion(4);

        let results = engine.results().unwrap();
        assert_eq!(results[0].item, 0);
        assert_eq!(results[1].item, 14);
        assert_eq!(engine.progress(), 1.0);
    }

    #[test]
    fn test_new_job_supersedes_old() {
        let mut engine = create_test_engine();
        let first = engine
            .create_job(SearchConfig::new().with_importance("seventh", Importance::MustHave))
            .unwrap();
        engine.step(1);
        let second = engine
            .create_job(SearchConfig::new().with_importance("even", Importance::MustHave))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.current_job_id(), Some(second));
        engine.run_to_completion(100);
        assert!(engine.results().unwrap().iter().all(|r| r.item % 2 == 0));
    }

    #[test]
    fn test_fallback_tier_used_when_primary_empty() {
        let mut engine = create_test_engine();
        let config = SearchConfig::new()
            .with_importance("missing", Importance::MustHave)
            .with_fallback(FallbackTier {
                importance: [("missing".to_string(), Importance::Preferred)].into(),
                ..FallbackTier::default()
            });

        engine.create_job(config).unwrap();
        engine.run_to_completion(100);
        assert_eq!(engine.stats().unwrap().fallback_tier, Some(0));
        assert!(!engine.results().unwrap().is_empty());
    }

    #[test]
    fn test_empty_results_are_not_an_error() {
        let mut engine = create_test_engine();
        engine
            .create_job(SearchConfig::new().with_importance("missing", Importance::MustHave))
            .unwrap();
        assert!(engine.step(10));
        assert_eq!(engine.results(), Some(&[][..]));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut engine = create_test_engine();
        let mut config = SearchConfig::new();
        config.params.max_results = 0;
        assert!(matches!(engine.create_job(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_swap_dataset_drops_job_and_caches() {
        let mut engine = create_test_engine();
        engine
            .create_job(SearchConfig::new().with_importance("seventh", Importance::MustHave))
            .unwrap();
        engine.run_to_completion(100);
        assert_eq!(engine.cache().len(), 1);

        let replacement = Arc::new(Dataset::from_records((0..5).map(ItemRecord::new).collect()).unwrap());
        engine.swap_dataset(replacement);
        assert!(engine.job().is_none());
        assert!(engine.cache().is_empty());
        assert_eq!(engine.source().len(), 5);
    }
}
