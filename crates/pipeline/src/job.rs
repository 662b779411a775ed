//! Stage B: the resumable ranking job.
//!
//! A job walks the Stage A candidates best-first and keeps a bounded top-N.
//! It never runs to completion on its own: the owner calls `step` with a
//! work budget until it reports completion.
//!
//! ## States
//! ```text
//! Precomputing -> Evaluating -> (RelaxAndRetry -> Evaluating) -> Completed
//! ```
//! - **Precomputing**: advance the heavy-predicate cache
//! - **Evaluating**: score up to `iterations` candidates per step, pruning
//!   once the heap is full and the next upper bound cannot beat its minimum
//! - **RelaxAndRetry**: nothing passed at full strictness; lower it to
//!   (C−1)/C once and walk the candidates again, keeping the cache
//! - **Completed**: results sorted descending

use data_loader::{DataSource, ItemId};
use predicates::{EvalContext, Importance, Partition, ResolvedPredicate, SearchConfig, TierCounts};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::cache::PredicateCache;
use crate::gate::{Candidate, GateOutput};
use crate::traits::{ScoreBreakdown, ScoringModel};

/// Identifier of a job within one engine
pub type JobId = u64;

/// Hard-match fractions within this distance of the strictness still pass.
const STRICTNESS_EPSILON: f32 = 1e-6;

/// Share of the progress bar given to the first evaluation pass.
const FIRST_PASS_SHARE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Precomputing,
    Evaluating,
    RelaxAndRetry,
    Completed,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub item: ItemId,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

/// Heap order: higher score is better, lower item index wins ties.
#[derive(Debug, Clone)]
struct Ranked(RankedItem);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.item.cmp(&self.0.item))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// Diagnostic counters for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    /// Time spent inside `step`
    pub elapsed: Duration,
    pub steps: u64,
    /// Items scanned by Stage A
    pub scanned: usize,
    /// Candidates Stage A handed over
    pub candidates: usize,
    /// Candidates scored in Stage B (both passes)
    pub candidates_processed: usize,
    /// Candidates skipped by the upper-bound test
    pub pruned: usize,
    /// Scored candidates that matched a heavy MustNotHave
    pub excluded: usize,
    /// Scored candidates below the strictness threshold
    pub below_strictness: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub relaxations: u32,
    /// Index of the fallback tier that produced the candidates, if any
    pub fallback_tier: Option<usize>,
}

/// Resumable Stage B state for one search.
pub struct RankingJob {
    id: JobId,
    source: Arc<dyn DataSource>,
    config: Arc<SearchConfig>,
    heavy: Vec<ResolvedPredicate>,
    totals: TierCounts,
    model: Box<dyn ScoringModel>,
    candidates: Vec<Candidate>,
    near_misses: Vec<Candidate>,
    heap: BinaryHeap<Reverse<Ranked>>,
    cursor: usize,
    strictness: f32,
    relaxed: bool,
    state: JobState,
    results: Vec<RankedItem>,
    stats: JobStats,
}

impl RankingJob {
    /// Create a job from a finished gate pass.
    ///
    /// The heavy predicates in `partition` must already have been handed to
    /// the cache with `start_evaluation`.
    ///
    /// # Arguments
    /// * `id` - Job identifier
    /// * `source` - The dataset the gate ran over
    /// * `config` - The snapshot the gate ran with (primary or fallback)
    /// * `partition` - Active predicates under `config`
    /// * `model` - The model the gate computed bounds with
    /// * `gate` - Stage A output
    pub fn new(
        id: JobId,
        source: Arc<dyn DataSource>,
        config: Arc<SearchConfig>,
        partition: &Partition,
        model: Box<dyn ScoringModel>,
        gate: GateOutput,
    ) -> Self {
        let state = if gate.candidates.is_empty() {
            JobState::Completed
        } else if partition.heavy.is_empty() {
            JobState::Evaluating
        } else {
            JobState::Precomputing
        };
        let stats = JobStats {
            scanned: gate.scanned,
            candidates: gate.candidates.len(),
            ..JobStats::default()
        };
        Self {
            id,
            source,
            strictness: config.params.strictness,
            config,
            heavy: partition.heavy.clone(),
            totals: partition.total_counts(),
            model,
            candidates: gate.candidates,
            near_misses: gate.near_misses,
            heap: BinaryHeap::new(),
            cursor: 0,
            relaxed: false,
            state,
            results: Vec::new(),
            stats,
        }
    }

    /// Advance the job by one bounded slice of work.
    ///
    /// # Arguments
    /// * `cache` - The engine's heavy-predicate cache
    /// * `iterations` - Maximum candidates to walk in an evaluating step
    ///
    /// # Returns
    /// `true` once the job is completed
    pub fn step(&mut self, cache: &mut PredicateCache, iterations: usize) -> bool {
        if self.state == JobState::Completed {
            return true;
        }
        let started = Instant::now();
        self.stats.steps += 1;

        match self.state {
            JobState::Precomputing => self.precompute(cache),
            JobState::Evaluating => self.evaluate(cache, iterations),
            JobState::RelaxAndRetry => self.relax(),
            JobState::Completed => {}
        }

        self.stats.elapsed += started.elapsed();
        self.state == JobState::Completed
    }

    fn precompute(&mut self, cache: &mut PredicateCache) {
        let source = Arc::clone(&self.source);
        let config = Arc::clone(&self.config);
        let ctx = EvalContext::new(source.as_ref(), &config);
        let chunk_size = config.params.chunk_size;
        let budget = Duration::from_millis(config.params.heavy_budget_ms);

        let started = Instant::now();
        let mut done = cache.step_all(&ctx, chunk_size);
        while !done && started.elapsed() < budget {
            done = cache.step_all(&ctx, chunk_size);
        }
        if done {
            debug!(job = self.id, "Heavy predicates ready");
            self.state = JobState::Evaluating;
        }
    }

    fn evaluate(&mut self, cache: &PredicateCache, iterations: usize) {
        let len = self.candidates.len();
        let end = self.cursor.saturating_add(iterations.max(1)).min(len);

        while self.cursor < end {
            if self.cannot_enter(&self.candidates[self.cursor]) {
                // Sorted by bound, then index: nothing further down can enter the heap
                self.stats.pruned += len - self.cursor;
                self.cursor = len;
                break;
            }

            self.stats.candidates_processed += 1;
            let candidate = &self.candidates[self.cursor];
            let item = candidate.item;
            match score_candidate(self.model.as_ref(), &self.heavy, cache, candidate) {
                None => self.stats.excluded += 1,
                Some(breakdown) if breakdown.hard_fraction + STRICTNESS_EPSILON < self.strictness => {
                    self.stats.below_strictness += 1;
                }
                Some(breakdown) => self.offer(RankedItem {
                    item,
                    score: breakdown.total,
                    breakdown,
                }),
            }
            self.cursor += 1;
        }

        if self.cursor >= len {
            self.finish_pass();
        }
    }

    fn offer(&mut self, entry: RankedItem) {
        let entry = Ranked(entry);
        if !self.is_full() {
            self.heap.push(Reverse(entry));
            return;
        }
        let beats_worst = self
            .heap
            .peek()
            .is_some_and(|Reverse(worst)| entry > *worst);
        if beats_worst {
            self.heap.pop();
            self.heap.push(Reverse(entry));
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.config.params.max_results
    }

    /// Whether even the candidate's bound loses to the heap's worst entry.
    /// An equal bound still wins with a lower item index.
    fn cannot_enter(&self, candidate: &Candidate) -> bool {
        if !self.is_full() {
            return false;
        }
        match self.heap.peek() {
            Some(Reverse(worst)) => {
                candidate.upper_bound < worst.0.score
                    || (candidate.upper_bound == worst.0.score && candidate.item > worst.0.item)
            }
            None => false,
        }
    }

    fn can_relax(&self) -> bool {
        let must_have = self.totals.must_have;
        !self.relaxed && must_have >= 2 && relaxed_strictness(must_have) < self.strictness
    }

    #[instrument(skip(self), fields(job = self.id))]
    fn finish_pass(&mut self) {
        if self.heap.is_empty() && self.can_relax() {
            self.state = JobState::RelaxAndRetry;
            return;
        }
        let heap = std::mem::take(&mut self.heap);
        self.results = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(entry))| entry)
            .collect();
        self.state = JobState::Completed;
        info!(
            results = self.results.len(),
            processed = self.stats.candidates_processed,
            pruned = self.stats.pruned,
            relaxed = self.relaxed,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "Ranking job completed"
        );
    }

    #[instrument(skip(self), fields(job = self.id))]
    fn relax(&mut self) {
        let strictness = relaxed_strictness(self.totals.must_have);
        info!(from = self.strictness, to = strictness, "No results, relaxing strictness");
        self.strictness = strictness;
        self.relaxed = true;
        self.cursor = 0;
        self.heap.clear();
        self.stats.relaxations += 1;
        self.state = JobState::Evaluating;
    }

    /// Completion in `[0, 1]`.
    ///
    /// Precomputing fills the first half. The evaluation pass fills most of
    /// the rest, leaving room for a relaxed second pass.
    pub fn progress(&self, cache: &PredicateCache) -> f32 {
        let walked = if self.candidates.is_empty() {
            1.0
        } else {
            self.cursor as f32 / self.candidates.len() as f32
        };
        match self.state {
            JobState::Precomputing => 0.5 * cache.progress(),
            JobState::Evaluating | JobState::RelaxAndRetry if self.relaxed => {
                0.5 + FIRST_PASS_SHARE + (0.5 - FIRST_PASS_SHARE) * walked
            }
            JobState::Evaluating | JobState::RelaxAndRetry => 0.5 + FIRST_PASS_SHARE * walked,
            JobState::Completed => 1.0,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Final results, best first. Empty until the job completes.
    pub fn results(&self) -> &[RankedItem] {
        &self.results
    }

    pub fn near_misses(&self) -> &[Candidate] {
        &self.near_misses
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn strictness(&self) -> f32 {
        self.strictness
    }

    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut JobStats {
        &mut self.stats
    }
}

/// (C−1)/C
fn relaxed_strictness(must_have: usize) -> f32 {
    (must_have as f32 - 1.0) / must_have as f32
}

/// Score a candidate once heavy bitmaps are ready.
///
/// # Returns
/// `None` when a heavy MustNotHave predicate matches
pub fn score_candidate(
    model: &dyn ScoringModel,
    heavy: &[ResolvedPredicate],
    cache: &PredicateCache,
    candidate: &Candidate,
) -> Option<ScoreBreakdown> {
    let mut values = candidate.cheap;
    for resolved in heavy {
        let hit = cache.matches(resolved.id(), candidate.item);
        match resolved.importance {
            Importance::MustHave => values.add_must_have(hit, if hit { 1.0 } else { 0.0 }),
            Importance::MustNotHave if hit => return None,
            Importance::Priority if hit => values.priority += 1.0,
            Importance::Preferred if hit => values.preferred += 1.0,
            _ => {}
        }
    }
    Some(model.score(&values))
}
