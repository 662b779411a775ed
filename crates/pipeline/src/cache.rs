//! Incremental cache of heavy-predicate bitmaps.
//!
//! Heavy predicates are evaluated once per configuration, one contiguous
//! window per step, so no single step does more than `chunk_size` items of
//! work per predicate. Finished bitmaps are kept and reused by later searches
//! as long as the predicate's fingerprint and the dataset generation match.

use data_loader::{Generation, ItemId};
use predicates::{EvalContext, MembershipBitmap, Predicate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct CacheEntry {
    fingerprint: u64,
    generation: Generation,
    bitmap: MembershipBitmap,
    complete: bool,
}

struct EvalTask {
    predicate: Arc<dyn Predicate>,
    cursor: ItemId,
    len: ItemId,
}

impl EvalTask {
    fn is_done(&self) -> bool {
        self.cursor >= self.len
    }

    fn progress(&self) -> f32 {
        if self.len == 0 {
            1.0
        } else {
            self.cursor as f32 / self.len as f32
        }
    }
}

/// Whether `start_evaluation` could reuse an existing bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
}

/// Per-predicate membership bitmaps, built incrementally.
#[derive(Default)]
pub struct PredicateCache {
    entries: HashMap<String, CacheEntry>,
    tasks: Vec<EvalTask>,
    hits: u64,
    misses: u64,
}

impl PredicateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a bitmap for `predicate` under `ctx` exists or is being built.
    ///
    /// No-op when the cached bitmap carries the same fingerprint and dataset
    /// generation. Otherwise the entry is reset and an evaluation task
    /// (re)starts from item 0.
    pub fn start_evaluation(&mut self, predicate: &Arc<dyn Predicate>, ctx: &EvalContext<'_>) -> CacheLookup {
        let id = predicate.id();
        let fingerprint = predicate.fingerprint(ctx.config);
        let generation = ctx.source.generation();

        let reusable = self
            .entries
            .get(id)
            .is_some_and(|entry| entry.fingerprint == fingerprint && entry.generation == generation);
        if reusable {
            self.hits += 1;
            debug!(id, "Predicate cache hit");
            return CacheLookup::Hit;
        }

        self.misses += 1;
        if self.tasks.iter().all(EvalTask::is_done) {
            // Previous batch is finished; progress restarts with this one
            self.tasks.clear();
        }
        self.tasks.retain(|task| task.predicate.id() != id);
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                fingerprint,
                generation,
                bitmap: MembershipBitmap::new(),
                complete: false,
            },
        );
        self.tasks.push(EvalTask {
            predicate: Arc::clone(predicate),
            cursor: 0,
            len: ctx.len() as ItemId,
        });
        debug!(id, fingerprint, generation, "Predicate cache miss, evaluation started");
        CacheLookup::Miss
    }

    /// Advance every unfinished task by one window of `chunk_size` items.
    ///
    /// Non-chunkable predicates are evaluated over the whole dataset in this
    /// one call.
    ///
    /// # Returns
    /// `true` once every task is done
    pub fn step_all(&mut self, ctx: &EvalContext<'_>, chunk_size: usize) -> bool {
        let chunk = chunk_size.max(1) as ItemId;
        for task in self.tasks.iter_mut().filter(|task| !task.is_done()) {
            let id = task.predicate.id();
            let Some(entry) = self.entries.get_mut(id) else {
                task.cursor = task.len;
                continue;
            };
            if task.predicate.is_chunkable() {
                let end = task.cursor.saturating_add(chunk).min(task.len);
                task.predicate
                    .evaluate_window(ctx, task.cursor..end, &mut entry.bitmap);
                task.cursor = end;
            } else {
                warn!(id, items = task.len, "Evaluating non-chunkable predicate synchronously");
                entry.bitmap = task.predicate.evaluate(ctx);
                task.cursor = task.len;
            }
            if task.is_done() {
                entry.complete = true;
                debug!(id, matches = entry.bitmap.len(), "Predicate evaluation complete");
            }
        }
        self.is_idle()
    }

    /// Mean completion of the current batch, 1.0 when idle.
    pub fn progress(&self) -> f32 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        self.tasks.iter().map(EvalTask::progress).sum::<f32>() / self.tasks.len() as f32
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.iter().all(EvalTask::is_done)
    }

    /// Whether `item` matched predicate `id`. Unknown ids never match.
    pub fn matches(&self, id: &str, item: ItemId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.bitmap.contains(item))
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.complete)
    }

    /// Finished bitmap for `id`, if any
    pub fn bitmap(&self, id: &str) -> Option<&MembershipBitmap> {
        self.entries
            .get(id)
            .filter(|entry| entry.complete)
            .map(|entry| &entry.bitmap)
    }

    /// Drop every entry built for a generation other than `generation`.
    pub fn retain_generation(&mut self, generation: Generation) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.generation == generation);
        self.tasks
            .retain(|task| self.entries.contains_key(task.predicate.id()));
        debug!(dropped = before - self.entries.len(), generation, "Predicate cache pruned");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
