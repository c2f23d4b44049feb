//! Map-reduce over dataset shards.
//!
//! The trainer only talks to [`MapReduce`]; [`Sequential`] runs shards on
//! the calling thread, [`WorkerPool`] on a fixed set of rayon workers.
//! Both fold shard results in shard order, so a given set of shards gives
//! the same answer under either executor and any thread count.

use crate::error::{GmmError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;

/// Executes one task per shard and folds the results in shard order.
pub trait MapReduce: fmt::Debug + Send + Sync {
    /// Number of tasks that may run at once.
    fn concurrency(&self) -> usize;

    /// Applies `per_shard` to every shard, waits for all of them, then folds
    /// `init` with the results in shard order using `merge`.
    fn map_reduce<S, T, F, M>(&self, shards: &[S], per_shard: F, init: T, merge: M) -> T
    where
        S: Sync,
        T: Send,
        F: Fn(&S) -> T + Sync,
        M: FnMut(T, T) -> T;
}

/// Runs every shard on the caller's thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl MapReduce for Sequential {
    fn concurrency(&self) -> usize {
        1
    }

    fn map_reduce<S, T, F, M>(&self, shards: &[S], per_shard: F, init: T, merge: M) -> T
    where
        S: Sync,
        T: Send,
        F: Fn(&S) -> T + Sync,
        M: FnMut(T, T) -> T,
    {
        shards.iter().map(per_shard).fold(init, merge)
    }
}

/// Fixed-size pool of worker threads, reused for every call.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Spawns `concurrency` workers; 0 uses one per available core.
    pub fn new(concurrency: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("gmm-worker-{}", i))
            .build()
            .map_err(|e| GmmError::WorkerPool(e.to_string()))?;

        Ok(Self { pool })
    }
}

impl MapReduce for WorkerPool {
    fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn map_reduce<S, T, F, M>(&self, shards: &[S], per_shard: F, init: T, merge: M) -> T
    where
        S: Sync,
        T: Send,
        F: Fn(&S) -> T + Sync,
        M: FnMut(T, T) -> T,
    {
        // `collect` keeps shard order; the fold below is the barrier.
        let partials: Vec<T> = self
            .pool
            .install(|| shards.par_iter().map(|shard| per_shard(shard)).collect());

        partials.into_iter().fold(init, merge)
    }
}
