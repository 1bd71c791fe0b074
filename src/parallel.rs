//! Work-stealing fork-join runtime for chunk-granular execution.
//!
//! A dedicated rayon pool provides the worker deques and stealable
//! continuations; the primitives here shape work as recursive halving over an
//! index range, so a task only suspends at its join point. Combines run
//! strictly left-to-right by index: `combine` must be associative, but never
//! needs to be commutative. Floating-point reductions therefore may differ
//! from a strictly sequential loop, which is accepted and documented at the
//! operation level.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use crate::column::{ChunkedColumn, Element};
use crate::error::GalleonError;
use crate::CHUNK_SIZE;

/// Hard cap on pool size regardless of core count.
pub const MAX_THREADS: usize = 32;

/// Columns with fewer chunks than this run their reductions sequentially.
pub const MIN_PARALLEL_CHUNKS: usize = 2;

static THREAD_POOL: OnceLock<rayon::ThreadPool> = OnceLock::new();

/// Builds the worker pool (available cores, capped at [`MAX_THREADS`]).
/// Idempotent; later calls are no-ops.
pub fn init_thread_pool() -> Result<(), GalleonError> {
    if THREAD_POOL.get().is_some() {
        return Ok(());
    }
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_THREADS);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("galleon-worker-{}", i))
        .build()
        .map_err(|e| GalleonError::Execution(format!("failed to build thread pool: {}", e)))?;
    if THREAD_POOL.set(pool).is_ok() {
        debug!(threads, "thread pool initialized");
    }
    Ok(())
}

/// The worker pool, if [`init_thread_pool`] has run.
pub fn thread_pool() -> Option<&'static rayon::ThreadPool> {
    THREAD_POOL.get()
}

/// Runs two closures as a fork-join pair: the calling thread executes one
/// while the other is stealable. Falls back to sequential execution when the
/// pool is not initialized.
pub fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    match THREAD_POOL.get() {
        Some(pool) => pool.join(a, b),
        None => (a(), b()),
    }
}

/// Partitions `[0, n)` by recursive halving until a range is at most
/// [`CHUNK_SIZE`](crate::CHUNK_SIZE) long, then runs `body(start, end)`
/// serially on the leaf.
pub fn parallel_for<F>(n: usize, body: &F)
where
    F: Fn(usize, usize) + Sync,
{
    parallel_for_with_grain(n, CHUNK_SIZE, body);
}

/// [`parallel_for`] with an explicit leaf grain.
pub fn parallel_for_with_grain<F>(n: usize, grain: usize, body: &F)
where
    F: Fn(usize, usize) + Sync,
{
    if n == 0 {
        return;
    }
    let grain = grain.max(1);
    match THREAD_POOL.get() {
        Some(pool) => pool.install(|| for_rec(0, n, grain, body)),
        None => body(0, n),
    }
}

fn for_rec<F>(start: usize, end: usize, grain: usize, body: &F)
where
    F: Fn(usize, usize) + Sync,
{
    if end - start <= grain {
        body(start, end);
        return;
    }
    let mid = start + (end - start) / 2;
    rayon::join(
        || for_rec(start, mid, grain, body),
        || for_rec(mid, end, grain, body),
    );
}

/// Tree-shaped reduction over `[0, n)`: leaves fold `map(i)` into the
/// identity, internal nodes apply `combine(left, right)` in index order.
pub fn parallel_reduce<T, M, C>(n: usize, identity: T, map: &M, combine: &C) -> T
where
    T: Send + Sync + Clone,
    M: Fn(usize) -> T + Sync,
    C: Fn(T, T) -> T + Sync,
{
    if n == 0 {
        return identity;
    }
    match THREAD_POOL.get() {
        Some(pool) => pool.install(|| reduce_rec(0, n, CHUNK_SIZE, &identity, map, combine)),
        None => {
            let mut acc = identity;
            for i in 0..n {
                acc = combine(acc, map(i));
            }
            acc
        }
    }
}

fn reduce_rec<T, M, C>(start: usize, end: usize, grain: usize, identity: &T, map: &M, combine: &C) -> T
where
    T: Send + Sync + Clone,
    M: Fn(usize) -> T + Sync,
    C: Fn(T, T) -> T + Sync,
{
    if end - start <= grain {
        let mut acc = identity.clone();
        for i in start..end {
            acc = combine(acc, map(i));
        }
        return acc;
    }
    let mid = start + (end - start) / 2;
    let (left, right) = rayon::join(
        || reduce_rec(start, mid, grain, identity, map, combine),
        || reduce_rec(mid, end, grain, identity, map, combine),
    );
    combine(left, right)
}

/// [`parallel_reduce`] with chunk slices as leaves: the leaf for chunk `i`
/// runs `process(column.chunk(i))`.
pub fn parallel_chunk_reduce<T, R, P, C>(
    column: &ChunkedColumn<T>,
    identity: R,
    process: &P,
    combine: &C,
) -> R
where
    T: Element,
    R: Send + Sync + Clone,
    P: Fn(&[T]) -> R + Sync,
    C: Fn(R, R) -> R + Sync,
{
    let n = column.num_chunks();
    if n == 0 {
        return identity;
    }
    match THREAD_POOL.get() {
        Some(pool) => pool.install(|| chunk_reduce_rec(column, 0, n, &identity, process, combine)),
        None => {
            let mut acc = identity;
            for c in 0..n {
                acc = combine(acc, process(column.chunk(c).unwrap_or(&[])));
            }
            acc
        }
    }
}

fn chunk_reduce_rec<T, R, P, C>(
    column: &ChunkedColumn<T>,
    start: usize,
    end: usize,
    identity: &R,
    process: &P,
    combine: &C,
) -> R
where
    T: Element,
    R: Send + Sync + Clone,
    P: Fn(&[T]) -> R + Sync,
    C: Fn(R, R) -> R + Sync,
{
    if end - start == 1 {
        return process(column.chunk(start).unwrap_or(&[]));
    }
    let mid = start + (end - start) / 2;
    let (left, right) = rayon::join(
        || chunk_reduce_rec(column, start, mid, identity, process, combine),
        || chunk_reduce_rec(column, mid, end, identity, process, combine),
    );
    combine(left, right)
}

/// Cost class of an operation, used to pick the sequential/parallel floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Little work per element (sum, min/max).
    CheapScan,
    /// Substantial work per element (sort, hash build).
    HeavyScan,
    /// Bandwidth-bound streaming (elementwise copy/add).
    MemoryBound,
}

/// Whether `n` elements are enough for `kind` to benefit from the pool.
/// Memory-bound work has the highest floor: extra threads only fight over
/// the same bus.
pub fn should_parallelize(kind: OpKind, n: usize) -> bool {
    let floor = match kind {
        OpKind::HeavyScan => 65_536,
        OpKind::CheapScan => 262_144,
        OpKind::MemoryBound => 1_048_576,
    };
    n > floor
}

/// Error slot shared by worker leaves.
///
/// The runtime never unwinds across a join; leaves record failures here and
/// the caller inspects the context after the join completes.
#[derive(Default)]
pub struct WorkerContext {
    had_error: AtomicBool,
    message: Mutex<Option<String>>,
}

impl WorkerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first failure; later calls keep the original message.
    pub fn record_error(&self, message: impl Into<String>) {
        if !self.had_error.swap(true, Ordering::AcqRel) {
            if let Ok(mut slot) = self.message.lock() {
                *slot = Some(message.into());
            }
        }
    }

    pub fn had_error(&self) -> bool {
        self.had_error.load(Ordering::Acquire)
    }

    /// Consumes the recorded failure, if any.
    pub fn take_error(&self) -> Option<GalleonError> {
        if !self.had_error() {
            return None;
        }
        let message = self
            .message
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or_else(|| "worker failed".to_string());
        Some(GalleonError::Execution(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_join_runs_both_sides() {
        init_thread_pool().unwrap();
        let (a, b) = join(|| 2 + 2, || "right");
        assert_eq!(a, 4);
        assert_eq!(b, "right");
    }

    #[test]
    fn test_parallel_for_covers_range_exactly() {
        init_thread_pool().unwrap();
        let hits = AtomicUsize::new(0);
        parallel_for_with_grain(100_000, 1024, &|start, end| {
            assert!(end - start <= 1024);
            hits.fetch_add(end - start, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 100_000);
    }

    #[test]
    fn test_parallel_reduce_matches_sequential() {
        init_thread_pool().unwrap();
        let n = 500_000usize;
        let total = parallel_reduce(n, 0u64, &|i| i as u64, &|a, b| a + b);
        assert_eq!(total, (n as u64 - 1) * n as u64 / 2);
    }

    #[test]
    fn test_parallel_reduce_is_ordered() {
        init_thread_pool().unwrap();
        // String concatenation is associative but not commutative; index order
        // must survive the tree.
        let joined = parallel_reduce(
            2_000,
            String::new(),
            &|i| format!("{},", i % 10),
            &|a, b| a + &b,
        );
        let expected: String = (0..2_000).map(|i| format!("{},", i % 10)).collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn test_parallel_chunk_reduce_sums_chunks() {
        init_thread_pool().unwrap();
        let data: Vec<i64> = (0..(CHUNK_SIZE * 3 + 17) as i64).collect();
        let col = ChunkedColumn::from_slice(&data).unwrap();
        let total = parallel_chunk_reduce(
            &col,
            0i64,
            &|chunk: &[i64]| chunk.iter().sum::<i64>(),
            &|a, b| a + b,
        );
        assert_eq!(total, data.iter().sum::<i64>());
    }

    #[test]
    fn test_should_parallelize_floors() {
        assert!(!should_parallelize(OpKind::CheapScan, 1000));
        assert!(should_parallelize(OpKind::CheapScan, 1_000_000));
        assert!(should_parallelize(OpKind::HeavyScan, 100_000));
        assert!(!should_parallelize(OpKind::MemoryBound, 100_000));
        assert!(should_parallelize(OpKind::MemoryBound, 2_000_000));
    }

    #[test]
    fn test_worker_context_keeps_first_error() {
        let ctx = WorkerContext::new();
        assert!(!ctx.had_error());
        ctx.record_error("first");
        ctx.record_error("second");
        assert!(ctx.had_error());
        match ctx.take_error() {
            Some(GalleonError::Execution(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
