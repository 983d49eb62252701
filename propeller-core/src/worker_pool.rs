//! S3's per-function worker pool (`spec.md` §5, `SPEC_FULL.md` §5a).
//!
//! Each function's chain builder is an independent island once S2 has
//! frozen the CFGs (`reorder_ip` aside, which this crate defaults to serial
//! execution for, per `spec.md` §9's parallelism note). A fixed-size pool
//! of `std::thread` workers, scoped to this call, pulls function indices
//! off a shared `Mutex` counter and writes results into a shared slot
//! vector, mirroring the teacher's preference for plain `std`
//! orchestration primitives over a scheduler dependency
//! (`gcrecomp-core::recompiler::pipeline` drives its multi-file
//! recompilation the same way). `thread::scope` lets `work` borrow data
//! that outlives only this call, so callers don't need to heap-share their
//! CFGs across an `Arc`.

use std::sync::Mutex;
use std::thread;

/// Runs `work(index)` for every `0..len`, across `workers` threads, and
/// returns the results in index order.
pub fn run_indexed<T, F>(len: usize, workers: usize, work: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    if len == 0 {
        return Vec::new();
    }
    let workers = workers.max(1).min(len);
    if workers == 1 {
        return (0..len).map(work).collect();
    }

    let next = Mutex::new(0usize);
    let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..len).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let idx = {
                    let mut guard = next.lock().unwrap();
                    if *guard >= len {
                        break;
                    }
                    let i = *guard;
                    *guard += 1;
                    i
                };
                let result = work(idx);
                slots.lock().unwrap()[idx] = Some(result);
            });
        }
    });

    slots.into_inner().unwrap().into_iter().map(|s| s.unwrap()).collect()
}

/// The default worker count: the machine's available parallelism, per
/// `SPEC_FULL.md` §5a.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
