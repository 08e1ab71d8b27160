//! Order-preserving fan-out over scoped worker threads.
//!
//! Workers pull the next index from a shared counter and tag every result
//! with it. Fan-in sorts on the tag, so the output order matches the input
//! order no matter which call finishes first.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Run `call` once per item with at most `concurrency` calls in flight.
///
/// After the first failure no new item is started; the error with the
/// lowest input index is returned.
pub fn fan_out<T, R, E, F>(items: &[T], concurrency: usize, call: F) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(usize, &T) -> Result<R, E> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let workers = concurrency.clamp(1, items.len());
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);

    let mut tagged: Vec<(usize, Result<R, E>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        if failed.load(Ordering::SeqCst) {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        if index >= items.len() {
                            break;
                        }
                        let result = call(index, &items[index]);
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        local.push((index, result));
                    }
                    local
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(local) => local,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    tagged.sort_by_key(|(index, _)| *index);

    let mut results = Vec::with_capacity(items.len());
    for (_, result) in tagged {
        results.push(result?);
    }
    Ok(results)
}
