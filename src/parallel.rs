//! Ordered parallel map over a sized worker pool.
//!
//! SAA construction and per-spectrum decomposition are both "apply a pure
//! function to N independent inputs". Results are collected from an indexed
//! parallel iterator, so output order always matches input order regardless
//! of which worker finished first.
//!
//! Work always runs inside a pool of the requested size, so parallel
//! iterators nested in `f` (the grid fitter's candidate search) share the
//! same thread budget instead of spilling onto rayon's global pool.

use rayon::prelude::*;

use crate::error::AppError;

/// Default worker count: 75% of the available CPUs, at least one.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    ((cpus as f64 * 0.75) as usize).max(1)
}

/// Map `f` over `inputs` on `workers` threads, preserving input order.
///
/// `workers == 0` selects [`default_workers`].
pub fn par_map<T, R, F>(workers: usize, inputs: &[T], f: F) -> Result<Vec<R>, AppError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let workers = if workers == 0 { default_workers() } else { workers };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start worker pool: {e}")))?;

    Ok(pool.install(|| inputs.par_iter().map(&f).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_order_matches_input_order() {
        let inputs: Vec<u64> = (0..500).collect();
        let out = par_map(4, &inputs, |&x| {
            // Uneven work so completion order differs from input order.
            let spins = (500 - x) * 50;
            let mut acc = x;
            for i in 0..spins {
                acc = acc.wrapping_mul(31).wrapping_add(i);
            }
            (x, acc)
        })
        .unwrap();
        for (i, (x, _)) in out.iter().enumerate() {
            assert_eq!(*x, i as u64);
        }
    }

    #[test]
    fn nested_parallel_work_stays_in_the_sized_pool() {
        let inputs = [0u8, 1];
        for workers in [1, 3] {
            let seen = par_map(workers, &inputs, |_| {
                let inner: Vec<usize> = (0..64)
                    .into_par_iter()
                    .map(|_| rayon::current_thread_index().unwrap_or(usize::MAX))
                    .collect();
                (rayon::current_num_threads(), inner)
            })
            .unwrap();
            for (threads, inner) in seen {
                assert_eq!(threads, workers);
                assert!(inner.iter().all(|&t| t < workers));
            }
        }
    }

    #[test]
    fn worker_counts_agree() {
        let inputs: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let a = par_map(1, &inputs, |v| v.sqrt()).unwrap();
        let b = par_map(3, &inputs, |v| v.sqrt()).unwrap();
        assert_eq!(a, b);
        assert!(default_workers() >= 1);
    }
}
