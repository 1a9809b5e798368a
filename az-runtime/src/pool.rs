//! Fixed-size worker pool for independent games.

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to build worker pool: {0}")]
pub struct PoolError(#[from] rayon::ThreadPoolBuildError);

pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// `workers == 0` sizes the pool to the number of logical CPUs.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("az-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f(0..n)` on the pool. Results come back in index order regardless of scheduling;
    /// any error fails the whole batch.
    pub fn run_indexed<T, E, F>(&self, n: usize, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send,
    {
        self.pool
            .install(|| (0..n).into_par_iter().map(&f).collect::<Result<Vec<T>, E>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_are_in_index_order() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.threads(), 4);
        let out: Result<Vec<usize>, ()> = pool.run_indexed(100, |i| Ok(i * i));
        let out = out.unwrap();
        assert_eq!(out.len(), 100);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn an_error_fails_the_batch() {
        let pool = WorkerPool::new(2).unwrap();
        let out: Result<Vec<usize>, String> =
            pool.run_indexed(10, |i| if i == 7 { Err(format!("game {i}")) } else { Ok(i) });
        assert_eq!(out, Err("game 7".to_string()));
    }
}
