//! Map-reduce over chunks of inputs, repeated for independent runs.

use std::marker::PhantomData;

use tracing::debug;

use crate::error::ValuationError;
use crate::utils::run_with_threads;

/// Split `items` into at most `n_chunks` contiguous chunks of size
/// `ceil(len / n_chunks)`.
///
/// Empty input yields a single empty chunk so that every job still runs once.
///
/// ```
/// use datavalue::parallel::chunkify;
///
/// let chunks = chunkify(&[1, 2, 3, 4, 5], 2);
/// assert_eq!(chunks, vec![&[1, 2, 3][..], &[4, 5][..]]);
/// ```
pub fn chunkify<T>(items: &[T], n_chunks: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return vec![items];
    }
    let size = items.len().div_ceil(n_chunks.max(1));
    items.chunks(size).collect()
}

/// A map-reduce job over a list of inputs.
///
/// The inputs are split into `n_jobs` chunks (or handed whole to each of
/// `n_jobs` jobs when `chunkify_inputs` is off). Every chunk is mapped with
/// `map_fn(chunk, job_id)`, and the mapped values of one run are reduced with
/// `reduce_fn` in chunk order. The whole job is repeated `n_runs` times and
/// yields one reduced value per run.
///
/// `job_id` is unique across all runs and chunks, which makes it suitable for
/// seeding per-job random number generators.
///
/// ```
/// use datavalue::parallel::MapReduceJob;
///
/// let job = MapReduceJob::new(
///     (1..=10).collect::<Vec<u64>>(),
///     |chunk: &[u64], _job| Ok(chunk.iter().sum::<u64>()),
///     |sums: Vec<u64>| Ok(sums.into_iter().sum::<u64>()),
/// )
/// .n_jobs(3)
/// .n_runs(2);
/// assert_eq!(job.run().unwrap(), vec![55, 55]);
/// ```
pub struct MapReduceJob<I, M, R, MF, RF> {
    inputs: Vec<I>,
    map_fn: MF,
    reduce_fn: RF,
    n_jobs: usize,
    n_runs: usize,
    chunkify_inputs: bool,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<I, M, R, MF, RF> MapReduceJob<I, M, R, MF, RF>
where
    I: Sync,
    M: Send,
    R: Send,
    MF: Fn(&[I], usize) -> Result<M, ValuationError> + Sync,
    RF: Fn(Vec<M>) -> Result<R, ValuationError> + Sync,
{
    /// A job with one worker and one run over chunked inputs.
    pub fn new(inputs: Vec<I>, map_fn: MF, reduce_fn: RF) -> Self {
        Self {
            inputs,
            map_fn,
            reduce_fn,
            n_jobs: 1,
            n_runs: 1,
            chunkify_inputs: true,
            _marker: PhantomData,
        }
    }

    /// Number of parallel jobs. `0` uses all CPUs.
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Number of independent repetitions.
    pub fn n_runs(mut self, n_runs: usize) -> Self {
        self.n_runs = n_runs.max(1);
        self
    }

    /// Whether to split inputs across jobs or give each job all of them.
    pub fn chunkify_inputs(mut self, chunkify: bool) -> Self {
        self.chunkify_inputs = chunkify;
        self
    }

    /// Execute all runs and return one reduced value per run.
    pub fn run(&self) -> Result<Vec<R>, ValuationError> {
        let n_jobs = crate::utils::resolve_threads(self.n_jobs);
        let chunks: Vec<&[I]> = if self.chunkify_inputs {
            chunkify(&self.inputs, n_jobs)
        } else {
            vec![self.inputs.as_slice(); n_jobs]
        };
        let n_chunks = chunks.len();

        let tasks: Vec<(usize, &[I])> = (0..self.n_runs)
            .flat_map(|run| {
                chunks
                    .iter()
                    .enumerate()
                    .map(move |(j, &chunk)| (run * n_chunks + j, chunk))
            })
            .collect();
        debug!(n_jobs, n_runs = self.n_runs, n_tasks = tasks.len(), "running map-reduce job");

        let mapped = run_with_threads(self.n_jobs, |par| {
            par.maybe_par_try_map(tasks, |(job_id, chunk)| (self.map_fn)(chunk, job_id))
        })??;

        // Mapped values come back in task order, i.e. grouped by run.
        let mut runs = Vec::with_capacity(self.n_runs);
        let mut mapped = mapped.into_iter();
        for _ in 0..self.n_runs {
            let values: Vec<M> = mapped.by_ref().take(n_chunks).collect();
            runs.push((self.reduce_fn)(values)?);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 3, vec![4, 4, 2])]
    #[case(3, 5, vec![1, 1, 1])]
    #[case(4, 1, vec![4])]
    #[case(0, 4, vec![0])]
    fn test_chunkify_sizes(#[case] n: usize, #[case] n_chunks: usize, #[case] sizes: Vec<usize>) {
        let items: Vec<usize> = (0..n).collect();
        let got: Vec<usize> = chunkify(&items, n_chunks).iter().map(|c| c.len()).collect();
        assert_eq!(got, sizes);
    }

    #[test]
    fn test_chunkify_preserves_order() {
        let items: Vec<usize> = (0..7).collect();
        let flat: Vec<usize> = chunkify(&items, 3).concat();
        assert_eq!(flat, items);
    }

    #[test]
    fn test_reduce_sees_chunks_in_order() {
        let job = MapReduceJob::new(
            (0..9).collect::<Vec<usize>>(),
            |chunk: &[usize], _| Ok(chunk.to_vec()),
            |parts: Vec<Vec<usize>>| Ok(parts.concat()),
        )
        .n_jobs(4);
        assert_eq!(job.run().unwrap(), vec![(0..9).collect::<Vec<_>>()]);
    }

    #[test]
    fn test_one_result_per_run_with_unique_job_ids() {
        let job = MapReduceJob::new(
            vec![(); 4],
            |_: &[()], job_id| Ok(job_id),
            |ids: Vec<usize>| Ok(ids),
        )
        .n_jobs(2)
        .n_runs(3);
        let runs = job.run().unwrap();
        assert_eq!(runs.len(), 3);
        let mut all: Vec<usize> = runs.concat();
        all.sort_unstable();
        assert_eq!(all, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_unchunked_inputs_go_to_every_job() {
        let job = MapReduceJob::new(
            vec![1, 2, 3],
            |chunk: &[i32], _| Ok(chunk.len()),
            |lens: Vec<usize>| Ok(lens),
        )
        .n_jobs(3)
        .chunkify_inputs(false);
        assert_eq!(job.run().unwrap(), vec![vec![3, 3, 3]]);
    }

    #[test]
    fn test_map_errors_propagate() {
        let job = MapReduceJob::new(
            vec![1],
            |_: &[i32], _| -> Result<(), ValuationError> {
                Err(ValuationError::InvalidArgument("boom".into()))
            },
            |_: Vec<()>| Ok(()),
        );
        assert!(job.run().is_err());
    }
}
