//! Bounded-concurrency execution of independent fallible tasks.
//!
//! Rasterizer calls are CPU-heavy, and an unbounded fan-out over a few
//! hundred pages saturates every core and can lock the machine up. The
//! [`BoundedExecutor`] runs a list of futures with at most `C` in flight and
//! hands the results back in input order, whatever order they finish in.
//!
//! Futures are lazy, so a `Vec<impl Future>` is the task list: nothing starts
//! until the executor polls it.
//!
//! On the first failure no further tasks are started, but tasks already in
//! flight are awaited before the error is returned. Their side effects (frame
//! files) are therefore complete by the time the caller runs its cleanup.

use crate::config::{ConcurrencyPolicy, Scheduling};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Runs task lists under a [`ConcurrencyPolicy`] and [`Scheduling`] mode.
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    policy: ConcurrencyPolicy,
    scheduling: Scheduling,
}

impl BoundedExecutor {
    pub fn new(policy: ConcurrencyPolicy, scheduling: Scheduling) -> Self {
        Self { policy, scheduling }
    }

    /// Concrete ceiling `C` for a list of `task_count` tasks.
    pub fn ceiling(&self, task_count: usize) -> usize {
        self.policy.ceiling(task_count)
    }

    /// How many times `on_unit` fires for a successful run over `task_count`
    /// tasks: once per chunk when chunked, once per task when windowed.
    pub fn progress_units(&self, task_count: usize) -> usize {
        match self.scheduling {
            Scheduling::Chunked => task_count.div_ceil(self.ceiling(task_count)),
            Scheduling::Windowed => task_count,
        }
    }

    /// Run `tasks`, calling `on_unit` after each completed progress unit.
    ///
    /// Returns every output in input order, or the first error encountered.
    pub async fn run<T, E, Fut, P>(&self, tasks: Vec<Fut>, on_unit: P) -> Result<Vec<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(),
    {
        match self.scheduling {
            Scheduling::Chunked => self.run_chunked(tasks, on_unit).await,
            Scheduling::Windowed => self.run_windowed(tasks, on_unit).await,
        }
    }

    /// Partition into chunks of `C`; run each chunk to completion before the
    /// next one starts.
    async fn run_chunked<T, E, Fut, P>(&self, tasks: Vec<Fut>, mut on_unit: P) -> Result<Vec<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(),
    {
        let ceiling = self.ceiling(tasks.len());
        let mut results = Vec::with_capacity(tasks.len());
        let mut remaining = tasks.into_iter();

        loop {
            let chunk: Vec<Fut> = remaining.by_ref().take(ceiling).collect();
            if chunk.is_empty() {
                break;
            }

            let mut failure = None;
            for outcome in join_all(chunk).await {
                match outcome {
                    Ok(value) => results.push(value),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }
            on_unit();
        }

        Ok(results)
    }

    /// Keep up to `C` tasks in flight, starting the next as soon as one ends.
    async fn run_windowed<T, E, Fut, P>(&self, tasks: Vec<Fut>, mut on_unit: P) -> Result<Vec<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(),
    {
        let total = tasks.len();
        let ceiling = self.ceiling(total);
        let mut pending = tasks.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut failure = None;

        for (index, task) in pending.by_ref().take(ceiling) {
            in_flight.push(indexed(index, task));
        }

        while let Some((index, outcome)) = in_flight.next().await {
            match outcome {
                Ok(value) => {
                    slots[index] = Some(value);
                    on_unit();
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
            if failure.is_none() {
                if let Some((next, task)) = pending.next() {
                    in_flight.push(indexed(next, task));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(slots.into_iter().flatten().collect()),
        }
    }
}

async fn indexed<F: Future>(index: usize, task: F) -> (usize, F::Output) {
    (index, task.await)
}
