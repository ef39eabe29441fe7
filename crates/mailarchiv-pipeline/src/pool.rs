// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded conversion pool.
//
// Sibling conversions run as tasks on a `JoinSet`; a shared semaphore caps how
// many call into a collaborator at once. Results land in a slot per job, so
// the output order is the input order no matter which task finishes first.
// Dropping the `run` future drops the `JoinSet`, which aborts every task still
// in flight.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mailarchiv_core::ConvertError;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

pub type ConversionFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, ConvertError>> + Send>>;

/// One external call and its time budget. The budget starts when the job
/// gets a permit, not while it waits for one.
pub struct Job {
    pub limit: Duration,
    pub work: ConversionFuture,
}

impl Job {
    pub fn new<F>(limit: Duration, work: F) -> Self
    where
        F: Future<Output = Result<Vec<u8>, ConvertError>> + Send + 'static,
    {
        Self {
            limit,
            work: Box::pin(work),
        }
    }
}

/// Concurrency limit for converter calls. Clones share the same permits, so
/// independent `Archiver`s can share one pool.
#[derive(Debug, Clone)]
pub struct ConversionPool {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConversionPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held by a running job.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run all jobs, at most `limit` at a time, returning results in job
    /// order. A job over its budget yields `ConvertError::Timeout`; a job
    /// that panics yields `ConvertError::Tool`.
    #[instrument(skip_all, fields(jobs = jobs.len(), limit = self.limit))]
    pub async fn run(&self, jobs: Vec<Job>) -> Vec<Result<Vec<u8>, ConvertError>> {
        let mut slots: Vec<Option<Result<Vec<u8>, ConvertError>>> = vec![None; jobs.len()];
        let mut tasks = JoinSet::new();
        let mut task_slots = HashMap::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&self.semaphore);
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match tokio::time::timeout(job.limit, job.work).await {
                    Ok(result) => result,
                    Err(_) => Err(ConvertError::Timeout(job.limit)),
                };
                (index, result)
            });
            task_slots.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    debug!(index, ok = result.is_ok(), "job finished");
                    slots[index] = Some(result);
                }
                Err(err) => {
                    warn!(%err, "conversion task did not complete");
                    if let Some(&index) = task_slots.get(&err.id()) {
                        slots[index] =
                            Some(Err(ConvertError::Tool(format!("conversion task failed: {err}"))));
                    }
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(ConvertError::Tool("conversion task was lost".into())))
            })
            .collect()
    }
}
