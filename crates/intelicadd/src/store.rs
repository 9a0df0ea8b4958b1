//! Job storage.
//!
//! The job service only talks to [`JobStore`], so the in-memory map can be
//! swapped for something persistent without touching the state machine.
//! Implementations must not hold their lock across an `.await`; every
//! method here is synchronous.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use intelicad_common::{Job, JobError};

pub type Mutation<'a> = &'a mut dyn FnMut(&mut Job) -> Result<(), JobError>;

pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> Result<(), JobError>;

    fn get(&self, id: &str) -> Option<Job>;

    /// Apply `mutation` to the stored job atomically. A failed mutation
    /// leaves the job untouched.
    fn update(&self, id: &str, mutation: Mutation<'_>) -> Result<(), JobError>;

    /// Snapshot of every job, oldest first.
    fn list(&self) -> Vec<Job>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&job.id) {
            return Err(JobError::Storage(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.jobs().get(id).cloned()
    }

    fn update(&self, id: &str, mutation: Mutation<'_>) -> Result<(), JobError> {
        let mut jobs = self.jobs();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let mut draft = job.clone();
        mutation(&mut draft)?;
        *job = draft;
        Ok(())
    }

    fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    fn len(&self) -> usize {
        self.jobs().len()
    }
}
