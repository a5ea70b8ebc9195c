//! The job manager: registry lifecycle, the execution queue, and the
//! cooperative scheduler.
//!
//! The registry is the source of truth; the queue is transient. A queued
//! entry carries a copy of the record plus its own padded name, so a job
//! removed from the registry after enqueue still executes; only the
//! post-execution bookkeeping update fails.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::clock;
use crate::error::{Error, Result};
use crate::job::{ArgList, JobRecord, OutSlot};
use crate::registry::{JobRegistry, JOB_DICT_USE_TYPE};

/// One pending execution: a record copy plus its owned padded key.
struct QueuedJob {
    job: JobRecord,
    name: Box<[u8]>,
}

/// Process-level handle managing named jobs. All operations assume a single
/// caller; jobs run synchronously on the caller's stack.
pub struct JobManager {
    registry: JobRegistry,
    max_name_size: usize,
    max_json_tokens: usize,
    queue: VecDeque<QueuedJob>,
}

impl JobManager {
    /// Open the manager against the default job dictionary use type.
    pub fn init(max_name_size: usize, max_json_tokens: usize) -> Result<Self> {
        Self::init_with_use_type(JOB_DICT_USE_TYPE, max_name_size, max_json_tokens)
    }

    /// Open a manager whose dictionary is catalogued under `use_type`.
    /// Distinct use types give fully independent managers in one process.
    pub fn init_with_use_type(
        use_type: i32,
        max_name_size: usize,
        max_json_tokens: usize,
    ) -> Result<Self> {
        clock::init();
        let registry = JobRegistry::open_or_create(use_type, max_name_size)?;
        let max_name_size = registry.key_size();
        info!(use_type, max_name_size, max_json_tokens, "job manager ready");
        Ok(Self { registry, max_name_size, max_json_tokens, queue: VecDeque::new() })
    }

    /// Tear down: drain the queue, then destroy the backing dictionary and
    /// its master-table entry.
    pub fn delete(mut self) {
        while self.dequeue_next_job().is_ok() {}
        self.registry.destroy();
    }

    /// Drain the queue but keep the dictionary catalogued, so a later
    /// `init` with the same use type reopens it.
    pub fn close(mut self) {
        while self.dequeue_next_job().is_ok() {}
    }

    pub fn max_name_size(&self) -> usize {
        self.max_name_size
    }

    pub fn max_json_tokens(&self) -> usize {
        self.max_json_tokens
    }

    /// Number of jobs currently awaiting execution.
    pub fn queued_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Register a named job. Duplicate names are rejected.
    pub fn add_job(&mut self, name: &str, job: JobRecord) -> Result<()> {
        self.registry.add(name, job)?;
        debug!(name, "job added");
        Ok(())
    }

    /// Fetch a job's stored record.
    pub fn get_job(&self, name: &str) -> Result<JobRecord> {
        self.registry.get(name)
    }

    /// Unregister a named job. Queued copies still execute.
    pub fn remove_job(&mut self, name: &str) -> Result<()> {
        self.registry.remove(name)
    }

    /// Invoke a named job directly with the given parameters.
    pub fn perform_job(&mut self, name: &str, params: ArgList<'_>, out: OutSlot<'_>) -> Result<()> {
        let job = self.registry.get(name)?;
        job.func.invoke(params, out);
        Ok(())
    }

    /// Parse a `[name, args...]` JSON array and dispatch to the named job.
    #[cfg(feature = "json")]
    pub fn request_job(&mut self, json: &str, out: OutSlot<'_>) -> Result<()> {
        crate::request::dispatch(self, json, out)
    }

    /// Log a record's scheduling metadata at debug level.
    pub fn debug_job(&self, name: &str) {
        match self.registry.get(name) {
            Ok(job) => debug!(
                name,
                last_execution_time = job.last_execution_time,
                last_scheduled_time = job.last_scheduled_time,
                "job record"
            ),
            Err(error) => debug!(name, %error, "job record unavailable"),
        }
    }

    fn enqueue_job(&mut self, job: JobRecord, name: &[u8]) {
        self.queue.push_back(QueuedJob { job, name: name.into() });
    }

    fn dequeue_next_job(&mut self) -> Result<QueuedJob> {
        self.queue.pop_front().ok_or(Error::NoMoreQueuedJobs)
    }

    /// One pass over the registry: append every job whose activation
    /// predicate fires, in cursor order, stamping `last_scheduled_time`.
    ///
    /// A registry update failure aborts the pass and surfaces; anything
    /// enqueued before the failure stays queued, and idempotent predicates
    /// absorb the re-scan on the next tick.
    pub fn queue_scheduled_jobs(&mut self) -> Result<()> {
        let epoch = clock::base();
        for record in self.registry.scan_all() {
            let mut job = record.value;
            let now = clock::now();
            if job.needs_execution.needs_execution(&job, epoch, now) {
                self.enqueue_job(job.clone(), &record.key);
                job.last_scheduled_time = clock::now();
                self.registry.update_padded(&record.key, &job)?;
                debug!(name = %display_name(&record.key), "job queued");
            }
        }
        Ok(())
    }

    /// Pop and run the job at the head of the queue, then stamp
    /// `last_execution_time`. An empty queue is a benign no-op.
    pub fn execute_queued_job(&mut self) -> Result<()> {
        let mut queued = match self.dequeue_next_job() {
            Ok(queued) => queued,
            Err(Error::NoMoreQueuedJobs) => return Ok(()),
            Err(error) => return Err(error),
        };

        queued.job.func.invoke(&[], None);
        queued.job.last_execution_time = clock::now();

        let result = self.registry.update_padded(&queued.name, &queued.job);
        match &result {
            Ok(()) => info!(name = %display_name(&queued.name), "queued job executed"),
            Err(error) => warn!(name = %display_name(&queued.name), %error, "job ran but update failed"),
        }
        result
    }
}

fn display_name(key: &[u8]) -> String {
    let end = key.iter().position(|b| *b == 0).unwrap_or(key.len());
    String::from_utf8_lossy(&key[..end]).into_owned()
}
