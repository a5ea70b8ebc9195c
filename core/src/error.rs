use thiserror::Error;

/// Errors surfaced by the job manager.
///
/// `NoMoreQueuedJobs` is internal bookkeeping for the dequeue path;
/// [`crate::manager::JobManager::execute_queued_job`] maps it to a benign
/// no-op before the caller ever sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The job dictionary could not be opened or created.
    #[error("job dictionary could not be initialized")]
    DictInit,
    /// A registry update failed.
    #[error("job dictionary update failed")]
    DictUpdate,
    /// A registry lookup failed or found nothing.
    #[error("job dictionary lookup failed")]
    DictGet,
    /// The job could not be inserted (duplicate or invalid name, store full).
    #[error("job could not be added")]
    AddJob,
    /// Reserved.
    #[error("job could not be retrieved")]
    GetJob,
    /// The request was not a well-formed `[name, args...]` array, or it
    /// exceeded the token budget.
    #[error("unsupported JSON request format")]
    UnsupportedJsonFormat,
    /// Dequeue on an empty queue.
    #[error("no more queued jobs")]
    NoMoreQueuedJobs,
    /// A queue node or name copy could not be allocated.
    #[error("memory allocation failed")]
    MemoryAllocation,
}

pub type Result<T> = std::result::Result<T, Error>;
