//! Core of the sensor job manager: a millisecond clock with an adjustable
//! base, an ordered keyed-record store with a master table, the padded-key
//! job registry, the cooperative scheduler/queue, and JSON request
//! dispatch. Transports that deliver requests (serial, RF, TCP) live in
//! the binaries; everything here is synchronous and single-caller.

pub mod cfg;
pub mod clock;
pub mod error;
pub mod job;
pub mod logx;
pub mod manager;
pub mod registry;
#[cfg(feature = "json")]
mod request;
pub mod store;

pub use error::Error;
pub use manager::JobManager;
