//! Millisecond clock with an adjustable base ("local epoch").
//!
//! Hosted targets read the system clock; `set_now` installs a signed offset
//! so tests can steer time forward without sleeping. All shared state lives
//! in atomics, the hosted analogue of wrapping the tick counter in a
//! critical section on interrupt-driven targets.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of milliseconds, absolute or relative.
pub type Milliseconds = u64;

static BASE_MILLIS: AtomicU64 = AtomicU64::new(0);
static NOW_OFFSET: AtomicI64 = AtomicI64::new(0);

fn system_millis() -> Milliseconds {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Reset the base to the system epoch. Does not disturb a `set_now` offset.
pub fn init() {
    BASE_MILLIS.store(0, Ordering::Relaxed);
}

/// Current time in milliseconds since the system epoch.
pub fn now() -> Milliseconds {
    system_millis().saturating_add_signed(NOW_OFFSET.load(Ordering::Relaxed))
}

/// Time elapsed since the base.
pub fn relative() -> Milliseconds {
    now().saturating_sub(base())
}

/// Steer the clock so that `now()` reports `ms` at this instant.
pub fn set_now(ms: Milliseconds) {
    let system = system_millis();
    NOW_OFFSET.store(ms as i64 - system as i64, Ordering::Relaxed);
}

/// The configured base time.
pub fn base() -> Milliseconds {
    BASE_MILLIS.load(Ordering::Relaxed)
}

/// Move the base. `now()` is unaffected; `relative()` changes.
pub fn set_base(ms: Milliseconds) {
    BASE_MILLIS.store(ms, Ordering::Relaxed);
}
