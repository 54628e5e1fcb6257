//! Cross-platform time utilities.
//!
//! The ledger stamps objects with milliseconds since the unix epoch, so most
//! of the helpers here convert between that representation and
//! [`SystemTime`].

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current system time.
#[cfg(not(target_arch = "wasm32"))]
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Returns the current system time.
///
/// `std::time::SystemTime::now()` panics on `wasm32-unknown-unknown`, so the
/// browser clock is read through `web_time`.
#[cfg(target_arch = "wasm32")]
pub fn now() -> SystemTime {
    use web_time::web::SystemTimeExt;
    web_time::SystemTime::now().to_std()
}

/// Milliseconds since the unix epoch. Times before the epoch clamp to zero.
pub fn to_unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// The [`SystemTime`] for a ledger millisecond timestamp.
pub fn from_unix_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
