pub mod error;
pub mod memory;
pub mod selector;
pub mod traits;

pub use error::*;
pub use memory::*;
pub use selector::next_user;
pub use traits::*;

/// Wall clock in microseconds, the resolution mission timestamps are kept at.
pub fn now_unix_micros() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}
