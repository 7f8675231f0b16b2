pub mod auth;
pub mod entry;
pub mod expiry;
pub mod repository;

pub use auth::{hash_pin, verify_pin_record, AccessGuard, SessionState};
pub use entry::{parse_validity_days, remaining_days, validate_fields, Entry, DAY_MS};
pub use expiry::{duration_until_next_midnight, ExpiryEngine, RECOMPUTE_INTERVAL};
pub use repository::EntryRepository;
