//! Utility modules.

pub mod file;
pub mod random;
pub mod retry;

pub use file::{calculate_checksum, collect_files, read_file_bytes, write_atomic};
pub use random::{gaussian, gaussian_vector, seeded_rng};
pub use retry::{RetryConfig, RetryResult, Retryable, retry, with_retry};
