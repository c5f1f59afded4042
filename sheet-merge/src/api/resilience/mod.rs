//! Resilience for calls to the document store
//!
//! Only uploads are retried: a write can be refused while someone else has the
//! file open, and that clears up on its own. Resolution and download failures
//! are permanent for the request and surface immediately.

pub mod retry;

pub use retry::{HttpStatus, RetryConfig, RetryOutcome, RetryPolicy};
