//! Failsafe mechanisms for collaborator calls

mod retry;

pub use retry::{RetryPolicy, with_retry};
