//! Retry handling for LLM transport failures.
//!
//! - **Classification**: raw transport error -> transient / rate-limited /
//!   permanent / unknown
//! - **Policy**: classification -> none / fixed / exponential strategy

mod classifier;
mod policy;

pub use classifier::{ErrorClass, classify, extract_retry_after, is_billing_error};
pub use policy::{RetryConfig, RetryPolicy, RetryStrategy};
