mod kiro_error;

pub use kiro_error::{ApiErrorBody, ApiErrorObject, KiroError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
