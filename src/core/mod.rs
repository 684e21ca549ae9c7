//! Core error types shared across SCTools.

pub mod error;

pub use error::{ErrorContext, SctoolsError, is_cancellation, user_friendly_error};
