//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use pyrunner_core::domain::DomainError;
use pyrunner_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const THROTTLED: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SYSTEM_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Throttled(msg) => ErrorObjectOwned::owned(code::THROTTLED, msg, None::<()>),
        AppError::Execution(e) => {
            ErrorObjectOwned::owned(code::SYSTEM_ERROR, e.to_string(), None::<()>)
        }
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
        // Job manager checks for terminal states first; reaching here is a bug
        AppError::Domain(e @ DomainError::InvalidStateTransition { .. }) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>)
        }
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Io(e) => ErrorObjectOwned::owned(code::SYSTEM_ERROR, e.to_string(), None::<()>),
    }
}

/// Error returned when the rate limiter has no tokens left
pub fn rate_limited() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            to_rpc_error(AppError::Validation("bad".into())).code(),
            code::VALIDATION_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::NotFound("job".into())).code(),
            code::NOT_FOUND
        );
        assert_eq!(
            to_rpc_error(AppError::Throttled("cpu".into())).code(),
            code::THROTTLED
        );
        assert_eq!(
            to_rpc_error(AppError::Domain(DomainError::TimeoutOutOfRange(99))).code(),
            code::VALIDATION_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::Domain(DomainError::InvalidStateTransition {
                from: "FINISHED".into(),
                to: "CANCELLED".into(),
            }))
            .code(),
            code::INTERNAL_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::Internal("lock".into())).code(),
            code::INTERNAL_ERROR
        );
        assert_eq!(rate_limited().code(), code::THROTTLED);
    }

    #[test]
    fn test_message_is_kept() {
        let err = to_rpc_error(AppError::NotFound("Job job-9 not found".into()));
        assert_eq!(err.message(), "Job job-9 not found");
    }
}
