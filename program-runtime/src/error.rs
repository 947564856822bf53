//! Error types for the Nova VM boundary
//!
//! Three layers of errors exist:
//!
//! - [`ErrorCode`] is what crosses the ABI: a small closed set of integers
//!   returned by every callback and reported by every entry point.
//! - [`BackendError`] is the VM-side view of a failed host callback.
//! - [`RustError`] is the failure of a whole invocation, as reported to the
//!   host through an entry point.

use std::any::Any;

use thiserror::Error;

use crate::memory::{assert_none, UnmanagedVector};

/// Status codes returned across the boundary.
///
/// 0 means success, every other value is some sort of error. Values read
/// from foreign code go through `From<i32>` because an out-of-range
/// discriminant must never be transmuted into this enum.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No error
    Success = 0,
    /// The host panicked for an unexpected reason
    Panic = 1,
    /// The host received a bad argument (null pointer, nil view, ...)
    BadArgument = 2,
    /// Ran out of gas while the host was metering the call
    OutOfGas = 3,
    /// Error while serializing data destined for the other side
    CannotSerialize = 4,
    /// The operation failed for a reason that should be fed back to the caller
    User = 5,
    /// Fallback for any value this enum does not know about
    Other = -1,
}

impl From<i32> for ErrorCode {
    fn from(n: i32) -> Self {
        match n {
            0 => ErrorCode::Success,
            1 => ErrorCode::Panic,
            2 => ErrorCode::BadArgument,
            3 => ErrorCode::OutOfGas,
            4 => ErrorCode::CannotSerialize,
            5 => ErrorCode::User,
            _ => ErrorCode::Other,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> i32 {
        code as i32
    }
}

impl ErrorCode {
    /// Returns true for [`ErrorCode::Success`].
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// Converts a callback status into a result, consuming the error message
    /// the callback may have written.
    ///
    /// The message vector is always destroyed, whatever the status. If the
    /// callback reported an error without a message, `default_error_msg`
    /// provides one.
    pub fn into_result<F>(
        self,
        error_msg: UnmanagedVector,
        default_error_msg: F,
    ) -> Result<(), BackendError>
    where
        F: FnOnce() -> String,
    {
        let error_msg = error_msg.consume();
        let read_error_msg = || -> String {
            match error_msg {
                Some(data) => String::from_utf8_lossy(&data).into(),
                None => default_error_msg(),
            }
        };

        match self {
            ErrorCode::Success => Ok(()),
            ErrorCode::Panic => Err(BackendError::foreign_panic()),
            ErrorCode::BadArgument => Err(BackendError::bad_argument()),
            ErrorCode::OutOfGas => Err(BackendError::out_of_gas()),
            ErrorCode::CannotSerialize => Err(BackendError::cannot_serialize(read_error_msg())),
            ErrorCode::User => Err(BackendError::user_err(read_error_msg())),
            ErrorCode::Other => Err(BackendError::unknown(read_error_msg())),
        }
    }
}

/// Failure of a host callback, as seen from the VM.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The host rejected an argument
    #[error("Bad argument")]
    BadArgument,

    /// The host ran out of gas while serving the callback
    #[error("Ran out of gas during call into backend")]
    OutOfGas,

    /// The host could not encode its answer
    #[error("Cannot serialize: {msg}")]
    CannotSerialize {
        /// Description from the host
        msg: String,
    },

    /// The host panicked while serving the callback
    #[error("Panic in FFI call")]
    ForeignPanic,

    /// An iterator id was used that the VM side does not know about
    #[error("Iterator with ID {id} does not exist")]
    IteratorDoesNotExist {
        /// The unknown iterator index
        id: u64,
    },

    /// A capability table was not provided for this invocation
    #[error("Capability not available: {capability}")]
    Unavailable {
        /// The missing capability
        capability: &'static str,
    },

    /// The operation itself failed on the host
    #[error("User error during call into backend: {msg}")]
    UserErr {
        /// Description from the host
        msg: String,
    },

    /// Anything else
    #[error("Unknown error during call into backend: {msg}")]
    Unknown {
        /// Description of the problem
        msg: String,
    },
}

impl BackendError {
    /// Creates [`BackendError::BadArgument`]
    pub fn bad_argument() -> Self {
        BackendError::BadArgument
    }

    /// Creates [`BackendError::OutOfGas`]
    pub fn out_of_gas() -> Self {
        BackendError::OutOfGas
    }

    /// Creates [`BackendError::CannotSerialize`]
    pub fn cannot_serialize(msg: impl Into<String>) -> Self {
        BackendError::CannotSerialize { msg: msg.into() }
    }

    /// Creates [`BackendError::ForeignPanic`]
    pub fn foreign_panic() -> Self {
        BackendError::ForeignPanic
    }

    /// Creates [`BackendError::IteratorDoesNotExist`]
    pub fn iterator_does_not_exist(id: u64) -> Self {
        BackendError::IteratorDoesNotExist { id }
    }

    /// Creates [`BackendError::Unavailable`]
    pub fn unavailable(capability: &'static str) -> Self {
        BackendError::Unavailable { capability }
    }

    /// Creates [`BackendError::UserErr`]
    pub fn user_err(msg: impl Into<String>) -> Self {
        BackendError::UserErr { msg: msg.into() }
    }

    /// Creates [`BackendError::Unknown`]
    pub fn unknown(msg: impl Into<String>) -> Self {
        BackendError::Unknown { msg: msg.into() }
    }
}

/// Result of a host callback
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failure of a whole invocation, reported through an entry point.
#[derive(Debug, Error)]
pub enum RustError {
    /// Bytes could not be decoded as UTF-8
    #[error("Cannot decode UTF8 bytes into string: {msg}")]
    InvalidUtf8 {
        /// Decoder message
        msg: String,
    },

    /// The invocation exhausted its gas
    #[error("Ran out of gas")]
    OutOfGas,

    /// The engine panicked
    #[error("Caught panic")]
    Panic,

    /// A required pointer or view was null
    #[error("Null/Nil argument: {name}")]
    UnsetArg {
        /// Name of the argument
        name: String,
    },

    /// The engine rejected the request
    #[error("VM error: {msg}")]
    VmError {
        /// Description from the engine
        msg: String,
    },

    /// Execution aborted with an abort code
    #[error("VM aborted: location={location}, code={code}")]
    Aborted {
        /// Where the abort happened
        location: String,
        /// Abort code
        code: u64,
    },

    /// A host callback failed
    #[error("failure occurred from backend: {msg}")]
    BackendFailure {
        /// Description of the backend failure
        msg: String,
    },

    /// The engine does not implement this entry point
    #[error("unimplemented: {msg}")]
    Unimplemented {
        /// Name of the missing functionality
        msg: String,
    },
}

impl RustError {
    /// Creates [`RustError::InvalidUtf8`]
    pub fn invalid_utf8<S: ToString>(msg: S) -> Self {
        RustError::InvalidUtf8 {
            msg: msg.to_string(),
        }
    }

    /// Creates [`RustError::OutOfGas`]
    pub fn out_of_gas() -> Self {
        RustError::OutOfGas
    }

    /// Creates [`RustError::Panic`]
    pub fn panic() -> Self {
        RustError::Panic
    }

    /// Creates [`RustError::UnsetArg`]
    pub fn unset_arg<T: Into<String>>(name: T) -> Self {
        RustError::UnsetArg { name: name.into() }
    }

    /// Creates [`RustError::VmError`]
    pub fn vm_err<S: ToString>(msg: S) -> Self {
        RustError::VmError {
            msg: msg.to_string(),
        }
    }

    /// Creates [`RustError::Aborted`]
    pub fn aborted<S: ToString>(location: S, code: u64) -> Self {
        RustError::Aborted {
            location: location.to_string(),
            code,
        }
    }

    /// Creates [`RustError::BackendFailure`]
    pub fn backend_failure<S: ToString>(msg: S) -> Self {
        RustError::BackendFailure {
            msg: msg.to_string(),
        }
    }

    /// Creates [`RustError::Unimplemented`]
    pub fn unimplemented<S: ToString>(msg: S) -> Self {
        RustError::Unimplemented {
            msg: msg.to_string(),
        }
    }

    /// The status code the host receives for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            RustError::OutOfGas => ErrorCode::OutOfGas,
            RustError::Panic => ErrorCode::Panic,
            RustError::UnsetArg { .. } => ErrorCode::BadArgument,
            RustError::InvalidUtf8 { .. } => ErrorCode::CannotSerialize,
            RustError::VmError { .. }
            | RustError::Aborted { .. }
            | RustError::BackendFailure { .. }
            | RustError::Unimplemented { .. } => ErrorCode::User,
        }
    }
}

impl From<BackendError> for RustError {
    fn from(source: BackendError) -> Self {
        match source {
            BackendError::OutOfGas => RustError::out_of_gas(),
            BackendError::ForeignPanic => RustError::panic(),
            other => RustError::backend_failure(other),
        }
    }
}

impl From<std::str::Utf8Error> for RustError {
    fn from(source: std::str::Utf8Error) -> Self {
        RustError::invalid_utf8(source)
    }
}

impl From<std::string::FromUtf8Error> for RustError {
    fn from(source: std::string::FromUtf8Error) -> Self {
        RustError::invalid_utf8(source)
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Records a successful invocation in the status slot.
pub fn clear_error(status: Option<&mut i32>) {
    if let Some(status) = status {
        *status = ErrorCode::Success.into();
    }
}

/// Records a failed invocation: the status code goes to `status` and the
/// message to `error_msg`.
///
/// # Panics
///
/// Panics if `error_msg` already holds an old message. Error message slots
/// must not be reused across calls.
pub fn set_error(err: RustError, status: Option<&mut i32>, error_msg: Option<&mut UnmanagedVector>) {
    if let Some(error_msg) = error_msg {
        assert_none(error_msg);
        let msg: Vec<u8> = err.to_string().into();
        *error_msg = UnmanagedVector::new(Some(msg));
    }
    // A nil message pointer is tolerated; the status alone still tells the
    // host what happened.

    if let Some(status) = status {
        *status = err.code().into();
    }
}

/// If `result` is Ok, returns the binary representation of the value and
/// records success. Otherwise returns an empty vector and records the error.
pub fn handle_c_error_binary<T>(
    result: Result<T, RustError>,
    status: Option<&mut i32>,
    error_msg: Option<&mut UnmanagedVector>,
) -> Vec<u8>
where
    T: Into<Vec<u8>>,
{
    match result {
        Ok(value) => {
            clear_error(status);
            value.into()
        }
        Err(error) => {
            log::debug!("invocation failed: {error}");
            set_error(error, status, error_msg);
            Vec::new()
        }
    }
}

/// If `result` is Ok, returns the value and records success. Otherwise
/// returns the default value and records the error.
pub fn handle_c_error_default<T>(
    result: Result<T, RustError>,
    status: Option<&mut i32>,
    error_msg: Option<&mut UnmanagedVector>,
) -> T
where
    T: Default,
{
    match result {
        Ok(value) => {
            clear_error(status);
            value
        }
        Err(error) => {
            log::debug!("invocation failed: {error}");
            set_error(error, status, error_msg);
            Default::default()
        }
    }
}
