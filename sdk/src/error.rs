//! Host-facing error type

use nova_program_runtime::error::ErrorCode;
use thiserror::Error;

/// Failure of a VM invocation, as seen by the host
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The invocation ran out of gas
    #[error("out of gas")]
    OutOfGas,

    /// The VM rejected or aborted the invocation
    #[error("vm error: {msg}")]
    Vm {
        /// Message from the VM
        msg: String,
    },

    /// The VM caught a panic
    #[error("panic in vm: {msg}")]
    Panic {
        /// Message from the VM
        msg: String,
    },

    /// A required argument was missing
    #[error("bad argument: {msg}")]
    BadArgument {
        /// Message from the VM
        msg: String,
    },

    /// Data could not be encoded or decoded
    #[error("serialization error: {msg}")]
    Serialization {
        /// Message from the VM
        msg: String,
    },

    /// Status code this SDK does not know
    #[error("unknown error (code {code}): {msg}")]
    Other {
        /// Raw status code
        code: i32,
        /// Message from the VM
        msg: String,
    },
}

/// Result alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Converts the status and error message written by an entry point
    ///
    /// Returns `Ok(())` for a success status; the message is ignored then.
    pub fn from_status(status: i32, errmsg: Option<Vec<u8>>) -> Result<()> {
        let msg = || {
            errmsg
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default()
                .into_owned()
        };
        match ErrorCode::from(status) {
            ErrorCode::Success => Ok(()),
            ErrorCode::OutOfGas => Err(Error::OutOfGas),
            ErrorCode::Panic => Err(Error::Panic { msg: msg() }),
            ErrorCode::BadArgument => Err(Error::BadArgument { msg: msg() }),
            ErrorCode::CannotSerialize => Err(Error::Serialization { msg: msg() }),
            ErrorCode::User => Err(Error::Vm { msg: msg() }),
            ErrorCode::Other => Err(Error::Other {
                code: status,
                msg: msg(),
            }),
        }
    }

    /// The status code this error stands for
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::OutOfGas => ErrorCode::OutOfGas,
            Error::Vm { .. } => ErrorCode::User,
            Error::Panic { .. } => ErrorCode::Panic,
            Error::BadArgument { .. } => ErrorCode::BadArgument,
            Error::Serialization { .. } => ErrorCode::CannotSerialize,
            Error::Other { .. } => ErrorCode::Other,
        }
    }
}
