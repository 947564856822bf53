//! Querier capability table
//!
//! Requests and answers are opaque to this layer. The host wraps its answer
//! in a [`QueryResponse`] envelope so a query that the host handled but
//! refused can be told apart from a broken callback.

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult, ErrorCode};
use crate::memory::{U8SliceView, UnmanagedVector};
use crate::storage::QueryResolver;

/// Opaque querier state owned by the host
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct querier_t {
    _private: [u8; 0],
}

/// `query_external(querier, request, result_out, err_out)`
pub type QueryExternalFn = extern "C" fn(
    *const querier_t,
    U8SliceView,
    *mut UnmanagedVector, // result output
    *mut UnmanagedVector, // error message output
) -> i32;

/// Querier capability table
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct QuerierVtable {
    /// Answer an opaque request
    pub query_external: Option<QueryExternalFn>,
}

/// Querier capability
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct HostQuerier {
    /// Host state, null when the capability is not provided
    pub state: *const querier_t,
    /// Callbacks
    pub vtable: QuerierVtable,
}

impl HostQuerier {
    /// A table standing for "no querier"
    pub fn unavailable() -> Self {
        HostQuerier {
            state: std::ptr::null(),
            vtable: QuerierVtable::default(),
        }
    }
}

/// Envelope written by the host into the query result slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResponse {
    /// The query succeeded with this answer
    Ok(Vec<u8>),
    /// The host refused the query
    Err(String),
}

impl QueryResponse {
    /// Encodes the envelope with bincode
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decodes an envelope produced by [`QueryResponse::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// [`QueryResolver`] that calls through a [`HostQuerier`]
pub struct VmQuerier {
    querier: HostQuerier,
}

impl VmQuerier {
    /// Returns `None` when the host did not provide the capability
    pub fn new(querier: HostQuerier) -> Option<Self> {
        if querier.state.is_null() {
            None
        } else {
            Some(VmQuerier { querier })
        }
    }
}

impl QueryResolver for VmQuerier {
    fn query_raw(&self, request: &[u8]) -> BackendResult<Vec<u8>> {
        let query_external = self
            .querier
            .vtable
            .query_external
            .ok_or_else(|| BackendError::unknown("vtable function 'query_external' not set"))?;

        let mut output = UnmanagedVector::default();
        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = query_external(
            self.querier.state,
            U8SliceView::new(Some(request)),
            &mut output as *mut UnmanagedVector,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();
        let output = output.consume();

        let default = || "Failed to query another contract".to_string();
        code.into_result(error_msg, default)?;

        let bytes = output.ok_or_else(|| BackendError::unknown("Query response was empty"))?;
        match QueryResponse::decode(&bytes) {
            Ok(QueryResponse::Ok(answer)) => Ok(answer),
            Ok(QueryResponse::Err(msg)) => Err(BackendError::user_err(msg)),
            Err(e) => Err(BackendError::cannot_serialize(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::write_output;

    extern "C" fn answer(
        _querier: *const querier_t,
        request: U8SliceView,
        result_out: *mut UnmanagedVector,
        _err_out: *mut UnmanagedVector,
    ) -> i32 {
        let request = request.read().unwrap_or_default();
        let response = if request == b"ping" {
            QueryResponse::Ok(b"pong".to_vec())
        } else {
            QueryResponse::Err("unknown query".to_string())
        };
        let Ok(bytes) = response.encode() else {
            return ErrorCode::CannotSerialize.into();
        };
        unsafe { write_output(&mut *result_out, Some(bytes)) };
        ErrorCode::Success.into()
    }

    extern "C" fn garbage(
        _querier: *const querier_t,
        _request: U8SliceView,
        result_out: *mut UnmanagedVector,
        _err_out: *mut UnmanagedVector,
    ) -> i32 {
        unsafe { write_output(&mut *result_out, Some(vec![0xFF])) };
        ErrorCode::Success.into()
    }

    fn querier(query_external: QueryExternalFn) -> VmQuerier {
        VmQuerier::new(HostQuerier {
            state: std::ptr::NonNull::<querier_t>::dangling().as_ptr(),
            vtable: QuerierVtable {
                query_external: Some(query_external),
            },
        })
        .unwrap()
    }

    #[test]
    fn test_query_round_trip() {
        let querier = querier(answer);
        assert_eq!(querier.query_raw(b"ping").unwrap(), b"pong".to_vec());
        assert_eq!(
            querier.query_raw(b"other"),
            Err(BackendError::user_err("unknown query"))
        );
    }

    #[test]
    fn test_query_undecodable_response() {
        let querier = querier(garbage);
        assert!(matches!(
            querier.query_raw(b"ping"),
            Err(BackendError::CannotSerialize { .. })
        ));
    }

    #[test]
    fn test_unavailable_querier() {
        assert!(VmQuerier::new(HostQuerier::unavailable()).is_none());
    }
}
