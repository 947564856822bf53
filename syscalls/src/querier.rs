//! Querier callbacks
//!
//! Answers opaque queries from the VM. The answer, or the reason the host
//! refused the query, is wrapped in a `QueryResponse` envelope.

use nova_program_runtime::error::ErrorCode;
use nova_program_runtime::memory::{assert_none, write_output, U8SliceView, UnmanagedVector};
use nova_program_runtime::querier::{querier_t, HostQuerier, QuerierVtable, QueryResponse};

use crate::callback_names;
use crate::recovery::recover_panic;

/// Answers queries on behalf of the host
pub trait Querier {
    /// Answer `request`; an error is handed back to the VM as a refusal
    fn query(&self, request: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Host state behind a [`HostQuerier`] table
pub struct QuerierState<'a> {
    /// The querier
    pub querier: &'a dyn Querier,
}

impl<'a> QuerierState<'a> {
    /// Wraps `querier`
    pub fn new(querier: &'a dyn Querier) -> Self {
        QuerierState { querier }
    }
}

/// Builds the [`HostQuerier`] handed to the VM for one invocation
pub fn build_querier(state: &QuerierState<'_>) -> HostQuerier {
    HostQuerier {
        state: state as *const QuerierState<'_> as *const querier_t,
        vtable: QuerierVtable {
            query_external: Some(query_external),
        },
    }
}

/// Host side of `query_external`
pub extern "C" fn query_external(
    querier: *const querier_t,
    request: U8SliceView,
    result_out: *mut UnmanagedVector,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::QUERY_EXTERNAL, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(result_out), Some(err_out)) = (unsafe {
            (
                (querier as *const QuerierState<'_>).as_ref(),
                result_out.as_mut(),
                err_out.as_mut(),
            )
        }) else {
            return ErrorCode::BadArgument;
        };
        assert_none(result_out);
        assert_none(err_out);
        let Some(request) = request.read() else {
            return ErrorCode::BadArgument;
        };

        let response = match state.querier.query(request) {
            Ok(answer) => QueryResponse::Ok(answer),
            Err(err) => QueryResponse::Err(err.to_string()),
        };
        match response.encode() {
            Ok(bytes) => {
                write_output(result_out, Some(bytes));
                ErrorCode::Success
            }
            Err(err) => {
                write_output(err_out, Some(err.to_string().into_bytes()));
                ErrorCode::CannotSerialize
            }
        }
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_program_runtime::error::BackendError;
    use nova_program_runtime::querier::VmQuerier;
    use nova_program_runtime::storage::QueryResolver;

    struct Echo;

    impl Querier for Echo {
        fn query(&self, request: &[u8]) -> anyhow::Result<Vec<u8>> {
            if request.is_empty() {
                anyhow::bail!("empty query");
            }
            Ok(request.to_vec())
        }
    }

    #[test]
    fn test_query_external() {
        let echo = Echo;
        let state = QuerierState::new(&echo);
        let querier = VmQuerier::new(build_querier(&state)).unwrap();

        assert_eq!(querier.query_raw(b"balance").unwrap(), b"balance".to_vec());
        assert_eq!(
            querier.query_raw(b""),
            Err(BackendError::user_err("empty query"))
        );
    }

    #[test]
    fn test_nil_request() {
        let echo = Echo;
        let state = QuerierState::new(&echo);
        let api = build_querier(&state);
        let mut out = UnmanagedVector::default();
        let mut err = UnmanagedVector::default();
        let code = query_external(api.state, U8SliceView::new(None), &mut out, &mut err);
        assert_eq!(ErrorCode::from(code), ErrorCode::BadArgument);
        assert!(out.is_none());
    }
}
