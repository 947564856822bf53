//! The engine seam
//!
//! The bytecode interpreter itself is not part of this crate. Whatever runs
//! the code implements [`Engine`] and receives an [`InvokeContext`] through
//! which every host interaction goes. Payloads are opaque byte buffers.

use crate::error::RustError;
use crate::invoke_context::InvokeContext;
use crate::storage::Storage;

/// Result of an entry point: opaque output bytes
pub type EngineResult = Result<Vec<u8>, RustError>;

/// A VM implementation driven through the exported entry points
///
/// The `decode_*` methods are optional and default to
/// [`RustError::Unimplemented`].
pub trait Engine: Send {
    /// Initialize the chain with the genesis module bundle
    fn initialize(&mut self, ctx: &mut InvokeContext<'_>, module_bundle: &[u8]) -> EngineResult;

    /// Publish a module bundle on behalf of `sender`
    fn publish_module_bundle(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        session_id: &[u8],
        sender: &[u8],
        module_bundle: &[u8],
    ) -> EngineResult;

    /// Run an entry function of a published module
    fn execute_entry_function(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        session_id: &[u8],
        sender: &[u8],
        payload: &[u8],
    ) -> EngineResult;

    /// Run a script
    fn execute_script(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        session_id: &[u8],
        sender: &[u8],
        payload: &[u8],
    ) -> EngineResult;

    /// Run an entry function without committing any writes
    fn query_entry_function(&mut self, ctx: &mut InvokeContext<'_>, payload: &[u8]) -> EngineResult;

    /// Render a stored resource in a host readable form
    fn decode_move_resource(
        &mut self,
        _storage: &dyn Storage,
        _struct_tag: &[u8],
        _resource_bytes: &[u8],
    ) -> EngineResult {
        Err(RustError::unimplemented("decode_move_resource"))
    }

    /// Render module bytecode in a host readable form
    fn decode_module_bytes(&mut self, _module_bytes: &[u8]) -> EngineResult {
        Err(RustError::unimplemented("decode_module_bytes"))
    }

    /// Render script bytecode in a host readable form
    fn decode_script_bytes(&mut self, _script_bytes: &[u8]) -> EngineResult {
        Err(RustError::unimplemented("decode_script_bytes"))
    }
}
