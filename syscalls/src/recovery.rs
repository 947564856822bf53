//! Fault translation for host callbacks
//!
//! A panic must never unwind across the boundary. Every callback body runs
//! inside [`recover_panic`], which turns a caught panic into an
//! [`ErrorCode`]:
//!
//! - an [`OutOfGas`] payload becomes `ErrorCode::OutOfGas`;
//! - anything else, [`GasOverflow`] included, becomes `ErrorCode::Panic` and
//!   is logged with a backtrace. An overflowing meter is a host bug, not an
//!   exhausted budget.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};

use nova_program_runtime::error::{panic_payload_text, ErrorCode};

/// Panic payload raised when a gas meter runs out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfGas {
    /// What was being charged
    pub descriptor: String,
}

/// Panic payload raised when adding to a gas meter overflows
///
/// Reported as `ErrorCode::Panic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasOverflow {
    /// What was being charged
    pub descriptor: String,
}

/// Runs a callback body and converts any panic into an error code
///
/// # Arguments
/// * `name` - Callback name, used in log output
/// * `body` - The callback body
pub fn recover_panic<F>(name: &str, body: F) -> ErrorCode
where
    F: FnOnce() -> ErrorCode,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(code) => code,
        Err(payload) => translate_panic(name, payload.as_ref()),
    }
}

/// Classifies a caught panic payload
pub fn translate_panic(name: &str, payload: &(dyn Any + Send)) -> ErrorCode {
    if let Some(out_of_gas) = payload.downcast_ref::<OutOfGas>() {
        log::debug!("{name}: out of gas in {}", out_of_gas.descriptor);
        return ErrorCode::OutOfGas;
    }

    log::error!(
        "Panic in {name}: {}\n{}",
        panic_message(payload),
        Backtrace::force_capture()
    );
    ErrorCode::Panic
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(overflow) = payload.downcast_ref::<GasOverflow>() {
        format!("gas overflow in {}", overflow.descriptor)
    } else {
        panic_payload_text(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::GasMeter;
    use std::panic::panic_any;

    #[test]
    fn test_success_passes_through() {
        assert_eq!(recover_panic("ok", || ErrorCode::Success), ErrorCode::Success);
        assert_eq!(recover_panic("user", || ErrorCode::User), ErrorCode::User);
    }

    #[test]
    fn test_out_of_gas_payload() {
        let code = recover_panic("read", || {
            panic_any(OutOfGas {
                descriptor: "get".to_string(),
            })
        });
        assert_eq!(code, ErrorCode::OutOfGas);
    }

    #[test]
    fn test_gas_overflow_payload_is_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let code = recover_panic("write", || {
            panic_any(GasOverflow {
                descriptor: "set".to_string(),
            })
        });
        assert_eq!(code, ErrorCode::Panic);
    }

    #[test]
    fn test_overflowing_meter_is_panic() {
        let meter = GasMeter::new(u64::MAX);
        meter.consume_gas(u64::MAX, "fill");
        let code = recover_panic("read", || {
            meter.consume_gas(1, "get");
            ErrorCode::Success
        });
        assert_eq!(code, ErrorCode::Panic);
    }

    #[test]
    fn test_unrelated_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let code = recover_panic("scan", || panic!("index out of bounds"));
        assert_eq!(code, ErrorCode::Panic);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(GasOverflow {
            descriptor: "set".to_string(),
        });
        assert_eq!(panic_message(payload.as_ref()), "gas overflow in set");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
