//! Transport trait definition.
//!
//! The transport performs exactly one Modbus transaction per call. It is not
//! reentrant: callers must never have two calls outstanding on the same
//! transport. The `&mut self` receivers make that a compile-time property for
//! a single owner; the dispatch layer's bus arbiter is the single owner.
//!
//! All methods use native `async fn` (Edition 2024 RPITIT), eliminating the
//! need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use handbus_core::SlaveId;

/// One end of a Modbus link.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic parameters, or the
/// [`AnyTransport`](crate::devices::AnyTransport) enum wrapper when a
/// concrete type is needed (for example to spawn the dispatch worker).
///
/// # Examples
///
/// ```no_run
/// use handbus_core::SlaveId;
/// use handbus_hardware::traits::ModbusTransport;
/// use handbus_hardware::error::Result;
///
/// async fn read_angles<T: ModbusTransport>(transport: &mut T) -> Result<Vec<u16>> {
///     transport
///         .read_holding_registers(SlaveId::default(), 1546, 6)
///         .await
/// }
/// ```
pub trait ModbusTransport: Send {
    /// Read `count` holding registers starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The slave does not answer in time
    /// - The response is malformed or carries a Modbus exception
    /// - The port is unavailable
    async fn read_holding_registers(
        &mut self,
        slave: SlaveId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Write `values` to consecutive holding registers starting at `start`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`read_holding_registers`](Self::read_holding_registers).
    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> Result<()>;

    /// Short description of the link for log lines.
    fn describe(&self) -> String;
}
