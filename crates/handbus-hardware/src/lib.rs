//! Modbus transport layer for the handbus controller.
//!
//! This crate owns the bottom edge of the stack: one Modbus transaction at a
//! time against a slave on an RS-485 link. Ordering, retries and arbitration
//! live one layer up in `handbus-dispatch`.
//!
//! # Transports
//!
//! - [`MockTransport`](mock::MockTransport): an in-memory hand with a full
//!   register bank, scripted failures and a transaction log
//! - [`RtuTransport`](rtu::RtuTransport): Modbus RTU over a serial port,
//!   behind the default `rtu` feature
//!
//! Both are wrapped by [`AnyTransport`](devices::AnyTransport) so the caller
//! can pick one at runtime.
//!
//! # Example
//!
//! ```
//! use handbus_core::SlaveId;
//! use handbus_hardware::{AnyTransport, ModbusTransport, mock::MockTransport};
//!
//! #[tokio::main]
//! async fn main() -> handbus_hardware::Result<()> {
//!     let (transport, _handle) = MockTransport::new();
//!     let mut transport = AnyTransport::from(transport);
//!
//!     let temps = transport
//!         .read_holding_registers(SlaveId::default(), 1618, 6)
//!         .await?;
//!     assert_eq!(temps.len(), 6);
//!     Ok(())
//! }
//! ```

pub mod devices;
pub mod error;
pub mod mock;
#[cfg(feature = "rtu")]
pub mod rtu;
pub mod traits;
pub mod types;

pub use devices::AnyTransport;
pub use error::{Result, TransportError};
pub use traits::ModbusTransport;
pub use types::LinkSettings;

/// Open the transport named by `settings`.
///
/// The port name `mock` selects the simulated hand.
///
/// # Errors
///
/// Returns `TransportError::PortUnavailable` if the serial port cannot be
/// opened, or if a serial port is requested without the `rtu` feature.
pub fn open_transport(settings: &LinkSettings) -> Result<AnyTransport> {
    if settings.port.eq_ignore_ascii_case("mock") {
        let (transport, _handle) = mock::MockTransport::new();
        return Ok(AnyTransport::Mock(transport));
    }

    #[cfg(feature = "rtu")]
    {
        rtu::RtuTransport::open(settings).map(AnyTransport::Rtu)
    }

    #[cfg(not(feature = "rtu"))]
    {
        Err(TransportError::port_unavailable(
            &settings.port,
            "serial support not compiled in (enable the `rtu` feature)",
        ))
    }
}
