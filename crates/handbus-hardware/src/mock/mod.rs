//! Mock transport for testing and development.
//!
//! The mock simulates a whole hand behind a Modbus link, so the dispatch
//! layer can be exercised without a serial port.

pub mod transport;

pub use transport::{CallKind, MockTransport, MockTransportHandle, TransportCall};
