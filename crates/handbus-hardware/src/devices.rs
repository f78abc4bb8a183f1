//! Enum wrapper for transport dispatch.
//!
//! Native `async fn` in traits (RPITIT, Edition 2024) is not object-safe, so
//! `Box<dyn ModbusTransport>` is not available. [`AnyTransport`] gives the
//! dispatch worker one concrete type to own and spawn, whichever link is
//! configured at runtime.
//!
//! # Examples
//!
//! ```
//! use handbus_hardware::devices::AnyTransport;
//! use handbus_hardware::mock::MockTransport;
//!
//! let (transport, _handle) = MockTransport::new();
//! let any_transport = AnyTransport::Mock(transport);
//! ```

use crate::Result;
use crate::mock::MockTransport;
#[cfg(feature = "rtu")]
use crate::rtu::RtuTransport;
use crate::traits::ModbusTransport;
use handbus_core::SlaveId;

/// Enum wrapper for transport dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// Simulated hand for development and testing.
    Mock(MockTransport),

    /// Modbus RTU over a local serial port.
    #[cfg(feature = "rtu")]
    Rtu(RtuTransport),
}

impl ModbusTransport for AnyTransport {
    async fn read_holding_registers(
        &mut self,
        slave: SlaveId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        match self {
            Self::Mock(transport) => transport.read_holding_registers(slave, start, count).await,
            #[cfg(feature = "rtu")]
            Self::Rtu(transport) => transport.read_holding_registers(slave, start, count).await,
        }
    }

    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> Result<()> {
        match self {
            Self::Mock(transport) => transport.write_registers(slave, start, values).await,
            #[cfg(feature = "rtu")]
            Self::Rtu(transport) => transport.write_registers(slave, start, values).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Mock(transport) => transport.describe(),
            #[cfg(feature = "rtu")]
            Self::Rtu(transport) => transport.describe(),
        }
    }
}

impl From<MockTransport> for AnyTransport {
    fn from(transport: MockTransport) -> Self {
        Self::Mock(transport)
    }
}

#[cfg(feature = "rtu")]
impl From<RtuTransport> for AnyTransport {
    fn from(transport: RtuTransport) -> Self {
        Self::Rtu(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_transport_forwards_to_mock() {
        let (transport, handle) = MockTransport::new();
        let mut any_transport = AnyTransport::from(transport);

        any_transport
            .write_registers(SlaveId::default(), 1486, &[500; 6])
            .await
            .unwrap();
        let angles = any_transport
            .read_holding_registers(SlaveId::default(), 1546, 6)
            .await
            .unwrap();

        assert_eq!(angles, vec![500; 6]);
        assert_eq!(handle.call_count(), 2);
        assert_eq!(any_transport.describe(), "mock:Mock Bus");
    }
}
