//! Modbus RTU transport over a local serial port.
//!
//! The frame format is 8N1 with no flow control. Every transaction is bounded
//! by the link's response timeout; the underlying client has none of its own.

use crate::{Result, TransportError, traits::ModbusTransport, types::LinkSettings};
use handbus_core::SlaveId;
use std::time::Duration;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use tracing::{debug, info, trace};

/// Modbus RTU client bound to one serial port.
pub struct RtuTransport {
    ctx: Context,
    port: String,
    baud_rate: u32,
    response_timeout: Duration,
}

impl RtuTransport {
    /// Open the serial port described by `settings`.
    ///
    /// Must be called from within a Tokio runtime; the port is registered with
    /// the runtime's reactor.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::PortUnavailable` if the port cannot be opened.
    pub fn open(settings: &LinkSettings) -> Result<Self> {
        let builder = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);

        let stream = SerialStream::open(&builder)
            .map_err(|e| TransportError::port_unavailable(&settings.port, e.to_string()))?;

        let ctx = rtu::attach_slave(stream, Slave(settings.slave_id.as_u8()));

        info!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            slave = settings.slave_id.as_u8(),
            "Serial link opened"
        );

        Ok(Self {
            ctx,
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            response_timeout: settings.response_timeout(),
        })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.response_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for RtuTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuTransport")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

/// Map a client-level failure onto the transaction error taxonomy.
fn map_client_error(error: tokio_modbus::Error, slave: SlaveId, port: &str) -> TransportError {
    #[allow(unreachable_patterns)]
    match error {
        tokio_modbus::Error::Transport(io) => match io.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::no_response(slave.as_u8(), io.to_string())
            }
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                TransportError::malformed(io.to_string())
            }
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::BrokenPipe => TransportError::port_unavailable(port, io.to_string()),
            _ => TransportError::from(io),
        },
        tokio_modbus::Error::Protocol(protocol) => TransportError::malformed(protocol.to_string()),
        other => TransportError::malformed(other.to_string()),
    }
}

impl ModbusTransport for RtuTransport {
    async fn read_holding_registers(
        &mut self,
        slave: SlaveId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        trace!(slave = slave.as_u8(), start, count, "Reading holding registers");
        self.ctx.set_slave(Slave(slave.as_u8()));

        let response = tokio::time::timeout(
            self.response_timeout,
            self.ctx.read_holding_registers(start, count),
        )
        .await
        .map_err(|_| TransportError::timeout(self.timeout_ms()))?;

        let values = response
            .map_err(|e| map_client_error(e, slave, &self.port))?
            .map_err(|code| TransportError::exception(slave.as_u8(), format!("{code:?}")))?;

        if values.len() != usize::from(count) {
            debug!(
                expected = count,
                actual = values.len(),
                "Register count mismatch in response"
            );
            return Err(TransportError::malformed(format!(
                "expected {count} registers, got {}",
                values.len()
            )));
        }

        Ok(values)
    }

    async fn write_registers(&mut self, slave: SlaveId, start: u16, values: &[u16]) -> Result<()> {
        trace!(slave = slave.as_u8(), start, count = values.len(), "Writing registers");
        self.ctx.set_slave(Slave(slave.as_u8()));

        let response = tokio::time::timeout(
            self.response_timeout,
            self.ctx.write_multiple_registers(start, values),
        )
        .await
        .map_err(|_| TransportError::timeout(self.timeout_ms()))?;

        response
            .map_err(|e| map_client_error(e, slave, &self.port))?
            .map_err(|code| TransportError::exception(slave.as_u8(), format!("{code:?}")))
    }

    fn describe(&self) -> String {
        format!("rtu:{}@{}", self.port, self.baud_rate)
    }
}
