//! Command model.
//!
//! A [`Command`] is built once and never changes after it has been enqueued.
//! Fields are private; the worker consumes the command through
//! [`Command::complete`].

use crate::error::{DispatchError, Result};
use handbus_core::RegisterRange;
use handbus_core::constants::REG_CLEAR_ERROR;
use std::fmt;
use tokio::sync::oneshot;

/// Scheduling lane of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Normal,
    /// Serviced before every waiting normal command. Reserved for the
    /// emergency-open path.
    Urgent,
}

/// What a command does on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Write {
        range: RegisterRange,
        values: Vec<u16>,
    },
    Read {
        range: RegisterRange,
    },
    ClearErrors,
}

impl CommandKind {
    /// Registers touched by this command.
    pub fn range(&self) -> RegisterRange {
        match self {
            Self::Write { range, .. } | Self::Read { range } => *range,
            Self::ClearErrors => RegisterRange::single(REG_CLEAR_ERROR),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Write { range, .. } => write!(f, "write {range}"),
            Self::Read { range } => write!(f, "read {range}"),
            Self::ClearErrors => f.write_str("clear-errors"),
        }
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Written,
    Registers(Vec<u16>),
    Cleared,
}

impl CommandOutput {
    /// Register values of a read.
    ///
    /// # Errors
    /// Returns `DispatchError::UnexpectedReply` for any other output.
    pub fn into_registers(self) -> Result<Vec<u16>> {
        match self {
            Self::Registers(values) => Ok(values),
            _ => Err(DispatchError::UnexpectedReply {
                expected: "register values",
            }),
        }
    }
}

/// Sending half of a command's result channel.
pub type ReplySender = oneshot::Sender<Result<CommandOutput>>;

/// Receiving half of a command's result channel.
pub type ReplyReceiver = oneshot::Receiver<Result<CommandOutput>>;

/// A unit of bus work.
#[derive(Debug)]
pub struct Command {
    kind: CommandKind,
    priority: Priority,
    label: Option<String>,
    reply: Option<ReplySender>,
}

impl Command {
    fn from_kind(kind: CommandKind) -> Self {
        Self {
            kind,
            priority: Priority::Normal,
            label: None,
            reply: None,
        }
    }

    /// Write `values` to `range`.
    ///
    /// # Errors
    /// Returns `DispatchError::Invalid` if the value count does not match the
    /// range or exceeds one write request.
    pub fn write(range: RegisterRange, values: Vec<u16>) -> Result<Self> {
        range.check_write(&values)?;
        Ok(Self::from_kind(CommandKind::Write { range, values }))
    }

    pub fn read(range: RegisterRange) -> Self {
        Self::from_kind(CommandKind::Read { range })
    }

    pub fn clear_errors() -> Self {
        Self::from_kind(CommandKind::ClearErrors)
    }

    /// Move this command to the urgent lane.
    #[must_use]
    pub fn urgent(mut self) -> Self {
        self.priority = Priority::Urgent;
        self
    }

    /// Attach a human-readable origin, used in log lines.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a result channel and return its receiving half.
    #[must_use]
    pub fn with_reply(mut self) -> (Self, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn range(&self) -> RegisterRange {
        self.kind.range()
    }

    /// Whether a caller is waiting for the outcome.
    pub fn wants_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Consume the command, delivering `result` to its caller if one waits.
    ///
    /// Returns `false` when the outcome had nowhere to go: the command was
    /// fire-and-forget, or the caller stopped waiting.
    pub fn complete(self, result: Result<CommandOutput>) -> bool {
        match self.reply {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({label})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
