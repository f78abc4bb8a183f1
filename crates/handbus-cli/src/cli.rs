//! Command-line arguments.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Parser;
use handbus_core::SlaveId;
use std::path::PathBuf;

/// Drive a robotic hand from the keyboard over Modbus RTU.
///
/// Type a key and press enter; `q` or `esc` opens the hand and exits.
#[derive(Parser, Debug)]
#[command(name = "handbus", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial port, or "mock" for the simulated hand
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Modbus slave address of the hand
    #[arg(long)]
    pub slave: Option<u8>,

    /// Speed applied to every finger at startup (0-1000)
    #[arg(long)]
    pub speed: Option<u16>,

    /// Force limit applied to every finger at startup (0-1000)
    #[arg(long)]
    pub force: Option<u16>,

    /// Do not sample feedback in the background
    #[arg(long)]
    pub no_poller: bool,

    /// Clear hardware faults as soon as the poller sees them
    #[arg(long)]
    pub auto_clear: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the available gestures and key bindings, then exit
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    /// Load the configuration file, if any, and apply the flags over it.
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.config.as_deref())?;
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(port) = &self.port {
            config.link.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(slave) = self.slave {
            config.link.slave_id = SlaveId::new(slave).context("--slave")?;
        }
        if let Some(speed) = self.speed {
            config.motion.speed = speed;
        }
        if let Some(force) = self.force {
            config.motion.force = force;
        }
        if self.no_poller {
            config.poller.enabled = false;
        }
        if self.auto_clear {
            config.poller.auto_clear = true;
        }
        Ok(())
    }
}
