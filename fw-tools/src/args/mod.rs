// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    boot_core::update_protocol::TAG_SIZE,
    clap::Parser,
    std::{path::PathBuf, time::Duration},
};

mod cli;
mod config;

pub use config::{Error as ConfigError, Secrets};

/// Program arguments loaded from the CLI and the secrets file.
#[derive(Debug, Clone)]
pub enum Args {
    /// Generate a secrets file.
    Keygen { output: PathBuf, force: bool },
    /// Protect a firmware binary.
    Protect {
        secrets: Secrets,
        input: PathBuf,
        output: PathBuf,
        version: u16,
        frame_size: usize,
    },
    /// Dump a protected image.
    Dump {
        input: PathBuf,
        secrets: Option<Secrets>,
    },
    /// Upload a protected image.
    Update {
        port: String,
        baudrate: u32,
        input: PathBuf,
        timeout: Duration,
        boot: bool,
    },
}

pub fn args<I, T>(args: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Args::try_parse_from(args).map_err(Error::Cli)?;
    match cli.command {
        cli::Command::Keygen { output, force } => Ok(Args::Keygen { output, force }),
        cli::Command::Protect {
            secrets,
            input,
            output,
            firmware_version,
            frame_size,
        } => {
            // The frame length, tag included, travels as a u16.
            if frame_size == 0 || frame_size > usize::from(u16::MAX) - TAG_SIZE {
                return Err(Error::InvalidFrameSize(frame_size));
            }
            Ok(Args::Protect {
                secrets: Secrets::load(&secrets)?,
                input,
                output,
                version: firmware_version,
                frame_size,
            })
        }
        cli::Command::Dump { input, secrets } => Ok(Args::Dump {
            input,
            secrets: secrets.map(|s| Secrets::load(&s)).transpose()?,
        }),
        cli::Command::Update {
            port,
            baudrate,
            input,
            timeout_ms,
            boot,
        } => {
            if timeout_ms == 0 {
                return Err(Error::ZeroTimeout);
            }
            Ok(Args::Update {
                port,
                baudrate,
                input,
                timeout: Duration::from_millis(timeout_ms),
                boot,
            })
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Cli(clap::Error),
    Config(ConfigError),
    InvalidFrameSize(usize),
    ZeroTimeout,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cli(e) => write!(f, "{}", e.render().ansi()),
            Error::Config(e) => write!(f, "config error: {e}"),
            Error::InvalidFrameSize(size) => {
                write!(
                    f,
                    "invalid frame size {size}, expected 1 to {}",
                    usize::from(u16::MAX) - TAG_SIZE
                )
            }
            Error::ZeroTimeout => write!(f, "--timeout-ms must be greater than zero"),
        }
    }
}

impl std::error::Error for Error {}
