// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host side of the update protocol.

use {
    crate::package::{Package, Step},
    boot_core::update_protocol::{Command, Status},
    std::io::{ErrorKind, Read, Write},
};

/// Upload `package` to the bootloader listening on `port`.
///
/// Sends the update command, waits for its echo, then sends the transfer
/// step by step and waits for the status byte of each one. Once the last
/// step is acknowledged, a single extra byte reports a flash failure. Silence
/// or a closed port at that point means the firmware was programmed.
pub fn upload<P: Read + Write>(port: &mut P, package: &Package) -> Result<(), Error> {
    command(port, Command::Update)?;
    tracing::info!(
        "Uploading firmware version {}, {} bytes",
        package.metadata.version,
        package.metadata.size
    );

    let steps = package.steps();
    let total = steps.len();
    for (i, (step, bytes)) in steps.into_iter().enumerate() {
        port.write_all(&bytes).map_err(Error::Write)?;
        port.flush().map_err(Error::Write)?;
        let mut status = [0];
        port.read_exact(&mut status).map_err(|e| Error::Read(step, e))?;
        check(step, status[0])?;
        tracing::debug!("{step} accepted ({}/{total})", i + 1);
    }

    let mut trailing = [0];
    match port.read(&mut trailing) {
        Ok(0) => {}
        Ok(_) => check(Step::Commit, trailing[0])?,
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::UnexpectedEof) => {}
        Err(e) => return Err(Error::Read(Step::Commit, e)),
    }
    tracing::info!("Firmware installed");
    Ok(())
}

/// Ask the bootloader to start the installed firmware.
pub fn boot<P: Read + Write>(port: &mut P) -> Result<(), Error> {
    command(port, Command::Boot)?;
    tracing::info!("Firmware started");
    Ok(())
}

fn command<P: Read + Write>(port: &mut P, command: Command) -> Result<(), Error> {
    port.write_all(&[command.to_byte()]).map_err(Error::Write)?;
    port.flush().map_err(Error::Write)?;
    let mut echo = [0];
    port.read_exact(&mut echo).map_err(Error::Echo)?;
    if echo[0] != command.to_byte() {
        return Err(Error::UnexpectedEcho {
            sent: command.to_byte(),
            received: echo[0],
        });
    }
    Ok(())
}

fn check(step: Step, byte: u8) -> Result<(), Error> {
    match Status::try_from(byte) {
        Ok(Status::Ok) => Ok(()),
        Ok(status) => {
            tracing::error!("{step} rejected: {}", status.describe());
            Err(Error::Rejected(step, status))
        }
        Err(byte) => Err(Error::UnknownStatus(step, byte)),
    }
}

#[derive(Debug)]
pub enum Error {
    Echo(std::io::Error),
    Read(Step, std::io::Error),
    Rejected(Step, Status),
    UnexpectedEcho { sent: u8, received: u8 },
    UnknownStatus(Step, u8),
    Write(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Echo(e) => write!(f, "bootloader did not answer the command: {e}"),
            Error::Read(step, e) => write!(f, "no status for {step}: {e}"),
            Error::Rejected(step, status) => {
                write!(f, "bootloader rejected {step}: {}", status.describe())
            }
            Error::UnexpectedEcho { sent, received } => {
                write!(f, "sent command {sent:#04x}, bootloader echoed {received:#04x}")
            }
            Error::UnknownStatus(step, byte) => write!(f, "unknown status {byte:#04x} after {step}"),
            Error::Write(e) => write!(f, "failed to write to the serial port: {e}"),
        }
    }
}

impl std::error::Error for Error {}
