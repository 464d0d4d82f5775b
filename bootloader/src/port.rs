// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Blocking byte channels used by the update core.

use embassy_nrf::uarte::{self, Uarte};
use embassy_nrf::peripherals::UARTE0;

/// Largest EasyDMA transfer issued for one read.
const DMA_CHUNK: usize = 255;

#[derive(Debug, defmt::Format)]
pub struct PortError(uarte::Error);

impl embedded_io::Error for PortError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Host link on UARTE0.
pub struct HostPort<'d> {
    uart: Uarte<'d, UARTE0>,
}

impl<'d> HostPort<'d> {
    pub fn new(uart: Uarte<'d, UARTE0>) -> Self {
        Self { uart }
    }
}

impl embedded_io::ErrorType for HostPort<'_> {
    type Error = PortError;
}

impl embedded_io::Read for HostPort<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(DMA_CHUNK);
        if len == 0 {
            return Ok(0);
        }
        self.uart.blocking_read(&mut buf[..len]).map_err(PortError)?;
        Ok(len)
    }
}

impl embedded_io::Write for HostPort<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(DMA_CHUNK);
        if len == 0 {
            return Ok(0);
        }
        self.uart.blocking_write(&buf[..len]).map_err(PortError)?;
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // blocking_write returns once the transfer has ended.
        Ok(())
    }
}

/// Diagnostic output, printed through defmt.
pub struct Diag;

impl embedded_io::ErrorType for Diag {
    type Error = core::convert::Infallible;
}

impl embedded_io::Write for Diag {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if !buf.is_empty() {
            defmt::println!("{=[u8]:a}", buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
