// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::Error;
use embedded_io::Write;
use embedded_storage::nor_flash::ReadNorFlash;
use update_protocol::FirmwareMetadata;

/// Longest release message read back from flash.
pub const RELEASE_MESSAGE_MAX: u32 = 1024;

/// Flash placement of the metadata page and firmware region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Start of the page holding the metadata word.
    pub metadata_addr: u32,
    /// Start of the firmware region, also the firmware vector table.
    pub firmware_base: u32,
    /// Size of the firmware region, release message included.
    pub firmware_capacity: u32,
}

impl Layout {
    pub fn entry_point(&self) -> EntryPoint {
        EntryPoint {
            vector_table: self.firmware_base,
        }
    }

    pub fn firmware_end(&self) -> u32 {
        self.firmware_base + self.firmware_capacity
    }

    /// Location of the release message of an image described by `meta`.
    pub fn release_message(&self, meta: &FirmwareMetadata) -> ReleaseMessage {
        ReleaseMessage {
            addr: self.firmware_base + u32::from(meta.size),
            end: self.firmware_end(),
        }
    }
}

/// Where control is handed over to the installed firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EntryPoint {
    vector_table: u32,
}

impl EntryPoint {
    /// Base of the firmware image.
    pub fn vector_table(&self) -> u32 {
        self.vector_table
    }

    /// Branch target with the Thumb bit set, as required by `bx` on Cortex-M.
    pub fn address(&self) -> u32 {
        self.vector_table | 1
    }
}

/// Hands control to the installed firmware. Implemented by the board.
pub trait Launcher {
    /// Never returns. There is no check that valid firmware is installed.
    fn launch(&mut self, entry: EntryPoint) -> !;
}

/// NUL-terminated string stored right after the firmware payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReleaseMessage {
    addr: u32,
    end: u32,
}

impl ReleaseMessage {
    pub fn addr(&self) -> u32 {
        self.addr
    }

    /// Copy the message to `out`, followed by a newline.
    ///
    /// Stops at a NUL byte, an erased byte, the end of the firmware region or
    /// after [`RELEASE_MESSAGE_MAX`] bytes, whichever comes first. Returns the
    /// number of message bytes written.
    pub fn emit<F: ReadNorFlash, W: Write>(&self, flash: &mut F, out: &mut W) -> Result<usize, Error> {
        let flash_end = u32::try_from(flash.capacity()).unwrap_or(u32::MAX);
        let end = self.end.min(flash_end).min(self.addr.saturating_add(RELEASE_MESSAGE_MAX));

        let mut chunk = [0u8; 32];
        let mut pos = self.addr;
        let mut written = 0;
        'read: while pos < end {
            let len = chunk.len().min((end - pos) as usize);
            flash.read(pos, &mut chunk[..len]).map_err(|_| Error::StorageFailure)?;
            let text_len = chunk[..len]
                .iter()
                .position(|&b| b == 0x00 || b == 0xFF)
                .unwrap_or(len);
            out.write_all(&chunk[..text_len]).map_err(|_| Error::Transport)?;
            written += text_len;
            if text_len < len {
                break 'read;
            }
            pos += len as u32;
        }
        out.write_all(b"\n").map_err(|_| Error::Transport)?;
        Ok(written)
    }
}
