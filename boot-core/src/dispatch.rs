// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::arena::Arena;
use crate::boot::{EntryPoint, Launcher, Layout, ReleaseMessage};
use crate::crypto::KeyMaterial;
use crate::fmt::{debug, info, warn};
use crate::metadata::MetadataStore;
use crate::session::UpdateSession;
use crate::Error;
use embedded_io::{Read, Write};
use embedded_storage::nor_flash::NorFlash;
use update_protocol::{Command, FirmwareMetadata};

const BANNER: &[u8] = b"Welcome to the secure update service!\n\
Send \"U\" to update, and \"B\" to run the firmware.\n";

/// Result of handling one host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The byte was not a command.
    Idle,
    /// A new firmware was installed, with the metadata now in the store.
    Updated(FirmwareMetadata),
    /// The update failed and its status was reported. The device must be reset.
    Reset(Error),
}

/// Top-level command loop of the bootloader.
///
/// Owns the host channel, the diagnostic channel, the flash and the launcher,
/// and borrows the key material and the accumulation arena.
pub struct Bootloader<'a, H, D, F, L, const N: usize> {
    host: H,
    diag: D,
    flash: F,
    launcher: L,
    keys: &'a KeyMaterial,
    layout: Layout,
    arena: &'a mut Arena<N>,
    release: Option<ReleaseMessage>,
}

impl<'a, H, D, F, L, const N: usize> Bootloader<'a, H, D, F, L, N>
where
    H: Read + Write,
    D: Write,
    F: NorFlash,
    L: Launcher,
{
    pub fn new(
        host: H,
        diag: D,
        flash: F,
        launcher: L,
        keys: &'a KeyMaterial,
        layout: Layout,
        arena: &'a mut Arena<N>,
    ) -> Self {
        let mut bootloader = Self {
            host,
            diag,
            flash,
            launcher,
            keys,
            layout,
            arena,
            release: None,
        };
        bootloader.locate_release_message();
        bootloader
    }

    /// Metadata of the installed firmware, `None` if the store was never written.
    pub fn installed(&mut self) -> Result<Option<FirmwareMetadata>, Error> {
        MetadataStore::new(self.layout.metadata_addr).read(&mut self.flash)
    }

    /// Location of the release message of the installed firmware.
    pub fn release_message(&self) -> Option<ReleaseMessage> {
        self.release
    }

    pub fn host(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn diag(&mut self) -> &mut D {
        &mut self.diag
    }

    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Print the usage banner on the diagnostic channel.
    pub fn banner(&mut self) -> Result<(), Error> {
        self.diag.write_all(BANNER).map_err(|_| Error::Transport)?;
        self.diag.flush().map_err(|_| Error::Transport)
    }

    /// Wait for one command byte from the host and handle it.
    ///
    /// Does not return when the command is a boot request.
    pub fn poll(&mut self) -> Outcome {
        let mut byte = [0];
        if self.host.read_exact(&mut byte).is_err() {
            return Outcome::Reset(Error::Transport);
        }
        match Command::try_from(byte[0]) {
            Ok(Command::Update) => {
                if let Err(e) = self.ack(Command::Update) {
                    return Outcome::Reset(e);
                }
                self.update()
            }
            Ok(Command::Boot) => {
                // The host may already be gone once the firmware starts.
                let _ = self.ack(Command::Boot);
                self.boot()
            }
            Err(other) => {
                debug!("Ignoring byte {:#x}", other);
                Outcome::Idle
            }
        }
    }

    /// Run one update session.
    pub fn update(&mut self) -> Outcome {
        let result = UpdateSession::new(&mut self.host, &mut self.flash, self.arena, self.keys, &self.layout).run();
        // The store may have changed even if the session failed.
        self.locate_release_message();
        match result {
            Ok(meta) => Outcome::Updated(meta),
            Err(e) => Outcome::Reset(e),
        }
    }

    /// Print the release message and return where the firmware starts.
    pub fn prepare_boot(&mut self) -> EntryPoint {
        if let Some(message) = self.release {
            if let Err(e) = message.emit(&mut self.flash, &mut self.diag) {
                warn!("Release message unavailable: {}", e);
            }
        }
        let _ = self.diag.flush();
        self.layout.entry_point()
    }

    /// Hand control to the installed firmware.
    pub fn boot(&mut self) -> ! {
        let entry = self.prepare_boot();
        info!("Booting firmware at {:#x}", entry.address());
        self.launcher.launch(entry)
    }

    fn ack(&mut self, command: Command) -> Result<(), Error> {
        self.host.write_all(&[command.to_byte()]).map_err(|_| Error::Transport)?;
        self.host.flush().map_err(|_| Error::Transport)
    }

    fn locate_release_message(&mut self) {
        self.release = match self.installed() {
            Ok(Some(meta)) => Some(self.layout.release_message(&meta)),
            Ok(None) => None,
            Err(e) => {
                warn!("Metadata unreadable: {}", e);
                None
            }
        };
    }
}
