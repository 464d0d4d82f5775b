// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::fmt::{info, warn};
use crate::Error;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use update_protocol::{FirmwareMetadata, METADATA_SIZE};

/// Word read back from a metadata page that was never programmed.
const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Largest program granularity the metadata word can be padded to.
const MAX_WRITE_SIZE: usize = 16;

/// Persisted version and size of the installed firmware.
///
/// One packed word at the start of a dedicated flash page. Only the update
/// session writes it.
pub struct MetadataStore {
    addr: u32,
}

impl MetadataStore {
    pub const fn new(addr: u32) -> Self {
        Self { addr }
    }

    /// Read the installed metadata, `None` if the page is erased.
    pub fn read<F: ReadNorFlash>(&self, flash: &mut F) -> Result<Option<FirmwareMetadata>, Error> {
        let mut word = [0; METADATA_SIZE];
        flash.read(self.addr, &mut word).map_err(|_| Error::StorageFailure)?;
        let word = u32::from_le_bytes(word);
        if word == ERASED_WORD {
            return Ok(None);
        }
        Ok(Some(FirmwareMetadata::from_word(word)))
    }

    /// Erase the metadata page and program `meta` into it.
    pub fn write<F: NorFlash>(&self, flash: &mut F, meta: FirmwareMetadata) -> Result<(), Error> {
        let len = METADATA_SIZE.next_multiple_of(F::WRITE_SIZE);
        if len > MAX_WRITE_SIZE {
            return Err(Error::StorageFailure);
        }
        let mut buf = [0xFF; MAX_WRITE_SIZE];
        buf[..METADATA_SIZE].copy_from_slice(&meta.to_word().to_le_bytes());

        flash
            .erase(self.addr, self.addr + F::ERASE_SIZE as u32)
            .map_err(|_| Error::StorageFailure)?;
        flash.write(self.addr, &buf[..len]).map_err(|_| Error::StorageFailure)?;
        info!("Metadata committed: version {} size {}", meta.version, meta.size);
        Ok(())
    }
}

/// Apply the monotonicity rule to the declared metadata.
///
/// A version older than the installed one is rejected. Version 0 keeps the
/// installed version. An unprovisioned store accepts any version.
pub fn accept(declared: FirmwareMetadata, installed: Option<FirmwareMetadata>) -> Result<FirmwareMetadata, Error> {
    let installed_version = installed.map(|m| m.version).unwrap_or(0);
    if declared.version != FirmwareMetadata::KEEP_VERSION && declared.version < installed_version {
        warn!(
            "Rejecting version {}, installed version is {}",
            declared.version, installed_version
        );
        return Err(Error::MetadataRejected);
    }
    let version = if declared.version == FirmwareMetadata::KEEP_VERSION {
        installed_version
    } else {
        declared.version
    };
    Ok(FirmwareMetadata::new(version, declared.size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_version_is_rejected() {
        let installed = Some(FirmwareMetadata::new(5, 0x100));
        assert_eq!(accept(FirmwareMetadata::new(4, 0x20), installed), Err(Error::MetadataRejected));
        assert_eq!(
            accept(FirmwareMetadata::new(5, 0x20), installed),
            Ok(FirmwareMetadata::new(5, 0x20))
        );
        assert_eq!(
            accept(FirmwareMetadata::new(9, 0x20), installed),
            Ok(FirmwareMetadata::new(9, 0x20))
        );
    }

    #[test]
    fn version_zero_keeps_installed_version() {
        let installed = Some(FirmwareMetadata::new(7, 0x100));
        assert_eq!(
            accept(FirmwareMetadata::new(0, 0x40), installed),
            Ok(FirmwareMetadata::new(7, 0x40))
        );
    }

    #[test]
    fn unprovisioned_store_accepts_anything() {
        assert_eq!(accept(FirmwareMetadata::new(1, 0x10), None), Ok(FirmwareMetadata::new(1, 0x10)));
        assert_eq!(accept(FirmwareMetadata::new(0, 0x10), None), Ok(FirmwareMetadata::new(0, 0x10)));
    }
}
