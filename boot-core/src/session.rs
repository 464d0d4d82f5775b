// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! One firmware update transaction.
//!
//! The session walks the host through metadata intake, framed payload
//! accumulation and the trailer check, then decrypts the payload and programs
//! it. Nothing received is decrypted or programmed before every tag covering
//! it has verified. Any failure moves the session to [`State::Aborted`],
//! wipes the arena and reports one status byte to the host.

use crate::arena::Arena;
use crate::boot::Layout;
use crate::commit::program_pages;
use crate::crypto::KeyMaterial;
use crate::fmt::{debug, error, info};
use crate::metadata::{self, MetadataStore};
use crate::Error;
use embedded_io::{Read, Write};
use embedded_storage::nor_flash::NorFlash;
use update_protocol::{
    frame_len, split_halves, FirmwareMetadata, Status, BLOCK_SIZE, END_OF_PAYLOAD, FRAME_HEADER_SIZE, IV_SIZE,
    METADATA_SIZE, TAG_SIZE,
};

/// Progress of an update session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Waiting for the metadata and its tag.
    Metadata,
    /// Receiving tagged frames.
    Accumulating,
    /// End of payload seen, checking the trailer tags.
    Finalizing,
    /// Payload authenticated, decrypting and programming.
    Committing,
    /// Firmware programmed.
    Complete,
    /// Terminal failure, the device must restart.
    Aborted,
}

pub struct UpdateSession<'a, H, F, const N: usize> {
    host: &'a mut H,
    flash: &'a mut F,
    arena: &'a mut Arena<N>,
    keys: &'a KeyMaterial,
    layout: &'a Layout,
    state: State,
    declared: FirmwareMetadata,
}

impl<'a, H, F, const N: usize> UpdateSession<'a, H, F, N>
where
    H: Read + Write,
    F: NorFlash,
{
    pub fn new(
        host: &'a mut H,
        flash: &'a mut F,
        arena: &'a mut Arena<N>,
        keys: &'a KeyMaterial,
        layout: &'a Layout,
    ) -> Self {
        arena.clear();
        Self {
            host,
            flash,
            arena,
            keys,
            layout,
            state: State::Metadata,
            declared: FirmwareMetadata::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Returns the metadata committed to the store. On error the failure status
    /// has already been sent to the host and the caller must restart.
    pub fn run(&mut self) -> Result<FirmwareMetadata, Error> {
        match self.drive() {
            Ok(meta) => {
                self.state = State::Complete;
                self.arena.clear();
                Ok(meta)
            }
            Err(e) => {
                self.abort(e);
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<FirmwareMetadata, Error> {
        let committed = self.intake_metadata()?;
        self.accumulate()?;
        self.finalize()?;
        self.decrypt_and_commit()?;
        Ok(committed)
    }

    fn intake_metadata(&mut self) -> Result<FirmwareMetadata, Error> {
        let raw = self.arena.reserve(METADATA_SIZE)?;
        read_exact(self.host, raw)?;
        let mut meta = [0; METADATA_SIZE];
        meta.copy_from_slice(self.arena.filled());

        let mut tag = [0; TAG_SIZE];
        read_exact(self.host, &mut tag)?;

        let declared = FirmwareMetadata::from_bytes(meta);
        info!("Received firmware version {} size {}", declared.version, declared.size);

        self.keys.verify(&[&meta[..]], &tag).map_err(|e| {
            error!("Metadata tag mismatch");
            e
        })?;

        let store = MetadataStore::new(self.layout.metadata_addr);
        let installed = store.read(self.flash)?;
        let effective = metadata::accept(declared, installed)?;
        self.check_size(declared.size)?;

        // Persisted before the payload is authenticated: an aborted transfer
        // still leaves the new version and size in the store.
        store.write(self.flash, effective)?;

        self.declared = declared;
        self.arena.clear();
        self.send(Status::Ok)?;
        self.state = State::Accumulating;
        Ok(effective)
    }

    /// Reject sizes that could never be decrypted, stored or buffered.
    fn check_size(&self, size: u16) -> Result<(), Error> {
        let size = usize::from(size);
        let fits_region = size as u64 <= u64::from(self.layout.firmware_capacity);
        // The last frame briefly holds its tag after the payload.
        let fits_arena = size + IV_SIZE + TAG_SIZE <= N;
        if size == 0 || size % BLOCK_SIZE != 0 || !fits_region || !fits_arena {
            error!("Unacceptable firmware size {}", size);
            return Err(Error::MetadataRejected);
        }
        Ok(())
    }

    fn accumulate(&mut self) -> Result<(), Error> {
        loop {
            let mut header = [0; FRAME_HEADER_SIZE];
            read_exact(self.host, &mut header)?;
            let len = frame_len(header);
            if len == END_OF_PAYLOAD {
                debug!("End of payload, {} bytes buffered", self.arena.len());
                self.state = State::Finalizing;
                return Ok(());
            }

            let len = usize::from(len);
            if len < TAG_SIZE {
                error!("Frame of {} bytes cannot hold a tag", len);
                return Err(Error::MalformedFrame);
            }
            let frame = self.arena.reserve(len).map_err(|e| {
                error!("Frame of {} bytes overflows the update buffer", len);
                e
            })?;
            read_exact(self.host, frame)?;

            let (body, tag) = frame.split_at(len - TAG_SIZE);
            self.keys.verify(&[body], tag).map_err(|e| {
                error!("Frame tag mismatch");
                e
            })?;
            self.arena.truncate_back(TAG_SIZE);
            debug!("Frame accepted, {} bytes buffered", self.arena.len());
            self.send(Status::Ok)?;
        }
    }

    fn finalize(&mut self) -> Result<(), Error> {
        let mut half_tags = [0; 2 * TAG_SIZE];
        read_exact(self.host, &mut half_tags)?;
        let (first_tag, second_tag) = half_tags.split_at(TAG_SIZE);
        let (first, second) = split_halves(self.arena.filled());
        self.keys
            .verify(&[first], first_tag)
            .and_then(|()| self.keys.verify(&[second], second_tag))
            .map_err(|e| {
                error!("Payload half tag mismatch");
                e
            })?;
        self.send(Status::Ok)?;

        let mut tag_of_tags = [0; TAG_SIZE];
        read_exact(self.host, &mut tag_of_tags)?;
        self.keys.verify(&[&half_tags[..]], &tag_of_tags).map_err(|e| {
            error!("Tag-of-tags mismatch");
            e
        })?;

        if self.arena.len() != self.declared.payload_len() {
            error!(
                "Payload is {} bytes, metadata announced {}",
                self.arena.len(),
                self.declared.payload_len()
            );
            return Err(Error::MalformedFrame);
        }
        self.send(Status::Ok)?;
        self.state = State::Committing;
        Ok(())
    }

    fn decrypt_and_commit(&mut self) -> Result<(), Error> {
        let size = usize::from(self.declared.size);
        let (ciphertext, iv) = self.arena.filled_mut().split_at_mut(size);
        let iv: [u8; IV_SIZE] = (&*iv).try_into().map_err(|_| Error::MalformedFrame)?;
        self.keys.decrypt_in_place(&iv, ciphertext)?;
        self.arena.truncate_back(IV_SIZE);

        program_pages(self.flash, self.layout.firmware_base, self.arena)?;
        info!("Firmware installed, {} bytes", size);
        Ok(())
    }

    fn abort(&mut self, e: Error) {
        error!("Update aborted: {}", e);
        self.state = State::Aborted;
        self.arena.clear();
        if let Some(status) = e.status() {
            let _ = self.send(status);
        }
    }

    fn send(&mut self, status: Status) -> Result<(), Error> {
        self.host.write_all(&[status.to_byte()]).map_err(|_| Error::Transport)?;
        self.host.flush().map_err(|_| Error::Transport)
    }
}

fn read_exact<H: Read>(host: &mut H, buf: &mut [u8]) -> Result<(), Error> {
    host.read_exact(buf).map_err(|_| Error::Transport)
}
