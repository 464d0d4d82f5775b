// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host to bootloader firmware update protocol.
//! The host streams a protected image over a serial line and the bootloader
//! answers every step with a single status byte.
//! Defines the message constants and encodings used on both sides of the link.

#![no_std]

/// Size of an HMAC-SHA256 authentication tag.
pub const TAG_SIZE: usize = 32;

/// Size of the AES-128-CBC initialization vector appended to the ciphertext.
pub const IV_SIZE: usize = 16;

/// AES block size. The ciphertext length is always a multiple of it.
pub const BLOCK_SIZE: usize = 16;

/// Size of the pre-shared HMAC key.
pub const HMAC_KEY_SIZE: usize = 32;

/// Size of the pre-shared AES-128 key.
pub const CBC_KEY_SIZE: usize = 16;

/// Size of the metadata message.
pub const METADATA_SIZE: usize = 4;

/// Size of the big-endian length prefix of a frame.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Frame length announcing the end of the payload.
pub const END_OF_PAYLOAD: u16 = 0;

/// Size of the trailer sent after the end-of-payload sentinel:
/// two half tags and the tag-of-tags.
pub const TRAILER_SIZE: usize = 3 * TAG_SIZE;

/// Single byte commands sent by the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Begin a firmware update
    Update = b'U',
    /// Boot the installed firmware
    Boot = b'B',
}

impl Command {
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            b'U' => Ok(Self::Update),
            b'B' => Ok(Self::Boot),
            other => Err(other),
        }
    }
}

/// Status byte answered by the bootloader.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Step accepted
    Ok = 0x00,
    /// Metadata rejected, stale version or unacceptable size
    MetadataRejected = 0x01,
    /// An authentication tag did not verify
    AuthenticationFailed = 0x02,
    /// Erasing or programming flash failed
    StorageFailure = 0x03,
}

impl Status {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Human readable description, as printed by the host tools.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MetadataRejected => "version is wrong",
            Self::AuthenticationFailed => "HMAC is not verifiable",
            Self::StorageFailure => "flash programming failed",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x00 => Ok(Self::Ok),
            0x01 => Ok(Self::MetadataRejected),
            0x02 => Ok(Self::AuthenticationFailed),
            0x03 => Ok(Self::StorageFailure),
            other => Err(other),
        }
    }
}

/// Version and size of a firmware image.
///
/// On the wire this is `version` then `size`, both little-endian. In flash
/// the same bytes form one 32-bit word with the version in the low half.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareMetadata {
    pub version: u16,
    /// Ciphertext length, excluding the IV and every tag.
    pub size: u16,
}

impl FirmwareMetadata {
    /// Version number meaning "keep the installed version".
    pub const KEEP_VERSION: u16 = 0;

    pub const fn new(version: u16, size: u16) -> Self {
        Self { version, size }
    }

    pub fn to_bytes(&self) -> [u8; METADATA_SIZE] {
        let mut buf = [0; METADATA_SIZE];
        buf[..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; METADATA_SIZE]) -> Self {
        Self {
            version: u16::from_le_bytes([buf[0], buf[1]]),
            size: u16::from_le_bytes([buf[2], buf[3]]),
        }
    }

    /// Packed storage word, version in the low 16 bits.
    pub fn to_word(&self) -> u32 {
        (u32::from(self.size) << 16) | u32::from(self.version)
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            version: (word & 0xFFFF) as u16,
            size: (word >> 16) as u16,
        }
    }

    /// Number of payload bytes the host sends for this image: ciphertext and IV.
    pub fn payload_len(&self) -> usize {
        usize::from(self.size) + IV_SIZE
    }
}

/// Length prefix of a frame carrying `len` bytes of body and tag.
pub fn frame_header(len: u16) -> [u8; FRAME_HEADER_SIZE] {
    len.to_be_bytes()
}

/// Decode a frame length prefix.
pub fn frame_len(header: [u8; FRAME_HEADER_SIZE]) -> u16 {
    u16::from_be_bytes(header)
}

/// Split a payload into the two halves covered by the trailer tags.
/// The first half gets the smaller share when the length is odd.
pub fn split_halves(payload: &[u8]) -> (&[u8], &[u8]) {
    payload.split_at(payload.len() / 2)
}
