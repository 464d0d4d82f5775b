// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protected firmware images.
//!
//! A protected image is the exact byte stream the host sends after the update
//! command: metadata and its tag, the tagged frames, the end-of-payload
//! sentinel, the two half tags and the tag-of-tags.

use {
    crate::args::Secrets,
    aes::Aes128,
    boot_core::{
        update_protocol::{
            frame_header, frame_len, split_halves, FirmwareMetadata, BLOCK_SIZE, END_OF_PAYLOAD, IV_SIZE,
            TAG_SIZE, TRAILER_SIZE,
        },
        KeyMaterial,
    },
    cbc::cipher::{block_padding::Pkcs7, generic_array::GenericArray, BlockEncryptMut, KeyIvInit},
    consts::{APP_SIZE, UPDATE_ARENA_SIZE},
};

/// Payload bytes per frame unless told otherwise.
pub const DEFAULT_FRAME_BODY: usize = 32;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// Largest ciphertext the bootloader accepts: it must fit the firmware region,
/// the size field and, with the IV and one frame tag, the update buffer.
pub fn max_firmware_size() -> usize {
    let region = APP_SIZE as usize;
    let arena = UPDATE_ARENA_SIZE - IV_SIZE - TAG_SIZE;
    let field = usize::from(u16::MAX);
    let max = region.min(arena).min(field);
    max - max % BLOCK_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub body: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl Frame {
    fn new(keys: &KeyMaterial, body: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            body: body.to_vec(),
            tag: keys.tag(&[body])?,
        })
    }

    /// Frame as sent on the wire, length prefix included.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Frame sizes are validated when the frame is built or parsed.
        let len = (self.body.len() + TAG_SIZE) as u16;
        let mut out = frame_header(len).to_vec();
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.tag);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub metadata: FirmwareMetadata,
    pub metadata_tag: [u8; TAG_SIZE],
    pub frames: Vec<Frame>,
    pub half_tags: [u8; 2 * TAG_SIZE],
    pub tag_of_tags: [u8; TAG_SIZE],
}

impl Package {
    /// Encrypt `firmware` under `iv` and tag every part of the transfer.
    ///
    /// The firmware is PKCS#7 padded to a whole number of blocks before
    /// encryption. The declared size is the padded ciphertext length.
    pub fn protect(
        secrets: &Secrets,
        version: u16,
        firmware: &[u8],
        iv: [u8; IV_SIZE],
        frame_body: usize,
    ) -> Result<Self, Error> {
        if firmware.is_empty() {
            return Err(Error::EmptyFirmware);
        }
        if frame_body == 0 || frame_body + TAG_SIZE > usize::from(u16::MAX) {
            return Err(Error::InvalidFrameSize(frame_body));
        }
        let ciphertext = Aes128CbcEnc::new(
            GenericArray::from_slice(&secrets.cbc_key),
            GenericArray::from_slice(&iv),
        )
        .encrypt_padded_vec_mut::<Pkcs7>(firmware);
        if ciphertext.len() > max_firmware_size() {
            return Err(Error::FirmwareTooLarge {
                size: ciphertext.len(),
                max: max_firmware_size(),
            });
        }
        let size = u16::try_from(ciphertext.len()).map_err(|_| Error::FirmwareTooLarge {
            size: ciphertext.len(),
            max: max_firmware_size(),
        })?;

        let keys = secrets.key_material();
        let metadata = FirmwareMetadata::new(version, size);
        let mut payload = ciphertext;
        payload.extend_from_slice(&iv);

        let frames = payload
            .chunks(frame_body)
            .map(|body| Frame::new(&keys, body))
            .collect::<Result<Vec<_>, _>>()?;
        let (first, second) = split_halves(&payload);
        let mut half_tags = [0; 2 * TAG_SIZE];
        half_tags[..TAG_SIZE].copy_from_slice(&keys.tag(&[first])?);
        half_tags[TAG_SIZE..].copy_from_slice(&keys.tag(&[second])?);

        tracing::debug!(
            "Protected firmware version {version}, {} bytes in {} frames",
            size,
            frames.len()
        );
        Ok(Self {
            metadata,
            metadata_tag: keys.tag(&[&metadata.to_bytes()[..]])?,
            frames,
            tag_of_tags: keys.tag(&[&half_tags[..]])?,
            half_tags,
        })
    }

    /// Parse a protected image. No tag is checked, see [`Package::verify`].
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader { data, pos: 0 };
        let metadata = FirmwareMetadata::from_bytes(reader.array()?);
        let metadata_tag = reader.array()?;

        let mut frames = Vec::new();
        loop {
            let offset = reader.pos;
            let len = frame_len(reader.array()?);
            if len == END_OF_PAYLOAD {
                break;
            }
            let len = usize::from(len);
            if len < TAG_SIZE {
                return Err(Error::ShortFrame { offset, len });
            }
            let body = reader.take(len - TAG_SIZE)?.to_vec();
            let tag = reader.array()?;
            frames.push(Frame { body, tag });
        }

        let trailer = data.len() - reader.pos;
        if trailer > TRAILER_SIZE {
            return Err(Error::TrailingBytes(trailer - TRAILER_SIZE));
        }
        let half_tags = reader.array()?;
        let tag_of_tags = reader.array()?;
        Ok(Self {
            metadata,
            metadata_tag,
            frames,
            half_tags,
            tag_of_tags,
        })
    }

    /// Check every tag and the payload length the same way the bootloader does.
    pub fn verify(&self, keys: &KeyMaterial) -> Result<(), Error> {
        keys.verify(&[&self.metadata.to_bytes()[..]], &self.metadata_tag)
            .map_err(|_| Error::TagMismatch(Tagged::Metadata))?;
        for (i, frame) in self.frames.iter().enumerate() {
            keys.verify(&[&frame.body[..]], &frame.tag)
                .map_err(|_| Error::TagMismatch(Tagged::Frame(i)))?;
        }
        let payload = self.payload();
        let (first, second) = split_halves(&payload);
        keys.verify(&[first], &self.half_tags[..TAG_SIZE])
            .map_err(|_| Error::TagMismatch(Tagged::FirstHalf))?;
        keys.verify(&[second], &self.half_tags[TAG_SIZE..])
            .map_err(|_| Error::TagMismatch(Tagged::SecondHalf))?;
        keys.verify(&[&self.half_tags[..]], &self.tag_of_tags)
            .map_err(|_| Error::TagMismatch(Tagged::TagOfTags))?;
        if payload.len() != self.metadata.payload_len() {
            return Err(Error::SizeMismatch {
                declared: self.metadata.payload_len(),
                payload: payload.len(),
            });
        }
        Ok(())
    }

    /// Ciphertext followed by the IV.
    pub fn payload(&self) -> Vec<u8> {
        self.frames.iter().flat_map(|f| f.body.iter().copied()).collect()
    }

    /// The transfer split at every point where the bootloader answers with a
    /// status byte.
    pub fn steps(&self) -> Vec<(Step, Vec<u8>)> {
        let mut steps = Vec::with_capacity(self.frames.len() + 3);

        let mut metadata = self.metadata.to_bytes().to_vec();
        metadata.extend_from_slice(&self.metadata_tag);
        steps.push((Step::Metadata, metadata));

        for (i, frame) in self.frames.iter().enumerate() {
            steps.push((Step::Frame(i), frame.to_bytes()));
        }

        let mut trailer = frame_header(END_OF_PAYLOAD).to_vec();
        trailer.extend_from_slice(&self.half_tags);
        steps.push((Step::HalfTags, trailer));
        steps.push((Step::TagOfTags, self.tag_of_tags.to_vec()));
        steps
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.steps().into_iter().flat_map(|(_, bytes)| bytes).collect()
    }
}

/// A point in the transfer acknowledged by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Metadata,
    Frame(usize),
    HalfTags,
    TagOfTags,
    /// Decryption and flash programming after the last acknowledgement.
    Commit,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Step::Metadata => write!(f, "metadata"),
            Step::Frame(i) => write!(f, "frame {i}"),
            Step::HalfTags => write!(f, "half tags"),
            Step::TagOfTags => write!(f, "tag-of-tags"),
            Step::Commit => write!(f, "commit"),
        }
    }
}

/// The part of a package covered by a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tagged {
    Metadata,
    Frame(usize),
    FirstHalf,
    SecondHalf,
    TagOfTags,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or(Error::Truncated(self.pos))?;
        self.pos += len;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[derive(Debug)]
pub enum Error {
    EmptyFirmware,
    FirmwareTooLarge { size: usize, max: usize },
    InvalidFrameSize(usize),
    Key(boot_core::Error),
    ShortFrame { offset: usize, len: usize },
    SizeMismatch { declared: usize, payload: usize },
    TagMismatch(Tagged),
    TrailingBytes(usize),
    Truncated(usize),
}

impl From<boot_core::Error> for Error {
    fn from(e: boot_core::Error) -> Self {
        Error::Key(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::EmptyFirmware => write!(f, "firmware file is empty"),
            Error::FirmwareTooLarge { size, max } => {
                write!(f, "encrypted firmware is {size} bytes, the bootloader accepts at most {max}")
            }
            Error::InvalidFrameSize(size) => write!(f, "invalid frame size {size}"),
            Error::Key(e) => write!(f, "key error: {e}"),
            Error::ShortFrame { offset, len } => {
                write!(f, "frame at offset {offset} is {len} bytes, shorter than its tag")
            }
            Error::SizeMismatch { declared, payload } => {
                write!(f, "metadata announces {declared} payload bytes, image carries {payload}")
            }
            Error::TagMismatch(Tagged::Metadata) => write!(f, "metadata tag does not verify"),
            Error::TagMismatch(Tagged::Frame(i)) => write!(f, "tag of frame {i} does not verify"),
            Error::TagMismatch(Tagged::FirstHalf) => write!(f, "first half tag does not verify"),
            Error::TagMismatch(Tagged::SecondHalf) => write!(f, "second half tag does not verify"),
            Error::TagMismatch(Tagged::TagOfTags) => write!(f, "tag-of-tags does not verify"),
            Error::TrailingBytes(n) => write!(f, "{n} unexpected bytes after the tag-of-tags"),
            Error::Truncated(offset) => write!(f, "image truncated at offset {offset}"),
        }
    }
}

impl std::error::Error for Error {}
