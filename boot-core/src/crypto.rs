// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! HMAC-SHA256 authentication and AES-128-CBC decryption with the pre-shared keys.

use crate::Error;
use aes::Aes128;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use update_protocol::{BLOCK_SIZE, CBC_KEY_SIZE, HMAC_KEY_SIZE, IV_SIZE, TAG_SIZE};

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Pre-shared keys compiled into the bootloader.
#[derive(Clone)]
pub struct KeyMaterial {
    hmac_key: [u8; HMAC_KEY_SIZE],
    cbc_key: [u8; CBC_KEY_SIZE],
}

impl KeyMaterial {
    pub const fn new(hmac_key: [u8; HMAC_KEY_SIZE], cbc_key: [u8; CBC_KEY_SIZE]) -> Self {
        Self { hmac_key, cbc_key }
    }

    /// HMAC over the concatenation of `parts`.
    pub fn tag(&self, parts: &[&[u8]]) -> Result<[u8; TAG_SIZE], Error> {
        let mut mac = self.mac()?;
        for part in parts {
            mac.update(part);
        }
        Ok(mac.finalize().into_bytes().into())
    }

    /// Check `tag` against the HMAC over the concatenation of `parts`.
    /// The comparison runs in constant time.
    pub fn verify(&self, parts: &[&[u8]], tag: &[u8]) -> Result<(), Error> {
        let mut mac = self.mac()?;
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(tag).map_err(|_| Error::AuthenticationFailed)
    }

    /// Decrypt `data` in place. `data` must be a whole number of blocks.
    pub fn decrypt_in_place(&self, iv: &[u8; IV_SIZE], data: &mut [u8]) -> Result<(), Error> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(Error::MalformedFrame);
        }
        let mut cipher = Aes128CbcDec::new(GenericArray::from_slice(&self.cbc_key), GenericArray::from_slice(iv));
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(&self.hmac_key).map_err(|_| Error::AuthenticationFailed)
    }
}
