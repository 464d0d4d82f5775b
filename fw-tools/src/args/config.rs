// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    boot_core::{
        update_protocol::{CBC_KEY_SIZE, HMAC_KEY_SIZE},
        KeyMaterial,
    },
    rand::RngCore,
    std::{io::Write, path::Path},
};

/// On-disk form of the secrets file, keys in hex.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SecretsFile {
    hmac_key: String,
    cbc_key: String,
}

/// Pre-shared keys shared with the bootloader build.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub hmac_key: [u8; HMAC_KEY_SIZE],
    pub cbc_key: [u8; CBC_KEY_SIZE],
}

impl Secrets {
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut secrets = Self {
            hmac_key: [0; HMAC_KEY_SIZE],
            cbc_key: [0; CBC_KEY_SIZE],
        };
        rng.fill_bytes(&mut secrets.hmac_key);
        rng.fill_bytes(&mut secrets.cbc_key);
        secrets
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let secrets = std::fs::read_to_string(path)?;
        Self::from_toml(&secrets)
    }

    pub fn from_toml(s: &str) -> Result<Self, Error> {
        let file: SecretsFile = toml::from_str(s)?;
        Ok(Self {
            hmac_key: decode_key("hmac_key", &file.hmac_key)?,
            cbc_key: decode_key("cbc_key", &file.cbc_key)?,
        })
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        let file = SecretsFile {
            hmac_key: hex::encode(self.hmac_key),
            cbc_key: hex::encode(self.cbc_key),
        };
        toml::to_string(&file).map_err(Into::into)
    }

    /// Write the secrets file. An existing file is only replaced when
    /// `overwrite` is set.
    pub fn save(&self, path: &Path, overwrite: bool) -> Result<(), Error> {
        let contents = self.to_toml()?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => Error::Exists,
            _ => Error::Io(e),
        })?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    pub fn key_material(&self) -> KeyMaterial {
        KeyMaterial::new(self.hmac_key, self.cbc_key)
    }
}

// Never print key bytes.
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

fn decode_key<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], Error> {
    let bytes = hex::decode(value.trim()).map_err(|e| Error::InvalidHex(field, e))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| Error::InvalidLength {
        field,
        expected: N,
        actual: len,
    })
}

#[derive(Debug)]
pub enum Error {
    Exists,
    InvalidHex(&'static str, hex::FromHexError),
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    Io(std::io::Error),
    Toml(toml::de::Error),
    TomlSer(toml::ser::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Toml(e)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::TomlSer(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Exists => write!(f, "secrets file already exists, pass --force to replace it"),
            Error::InvalidHex(field, e) => write!(f, "{field} is not valid hex: {e}"),
            Error::InvalidLength {
                field,
                expected,
                actual,
            } => write!(f, "{field} must be {expected} bytes, found {actual}"),
            Error::Io(e) => write!(f, "failed to access secrets file: {e}"),
            Error::Toml(e) => write!(f, "secrets file format error in TOML: {e}"),
            Error::TomlSer(e) => write!(f, "failed to encode secrets: {e}"),
        }
    }
}

impl std::error::Error for Error {}
