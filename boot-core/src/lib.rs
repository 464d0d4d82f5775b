// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure firmware update core of the bootloader.
//!
//! Receives an encrypted, HMAC-tagged firmware image from the host over a
//! blocking byte channel, authenticates every part of it, decrypts it and
//! programs it into flash. The transport, the flash and the final jump into
//! the firmware are supplied by the board through `embedded-io`,
//! `embedded-storage` and the [`Launcher`] trait.

#![no_std]

mod fmt;

mod arena;
mod boot;
mod commit;
mod crypto;
mod dispatch;
mod error;
mod metadata;
mod session;


pub use arena::Arena;
pub use boot::{EntryPoint, Launcher, Layout, ReleaseMessage, RELEASE_MESSAGE_MAX};
pub use crypto::KeyMaterial;
pub use dispatch::{Bootloader, Outcome};
pub use error::Error;
pub use metadata::{accept, MetadataStore};
pub use session::{State, UpdateSession};
pub use update_protocol;
