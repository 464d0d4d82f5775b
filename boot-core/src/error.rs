// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use update_protocol::Status;

/// Reasons an update session is aborted.
///
/// Every variant is fatal: the session is discarded and the device restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Stale version, or a declared size the device can never accept.
    MetadataRejected,
    /// A metadata, frame, half or tag-of-tags HMAC did not verify.
    AuthenticationFailed,
    /// A frame shorter than its tag, or a payload whose length disagrees with
    /// the authenticated metadata.
    MalformedFrame,
    /// A frame would have been written past the end of the arena.
    Overflow,
    /// Erasing or programming flash failed.
    StorageFailure,
    /// Reading from or writing to the host channel failed.
    Transport,
}

impl Error {
    /// Status byte reported to the host before the restart.
    ///
    /// Framing errors have no status of their own and are reported as an
    /// authentication failure. A broken transport cannot carry a status.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::MetadataRejected => Some(Status::MetadataRejected),
            Self::AuthenticationFailed | Self::MalformedFrame | Self::Overflow => {
                Some(Status::AuthenticationFailed)
            }
            Self::StorageFailure => Some(Status::StorageFailure),
            Self::Transport => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MetadataRejected => write!(f, "metadata rejected"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::MalformedFrame => write!(f, "malformed frame"),
            Self::Overflow => write!(f, "image does not fit the update buffer"),
            Self::StorageFailure => write!(f, "flash storage failure"),
            Self::Transport => write!(f, "host transport failure"),
        }
    }
}
