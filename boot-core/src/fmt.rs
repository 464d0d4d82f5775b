// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Logger selection. The target build logs through `defmt`, host builds through
//! `log`, and without either feature every macro expands to nothing.
//! Format strings must stay within the subset both backends accept.

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, warn};

#[cfg(all(feature = "log", not(feature = "defmt")))]
pub(crate) use log::{debug, error, info, warn};

#[cfg(not(any(feature = "log", feature = "defmt")))]
mod noop {
    macro_rules! debug {
        ($($x:tt)*) => {};
    }
    pub(crate) use debug;
    macro_rules! info {
        ($($x:tt)*) => {};
    }
    pub(crate) use info;
    macro_rules! warner {
        ($($x:tt)*) => {};
    }
    pub(crate) use warner as warn;
    macro_rules! error {
        ($($x:tt)*) => {};
    }
    pub(crate) use error;
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
pub(crate) use noop::{debug, error, info, warn};
