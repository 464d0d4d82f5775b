// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command line arguments.

use {crate::package::DEFAULT_FRAME_BODY, consts::HOST_BAUDRATE, std::path::PathBuf};

#[derive(clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Generate a new pair of pre-shared keys.
    Keygen {
        /// Path of the secrets file to create.
        #[clap(short, long, default_value = "secrets.toml")]
        output: PathBuf,
        /// Replace an existing secrets file.
        #[clap(long)]
        force: bool,
    },
    /// Encrypt and tag a firmware binary for upload.
    Protect {
        /// Path to the secrets file.
        #[clap(short, long)]
        secrets: PathBuf,
        /// The plain firmware binary.
        #[clap(short, long)]
        input: PathBuf,
        /// Path to write the protected image.
        #[clap(short, long)]
        output: PathBuf,
        /// Version announced in the metadata. 0 keeps the installed version.
        #[clap(long)]
        firmware_version: u16,
        /// Payload bytes carried by each frame.
        #[clap(long, default_value_t = DEFAULT_FRAME_BODY)]
        frame_size: usize,
    },
    /// Dump the contents of a protected image to stdout.
    Dump {
        /// The protected image.
        #[clap(short, long)]
        input: PathBuf,
        /// Check every tag with the keys from this secrets file.
        #[clap(short, long)]
        secrets: Option<PathBuf>,
    },
    /// Upload a protected image to the bootloader over a serial port.
    Update {
        /// Serial port the bootloader listens on.
        #[clap(short, long)]
        port: String,
        #[clap(short, long, default_value_t = HOST_BAUDRATE)]
        baudrate: u32,
        /// The protected image.
        #[clap(short, long)]
        input: PathBuf,
        /// How long to wait for each answer, in milliseconds.
        #[clap(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Start the new firmware once the upload succeeded.
        #[clap(long)]
        boot: bool,
    },
}
