// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! This build script writes two files into `OUT_DIR`:
//! - `memory.x`, generated from the shared memory map so the linker catches a
//!   bootloader that grows into the metadata page;
//! - `keys.rs`, the pre-shared keys read from the secrets file created by
//!   `fw-tools keygen`. The path comes from `SECURE_UPDATE_SECRETS` and
//!   defaults to `../secrets.toml`.

use consts::{BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

const SECRETS_ENV: &str = "SECURE_UPDATE_SECRETS";

#[derive(serde::Deserialize)]
struct Secrets {
    hmac_key: String,
    cbc_key: String,
}

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());

    let memory_x_content = format!(
        r##"
        BASE_BOOTLOADER_ADDR = {:#X};
        BOOTLOADER_SIZE = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            FLASH (rx) : ORIGIN = BASE_BOOTLOADER_ADDR, LENGTH = BOOTLOADER_SIZE
            RAM : ORIGIN = 0x20000000, LENGTH = 24K
            uicr_approtect (r) : ORIGIN = 0x10001208, LENGTH = 0x4
        }}

        SECTIONS {{
            .uicr_approtect :  {{
                KEEP(*(.uicr_approtect))
                . = ALIGN(4);
            }} > uicr_approtect
        }};
        "##,
        BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE
    );
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    let secrets_path = env::var_os(SECRETS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("../secrets.toml"));
    let secrets = std::fs::read_to_string(&secrets_path).unwrap_or_else(|e| {
        panic!(
            "cannot read {}: {e}; run `fw-tools keygen` or set {SECRETS_ENV}",
            secrets_path.display()
        )
    });
    let secrets: Secrets = toml::from_str(&secrets).expect("secrets file format error in TOML");
    let hmac_key = decode_key::<32>("hmac_key", &secrets.hmac_key);
    let cbc_key = decode_key::<16>("cbc_key", &secrets.cbc_key);
    File::create(out.join("keys.rs"))
        .unwrap()
        .write_all(
            format!("pub const HMAC_KEY: [u8; 32] = {hmac_key:?};\npub const CBC_KEY: [u8; 16] = {cbc_key:?};\n")
                .as_bytes(),
        )
        .unwrap();

    println!("cargo:rerun-if-env-changed={SECRETS_ENV}");
    println!("cargo:rerun-if-changed={}", secrets_path.display());
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

fn decode_key<const N: usize>(field: &str, value: &str) -> [u8; N] {
    let bytes = hex::decode(value.trim()).unwrap_or_else(|e| panic!("{field} is not valid hex: {e}"));
    bytes
        .try_into()
        .unwrap_or_else(|b: Vec<u8>| panic!("{field} must be {N} bytes, found {}", b.len()))
}
