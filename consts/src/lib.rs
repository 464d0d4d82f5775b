// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Start address of the bootloader in flash memory.
/// The bootloader owns the reset vector, so it is linked at the very start of flash.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x0000_0000;

/// Size reserved for the bootloader code (32KB).
pub const BOOTLOADER_SIZE: u32 = 0x8000;

/// Size of a flash memory page in bytes (4KB).
/// Erase operations on the nRF52 NVMC always cover a whole page.
pub const FLASH_PAGE: u32 = 4096;

/// Program granularity of the NVMC in bytes, one 32-bit word.
pub const FLASH_WRITE_SIZE: u32 = 4;

/// Address of the metadata page holding the packed version/size word.
/// Sits right after the bootloader so a bootloader overflow is caught by the linker.
pub const METADATA_BASE: u32 = BASE_BOOTLOADER_ADDR + BOOTLOADER_SIZE;

/// Base address of the application firmware region.
pub const BASE_APP_ADDR: u32 = METADATA_BASE + FLASH_PAGE;

/// Total flash size of the nRF52805 (192KB).
pub const FLASH_SIZE: u32 = 0x30000;

/// Size of the application region, up to the end of flash.
/// The firmware and its release message must both fit here.
pub const APP_SIZE: u32 = FLASH_SIZE - BASE_APP_ADDR;

/// Size of the RAM arena used to accumulate an incoming image (16KB).
/// The nRF52805 only has 24KB of RAM, so this bounds the largest accepted
/// firmware to `UPDATE_ARENA_SIZE - IV - one frame tag`.
pub const UPDATE_ARENA_SIZE: usize = 16 * 1024;

/// Baudrate of the host UART.
pub const HOST_BAUDRATE: u32 = 115_200;
