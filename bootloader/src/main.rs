// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod jump_app;
mod port;

// global logger
use defmt_rtt as _;
use panic_probe as _;

use boot_core::{Arena, Bootloader, KeyMaterial, Layout, Outcome};
use consts::{APP_SIZE, BASE_APP_ADDR, METADATA_BASE, UPDATE_ARENA_SIZE};
use cortex_m::peripheral::SCB;
use defmt::{error, info};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use jump_app::Jump;
use port::{Diag, HostPort};
use static_cell::ConstStaticCell;

mod keys {
    include!(concat!(env!("OUT_DIR"), "/keys.rs"));
}

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

/// Disable debug access, the keys live in the bootloader flash.
#[cfg(feature = "no-dbg-access")]
#[used]
#[link_section = ".uicr_approtect"]
pub static APPROTECT: u32 = 0xFFFF_FF00;

// The UARTE only takes preset baudrates.
const _: () = assert!(consts::HOST_BAUDRATE == 115_200);

static KEYS: KeyMaterial = KeyMaterial::new(keys::HMAC_KEY, keys::CBC_KEY);

const LAYOUT: Layout = Layout {
    metadata_addr: METADATA_BASE,
    firmware_base: BASE_APP_ADDR,
    firmware_capacity: APP_SIZE,
};

// Kept out of the stack, it takes most of the RAM.
static ARENA: ConstStaticCell<Arena<UPDATE_ARENA_SIZE>> = ConstStaticCell::new(Arena::new());

#[cortex_m_rt::entry]
fn main() -> ! {
    let p = embassy_nrf::init(Default::default());

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_16, p.P0_18, config_uart);

    let flash = Nvmc::new(p.NVMC);

    let mut bootloader = Bootloader::new(
        HostPort::new(uart),
        Diag,
        flash,
        Jump,
        &KEYS,
        LAYOUT,
        ARENA.take(),
    );
    let _ = bootloader.banner();
    if let Ok(Some(meta)) = bootloader.installed() {
        info!("Installed firmware version {} size {}", meta.version, meta.size);
    }

    // Loop for bootloader commands, a boot command never comes back.
    loop {
        match bootloader.poll() {
            Outcome::Idle => {}
            Outcome::Updated(meta) => {
                info!("Update complete, version {} size {}", meta.version, meta.size);
            }
            Outcome::Reset(e) => {
                error!("Update failed: {}, resetting", e);
                SCB::sys_reset();
            }
        }
    }
}
