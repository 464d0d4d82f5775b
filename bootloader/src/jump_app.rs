// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later
use boot_core::{EntryPoint, Launcher};
use cortex_m::peripheral::NVIC;
use defmt::info;
use embassy_nrf::interrupt::Interrupt;

/// Hands the CPU over to the installed firmware.
pub struct Jump;

impl Launcher for Jump {
    fn launch(&mut self, entry: EntryPoint) -> ! {
        // SAFETY: the bootloader has nothing left to do, no peripheral it
        // owns is used past this point.
        unsafe { jump_to_app(entry) }
    }
}

/// Branches to the firmware entry point.
///
/// # Safety
///
/// This resets the stack selection and link register and will run whatever code is
/// placed at the firmware base. Nothing checks that valid firmware is installed.
unsafe fn jump_to_app(entry: EntryPoint) -> ! {
    // Disable active interrupts
    NVIC::mask(Interrupt::UARTE0_UART0);
    cortex_m::interrupt::disable();

    info!("jumping to {=u32:x}", entry.address());

    // These instructions perform the following operations:
    //
    // * Modify control register to use MSP as stack pointer (clear spsel bit)
    // * Synchronize instruction barrier
    // * Set link register to not return (0xFF)
    // * Branch to the firmware base, Thumb bit set
    core::arch::asm!(
        "mrs {tmp}, CONTROL",
        "bics {tmp}, {spsel}",
        "msr CONTROL, {tmp}",
        "isb",
        "cpsie i",
        "mov lr, {new_lr}",
        "bx {entry}",
        // `out(reg) _` is not permitted in a `noreturn` asm! call,
        // so instead use `in(reg) 0` and don't restore it afterwards.
        tmp = in(reg) 0,
        spsel = in(reg) 2,
        new_lr = in(reg) 0xFFFFFFFFu32,
        entry = in(reg) entry.address(),
        options(noreturn),
    );
}
