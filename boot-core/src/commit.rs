// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::arena::Arena;
use crate::fmt::{error, info};
use crate::Error;
use embedded_storage::nor_flash::NorFlash;

/// Program the accumulated plaintext page by page, starting at `base`.
///
/// Each page is erased right before it is programmed. The last partial page
/// is zero padded to the write granularity. A failure leaves the pages already
/// written in place.
pub(crate) fn program_pages<F: NorFlash, const N: usize>(
    flash: &mut F,
    base: u32,
    arena: &mut Arena<N>,
) -> Result<(), Error> {
    let size = arena.len();
    let full = size - size % F::ERASE_SIZE;

    let mut addr = base;
    for page in arena.filled()[..full].chunks_exact(F::ERASE_SIZE) {
        program_page::<F>(flash, addr, page)?;
        addr += F::ERASE_SIZE as u32;
    }

    if full < size {
        let padded = size.next_multiple_of(F::WRITE_SIZE);
        let page = &arena.padded_to(padded)?[full..];
        program_page::<F>(flash, addr, page)?;
    }
    Ok(())
}

fn program_page<F: NorFlash>(flash: &mut F, addr: u32, data: &[u8]) -> Result<(), Error> {
    flash.erase(addr, addr + F::ERASE_SIZE as u32).map_err(|_| {
        error!("Erase failed at {:#x}", addr);
        Error::StorageFailure
    })?;
    flash.write(addr, data).map_err(|_| {
        error!("Program failed at {:#x}", addr);
        Error::StorageFailure
    })?;
    info!("Page programmed at {:#x}, {} bytes", addr, data.len());
    Ok(())
}
