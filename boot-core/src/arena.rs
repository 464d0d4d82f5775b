// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::Error;

/// Fixed-capacity accumulation buffer for an incoming image.
///
/// Bytes are only ever appended at the cursor, and every reservation is
/// checked against the capacity before anything is written.
pub struct Arena<const N: usize> {
    buf: [u8; N],
    cursor: usize,
}

impl<const N: usize> Arena<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], cursor: 0 }
    }

    /// Number of accumulated bytes.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn remaining(&self) -> usize {
        N - self.cursor
    }

    /// Accumulated bytes.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }

    pub fn filled_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.cursor]
    }

    /// Reserve `len` bytes at the cursor and return them for filling.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], Error> {
        if len > self.remaining() {
            return Err(Error::Overflow);
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&mut self.buf[start..self.cursor])
    }

    /// Drop the last `len` accumulated bytes.
    pub fn truncate_back(&mut self, len: usize) {
        self.cursor = self.cursor.saturating_sub(len);
    }

    /// Zero the bytes following the accumulated data up to `len` total bytes
    /// and return the whole padded range.
    pub fn padded_to(&mut self, len: usize) -> Result<&[u8], Error> {
        if len > N || len < self.cursor {
            return Err(Error::Overflow);
        }
        self.buf[self.cursor..len].fill(0);
        Ok(&self.buf[..len])
    }

    /// Discard everything, wiping the contents.
    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.cursor = 0;
    }
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}
