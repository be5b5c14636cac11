//! Monochrome display buffer.
use std::fmt::{self, Write};

use crate::constants::*;

/// 64x32 framebuffer where each cell is either 0 or 1.
///
/// Sprites are blitted with XOR, and coordinates wrap
/// around to the other side of the screen.
pub struct Display {
    cells: Box<[u8; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            cells: Box::new([0; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl Display {
    pub fn new() -> Self {
        Default::default()
    }

    /// XOR a single pixel.
    ///
    /// Returns `true` when the pixel was switched from 1 to 0,
    /// which is how the machine detects collisions.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) -> bool {
        let d = (x % DISPLAY_WIDTH) + (y % DISPLAY_HEIGHT) * DISPLAY_WIDTH;

        let old_px = self.cells[d];
        let new_px = old_px ^ (value & 1);
        self.cells[d] = new_px;

        old_px == 1 && new_px == 0
    }

    /// Draw a sprite with its top left corner at (x, y).
    ///
    /// Each byte is one row of 8 pixels, most significant bit on the left.
    /// Returns `true` if any pixel was erased.
    pub fn draw(&mut self, rows: &[u8], x: usize, y: usize) -> bool {
        let mut is_erased = false;

        for (r, row) in rows.iter().enumerate() {
            for c in 0..8 {
                if (row >> (7 - c)) & 1 == 1 {
                    is_erased |= self.set(x + c, y + r, 1);
                }
            }
        }

        is_erased
    }

    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[(x % DISPLAY_WIDTH) + (y % DISPLAY_HEIGHT) * DISPLAY_WIDTH]
    }

    /// Row-major view of the whole buffer.
    pub fn cells(&self) -> &[u8] {
        &self.cells[..]
    }

    /// Copy of the buffer, suitable for sending to a client.
    pub fn frame(&self) -> Vec<u8> {
        self.cells.to_vec()
    }

    /// Human readable rendering of the buffer.
    pub fn dump(&self) -> Result<String, fmt::Error> {
        let mut buf = String::with_capacity(DISPLAY_BUFFER_SIZE + DISPLAY_HEIGHT);

        for row in self.cells.chunks(DISPLAY_WIDTH) {
            for px in row {
                if *px == 1 {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}
