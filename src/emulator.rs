use serde::Serialize;

use crate::action::Buttons;
use crate::error::EmulatorFault;

/// NES output resolution.
pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;

/// An RGB frame, row-major, `height * width * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn blank() -> Self {
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            pixels: vec![0; FRAME_WIDTH * FRAME_HEIGHT * 3],
        }
    }

    /// Drops the alpha channel of an RGBA buffer.
    pub fn from_rgba(width: usize, rgba: &[u8]) -> Self {
        let mut pixels = Vec::with_capacity(rgba.len() / 4 * 3);
        for px in rgba.chunks_exact(4) {
            pixels.extend_from_slice(&px[..3]);
        }
        let height = if width == 0 { 0 } else { rgba.len() / 4 / width };
        Self {
            width,
            height,
            pixels,
        }
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, 3)
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 3;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
    }
}

/// Byte-addressable view of CPU memory.
pub trait MemoryView {
    fn peek(&self, addr: u16) -> u8;
}

/// A raw 2 KiB work-RAM snapshot. Addresses mirror every 0x0800 bytes like
/// the console's internal RAM.
impl MemoryView for [u8] {
    fn peek(&self, addr: u16) -> u8 {
        if self.is_empty() {
            return 0;
        }
        let idx = (addr as usize & 0x07FF) % self.len();
        self[idx]
    }
}

impl<const N: usize> MemoryView for [u8; N] {
    fn peek(&self, addr: u16) -> u8 {
        self.as_slice().peek(addr)
    }
}

/// The capability the environment needs from an emulator core.
///
/// Every call advances or inspects the machine in place; implementations are
/// not expected to be reentrant.
pub trait Emulator {
    /// Power-cycles the console back to its boot state.
    fn reset(&mut self) -> Result<(), EmulatorFault>;

    /// Runs exactly one video frame with `buttons` held on controller one.
    fn step(&mut self, buttons: Buttons) -> Result<(), EmulatorFault>;

    /// The most recently rendered frame.
    fn frame(&mut self) -> Frame;

    fn read_memory(&self, addr: u16) -> u8;

    fn write_memory(&mut self, addr: u16, value: u8);
}

/// Lets `GameState::decode` read straight from a live emulator.
pub struct EmulatorMemory<'a, E: ?Sized>(pub &'a E);

impl<E: Emulator + ?Sized> MemoryView for EmulatorMemory<'_, E> {
    fn peek(&self, addr: u16) -> u8 {
        self.0.read_memory(addr)
    }
}
