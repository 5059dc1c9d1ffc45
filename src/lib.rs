//! Memory-mapped GPIO register access for embedded Linux single-board
//! computers.
//!
//! Two SoC GPIO controller families are supported behind one register-level
//! contract:
//! - [`Bcm2835Gpio`]: Broadcom BCM2835 (Raspberry Pi). Pin direction is a
//!   3-bit function-select field packed ten pins per control word; output
//!   levels are driven through dedicated set/clear registers.
//! - [`Omap34xxGpio`]: TI OMAP34xx. Six independent banks, each with a
//!   single output-enable register (one direction bit per pin) and separate
//!   data-in/data-out registers plus atomic set/clear registers.
//!
//! A backend is selected once at startup, either directly or by chip name,
//! and every subsequent operation addresses a 32-pin register bank with a
//! pin bitmask:
//!
//! ```no_run
//! use sbc_gpio::{open, Chip, GpioRegisters};
//!
//! # fn main() -> Result<(), sbc_gpio::Error> {
//! let mut gpio = open(Chip::Bcm2835)?;
//! gpio.set_output(0, 1 << 17, 1 << 17); // drive pin 17 high
//! assert_eq!(gpio.get_direction(0, 1 << 17), 1 << 17);
//! let level = gpio.get_datain(0, 1 << 4); // sample pin 4
//! # let _ = level;
//! # Ok(())
//! # }
//! ```
//!
//! Register access requires mapping the controller's physical register
//! windows through `/dev/mem`, which normally needs root. Initialization is
//! the only fallible step; the per-bank operations are direct register
//! reads and writes with no error path.

#![warn(missing_docs)]

pub mod bcm2835;
pub mod mmap;
pub mod omap34xx;

use std::io;

use thiserror::Error;

pub use bcm2835::Bcm2835Gpio;
pub use mmap::MappedRegion;
pub use omap34xx::Omap34xxGpio;

/// Errors reported by backend initialization and chip selection.
#[derive(Debug, Error)]
pub enum Error {
    /// The register device node could not be opened.
    #[error("failed to open {path}")]
    Open {
        /// Device node path, normally `/dev/mem`.
        path: &'static str,
        /// OS error from the failing `open(2)`.
        source: io::Error,
    },
    /// A physical register window could not be mapped.
    #[error("failed to map {len:#x} bytes at physical {base:#x}")]
    Map {
        /// Physical base address of the window.
        base: u64,
        /// Window length in bytes.
        len: usize,
        /// OS error from the failing `mmap(2)`.
        source: io::Error,
    },
    /// No backend is registered under the requested chip name.
    #[error("unknown GPIO chip {0:?}")]
    UnknownChip(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Supported GPIO controller families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    /// Broadcom BCM2835 (Raspberry Pi), 54 pins in two banks.
    Bcm2835,
    /// TI OMAP34xx (BeagleBoard and friends), 192 pins in six banks.
    Omap34xx,
}

impl Chip {
    /// Look up a chip by its backend name (`"bcm2835"` or `"omap34xx"`).
    pub fn from_name(name: &str) -> Result<Chip> {
        match name {
            "bcm2835" => Ok(Chip::Bcm2835),
            "omap34xx" => Ok(Chip::Omap34xx),
            other => Err(Error::UnknownChip(other.to_string())),
        }
    }

    /// The backend name used for selection and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Chip::Bcm2835 => "bcm2835",
            Chip::Omap34xx => "omap34xx",
        }
    }
}

/// The register-level GPIO contract implemented by every backend.
///
/// All operations address one 32-pin register bank by 0-based index and a
/// pin bitmask where bit *i* selects pin *i* of that bank. Masks are
/// silently clipped to the bank's usable pin range, so callers may pass
/// garbage high bits for banks with fewer than 32 physical pins without
/// disturbing reserved register bits.
///
/// Passing a bank index at or above [`bank_count`](GpioRegisters::bank_count)
/// is a contract violation and panics.
///
/// A context owns its register mappings exclusively and provides no internal
/// locking. The direction updates are read-modify-write sequences on shared
/// control words, so concurrent mutation of the same context must be
/// serialized by the caller; the contexts are `!Send`/`!Sync`, which makes a
/// single controlling thread the default.
pub trait GpioRegisters {
    /// Backend name for selection and diagnostics.
    fn name(&self) -> &'static str;

    /// Number of 32-pin register banks this backend addresses.
    fn bank_count(&self) -> usize;

    /// Drive every pin in `mask` to the corresponding bit of `value` and
    /// configure it as output.
    ///
    /// The levels are programmed through the hardware's atomic set/clear
    /// registers first, then direction is switched to output, so a pin in
    /// any prior state ends up output-driven at the requested level without
    /// glitching through the wrong one.
    fn set_output(&mut self, bank: usize, mask: u32, value: u32);

    /// Configure every pin in `mask` as input.
    ///
    /// Level state is left untouched; the data-out register may retain a
    /// stale driven value internally, but it is disconnected from the pin
    /// once input mode takes effect.
    fn set_input(&mut self, bank: usize, mask: u32);

    /// Report direction for the pins in `mask`: a set bit means output.
    ///
    /// Bits outside `mask` (and outside the bank's usable range) are zero.
    fn get_direction(&self, bank: usize, mask: u32) -> u32;

    /// Atomically drive every pin in `mask` high via the dedicated set
    /// register. Pins outside the mask and pin directions are unaffected.
    fn set_dataout(&mut self, bank: usize, mask: u32);

    /// Atomically drive every pin in `mask` low via the dedicated clear
    /// register. Symmetric to [`set_dataout`](GpioRegisters::set_dataout).
    fn clr_dataout(&mut self, bank: usize, mask: u32);

    /// Read the current logic level of the pins in `mask`.
    ///
    /// For pins configured as output on controllers whose data-in register
    /// does not track driven output (OMAP34xx), the level is reconstructed
    /// from the output-enable and data-out registers instead.
    fn get_datain(&self, bank: usize, mask: u32) -> u32;
}

/// Map the selected chip's register windows and return its backend.
///
/// This is the only fallible entry point; see [`Error`] for the failure
/// modes. On any mapping failure every window mapped so far is released
/// before the error is returned.
pub fn open(chip: Chip) -> Result<Box<dyn GpioRegisters>> {
    match chip {
        Chip::Bcm2835 => Ok(Box::new(Bcm2835Gpio::new()?)),
        Chip::Omap34xx => Ok(Box::new(Omap34xxGpio::new()?)),
    }
}
