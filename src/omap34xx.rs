//! GPIO register backend for the TI OMAP34xx family.
//!
//! Six independent 32-pin banks: GPIO1 in its own register window, GPIO2-6
//! packed 0x2000 bytes apart in a second window. Direction is one
//! output-enable bit per pin, and levels are driven through dedicated
//! set/clear registers. The data-in register does not track a pin's own
//! driven output, so level reads reconcile output-enable state with both
//! data registers.

use log::{debug, trace};

use crate::mmap::{reg_read, reg_write, MappedRegion};
use crate::{GpioRegisters, Result};

/// Physical base of the GPIO1 register window.
const GPIO1_BASE: u64 = 0x4831_0000;
/// GPIO1 window length in bytes.
const GPIO1_LEN: usize = 0x2000;
/// Physical base of the window holding GPIO2 through GPIO6.
const GPIO2_BASE: u64 = 0x4905_0000;
/// GPIO2-6 window length in bytes.
const GPIO2_LEN: usize = 0xA000;
/// Byte stride between consecutive banks in the GPIO2-6 window.
const BANK_STRIDE: usize = 0x2000;

// Word offsets from a bank base (byte offset / 4).
/// Output enable; a set bit drives the pin as output in this contract.
const GPIO_OE: usize = 0x34 / 4;
/// Raw input level.
const GPIO_DATAIN: usize = 0x38 / 4;
/// Driven output level.
const GPIO_DATAOUT: usize = 0x3c / 4;
/// Atomic clear of DATAOUT bits.
const GPIO_CLEARDATAOUT: usize = 0x90 / 4;
/// Atomic set of DATAOUT bits.
const GPIO_SETDATAOUT: usize = 0x94 / 4;

const BANKS: usize = 6;

/// Usable pins per bank; every OMAP34xx bank exposes the full 32 pins.
/// A narrower future bank only needs its entry changed here.
const BANK_PIN_MASK: [u32; BANKS] = [0xffff_ffff; BANKS];

/// OMAP34xx GPIO controller context.
///
/// Owns both mapped register windows; dropping it releases them.
pub struct Omap34xxGpio {
    banks: [*mut u32; BANKS],
    _windows: [MappedRegion; 2],
}

impl Omap34xxGpio {
    /// Map both register windows and build a context.
    pub fn new() -> Result<Omap34xxGpio> {
        let gpio1 = MappedRegion::map(GPIO1_BASE, GPIO1_LEN)?;
        // If this second mapping fails, `gpio1` unmaps on the error return.
        let gpio2 = MappedRegion::map(GPIO2_BASE, GPIO2_LEN)?;
        Ok(Omap34xxGpio::with_windows(gpio1, gpio2))
    }

    /// Build a context over already-mapped windows.
    ///
    /// The tests use this with anonymous mappings to run the register code
    /// against plain RAM.
    pub(crate) fn with_windows(gpio1: MappedRegion, gpio2: MappedRegion) -> Omap34xxGpio {
        let mut banks = [std::ptr::null_mut(); BANKS];
        banks[0] = gpio1.as_ptr();
        for (i, bank) in banks.iter_mut().enumerate().skip(1) {
            *bank = unsafe { gpio2.as_ptr().add((i - 1) * BANK_STRIDE / 4) };
        }
        debug!(
            "omap34xx: register windows at {:p} and {:p}",
            gpio1.as_ptr(),
            gpio2.as_ptr()
        );
        Omap34xxGpio {
            banks,
            _windows: [gpio1, gpio2],
        }
    }
}

impl GpioRegisters for Omap34xxGpio {
    fn name(&self) -> &'static str {
        "omap34xx"
    }

    fn bank_count(&self) -> usize {
        BANKS
    }

    fn set_output(&mut self, bank: usize, mask: u32, value: u32) {
        trace!(
            "omap34xx set_output: bank {} mask {:08x} value {:08x}",
            bank,
            mask,
            value
        );
        let mask = mask & BANK_PIN_MASK[bank];
        let base = self.banks[bank];
        // Latch the requested levels into DATAOUT first; they only reach
        // the pins once the output-enable bits flip below.
        let high = mask & value;
        if high != 0 {
            unsafe { reg_write(base, GPIO_SETDATAOUT, high) };
        }
        let low = mask & !value;
        if low != 0 {
            unsafe { reg_write(base, GPIO_CLEARDATAOUT, low) };
        }
        let oe = unsafe { reg_read(base, GPIO_OE) };
        unsafe { reg_write(base, GPIO_OE, oe | mask) };
    }

    fn set_input(&mut self, bank: usize, mask: u32) {
        trace!("omap34xx set_input: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        let base = self.banks[bank];
        let oe = unsafe { reg_read(base, GPIO_OE) };
        unsafe { reg_write(base, GPIO_OE, oe & !mask) };
    }

    fn get_direction(&self, bank: usize, mask: u32) -> u32 {
        trace!("omap34xx get_direction: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_read(self.banks[bank], GPIO_OE) & mask }
    }

    fn set_dataout(&mut self, bank: usize, mask: u32) {
        trace!("omap34xx set_dataout: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_write(self.banks[bank], GPIO_SETDATAOUT, mask) };
    }

    fn clr_dataout(&mut self, bank: usize, mask: u32) {
        trace!("omap34xx clr_dataout: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_write(self.banks[bank], GPIO_CLEARDATAOUT, mask) };
    }

    fn get_datain(&self, bank: usize, mask: u32) -> u32 {
        trace!("omap34xx get_datain: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        let base = self.banks[bank];
        // DATAIN does not reflect a pin's own driven output, so take the
        // DATAOUT bit for output-enabled pins and the DATAIN bit otherwise.
        let oe = unsafe { reg_read(base, GPIO_OE) };
        let din = unsafe { reg_read(base, GPIO_DATAIN) };
        let dout = unsafe { reg_read(base, GPIO_DATAOUT) };
        ((dout & oe) | (din & !oe)) & mask
    }
}
