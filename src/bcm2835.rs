//! GPIO register backend for the Broadcom BCM2835 (Raspberry Pi).
//!
//! The controller exposes 54 pins as two 32-pin banks behind a single
//! 0x100-byte register window (physical 0x2020_0000, bus 0x7E20_0000).
//! Direction is a 3-bit function-select field packed ten pins per 32-bit
//! control word; output levels go through dedicated set/clear registers,
//! so driving a level never read-modify-writes the data path.

use log::{debug, trace};

use crate::mmap::{reg_read, reg_write, MappedRegion};
use crate::{GpioRegisters, Result};

/// Physical base of the GPIO register window.
const GPIO_BASE: u64 = 0x2020_0000;
/// Window length in bytes.
const GPIO_LEN: usize = 0x100;

// Word offsets from a bank base.
/// Function select 0 (pins 0-9); FSEL1..FSEL5 follow at the next words.
const GPIO_FSEL0: usize = 0;
/// Output set for the bank's 32 pins.
const GPIO_SET: usize = 7;
/// Output clear for the bank's 32 pins.
const GPIO_CLR: usize = 10;
/// Current pin level for the bank's 32 pins.
const GPIO_LEV: usize = 13;

/// Function-select field encoding for input mode.
const FSEL_INPUT: u32 = 0;
/// Function-select field encoding for output mode. Encodings 2-7 select
/// alternate pin functions and are never produced here.
const FSEL_OUTPUT: u32 = 1;

const BANKS: usize = 2;

/// Usable pins per bank. Bank 1 holds pins 32-53; its upper ten register
/// bits are reserved and must never be written.
const BANK_PIN_MASK: [u32; BANKS] = [0xffff_ffff, 0x003f_ffff];

/// BCM2835 GPIO controller context.
///
/// Owns the mapped register window; dropping it releases the mapping.
pub struct Bcm2835Gpio {
    banks: [*mut u32; BANKS],
    _window: MappedRegion,
}

impl Bcm2835Gpio {
    /// Map the controller's register window and build a context.
    pub fn new() -> Result<Bcm2835Gpio> {
        let window = MappedRegion::map(GPIO_BASE, GPIO_LEN)?;
        Ok(Bcm2835Gpio::with_window(window))
    }

    /// Build a context over an already-mapped register window.
    ///
    /// The tests use this with an anonymous mapping to run the register
    /// code against plain RAM.
    pub(crate) fn with_window(window: MappedRegion) -> Bcm2835Gpio {
        let base = window.as_ptr();
        // Bank 1's base is offset one word so the shared SET/CLR/LEV
        // offsets resolve to the second (high-pin) register of each pair.
        let banks = [base, unsafe { base.add(1) }];
        debug!("bcm2835: register window at {:p}", base);
        Bcm2835Gpio {
            banks,
            _window: window,
        }
    }

    /// Rewrite the 3-bit function-select field of every pin in `mask`
    /// (already clipped) to `fsel`, leaving the other nine fields of each
    /// shared control word untouched.
    fn select_function(&mut self, bank: usize, mut mask: u32, fsel: u32) {
        // Function-select words are addressed from bank 0 by absolute pin
        // number regardless of which bank the mask belongs to.
        let base = self.banks[0];
        let mut pin = bank as u32 * 32;
        while mask != 0 {
            if mask & 1 != 0 {
                let word = GPIO_FSEL0 + (pin / 10) as usize;
                let field = (pin % 10) * 3;
                let cur = unsafe { reg_read(base, word) };
                let next = (cur & !(0b111 << field)) | (fsel << field);
                unsafe { reg_write(base, word, next) };
            }
            pin += 1;
            mask >>= 1;
        }
    }
}

impl GpioRegisters for Bcm2835Gpio {
    fn name(&self) -> &'static str {
        "bcm2835"
    }

    fn bank_count(&self) -> usize {
        BANKS
    }

    fn set_output(&mut self, bank: usize, mask: u32, value: u32) {
        trace!(
            "bcm2835 set_output: bank {} mask {:08x} value {:08x}",
            bank,
            mask,
            value
        );
        let mask = mask & BANK_PIN_MASK[bank];
        let base = self.banks[bank];
        // Program the requested levels through the atomic set/clear
        // registers before touching direction, so a pin in any prior state
        // ends up output-driven at the requested level.
        let high = mask & value;
        if high != 0 {
            unsafe { reg_write(base, GPIO_SET, high) };
        }
        let low = mask & !value;
        if low != 0 {
            unsafe { reg_write(base, GPIO_CLR, low) };
        }
        self.select_function(bank, mask, FSEL_OUTPUT);
    }

    fn set_input(&mut self, bank: usize, mask: u32) {
        trace!("bcm2835 set_input: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        self.select_function(bank, mask, FSEL_INPUT);
    }

    fn get_direction(&self, bank: usize, mask: u32) -> u32 {
        trace!("bcm2835 get_direction: bank {} mask {:08x}", bank, mask);
        let mut mask = mask & BANK_PIN_MASK[bank];
        let base = self.banks[0];
        let mut pin = bank as u32 * 32;
        let mut bit = 1u32;
        let mut out = 0u32;
        while mask != 0 {
            if mask & 1 != 0 {
                let word = GPIO_FSEL0 + (pin / 10) as usize;
                let field = (pin % 10) * 3;
                let fsel = unsafe { reg_read(base, word) };
                if (fsel >> field) & 0b111 == FSEL_OUTPUT {
                    out |= bit;
                }
            }
            pin += 1;
            mask >>= 1;
            bit = bit.wrapping_shl(1);
        }
        out
    }

    fn set_dataout(&mut self, bank: usize, mask: u32) {
        trace!("bcm2835 set_dataout: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_write(self.banks[bank], GPIO_SET, mask) };
    }

    fn clr_dataout(&mut self, bank: usize, mask: u32) {
        trace!("bcm2835 clr_dataout: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_write(self.banks[bank], GPIO_CLR, mask) };
    }

    fn get_datain(&self, bank: usize, mask: u32) -> u32 {
        trace!("bcm2835 get_datain: bank {} mask {:08x}", bank, mask);
        let mask = mask & BANK_PIN_MASK[bank];
        unsafe { reg_read(self.banks[bank], GPIO_LEV) & mask }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gpio() -> Bcm2835Gpio {
        Bcm2835Gpio::with_window(MappedRegion::anonymous(GPIO_LEN).unwrap())
    }

    // Register words addressed absolutely from the start of the window.
    fn word(gpio: &Bcm2835Gpio, word: usize) -> u32 {
        unsafe { reg_read(gpio.banks[0], word) }
    }

    fn set_word(gpio: &mut Bcm2835Gpio, word: usize, value: u32) {
        unsafe { reg_write(gpio.banks[0], word, value) };
    }

    #[test]
    fn test_set_output_programs_set_and_clear() {
        let mut gpio = test_gpio();
        gpio.set_output(0, 0xff, 0x0f);
        assert_eq!(word(&gpio, GPIO_SET), 0x0f);
        assert_eq!(word(&gpio, GPIO_CLR), 0xf0);
    }

    #[test]
    fn test_set_output_then_direction_round_trip() {
        let mut gpio = test_gpio();
        let mask = (1 << 3) | (1 << 17) | (1 << 30);
        gpio.set_output(0, mask, mask);
        assert_eq!(gpio.get_direction(0, mask), mask);
        assert_eq!(gpio.get_direction(0, 0xffff_ffff), mask);

        gpio.set_input(0, 1 << 17);
        assert_eq!(gpio.get_direction(0, mask), (1 << 3) | (1 << 30));
    }

    #[test]
    fn test_function_select_field_packing() {
        let mut gpio = test_gpio();
        // Pin 3 lives in FSEL0 at field offset 9; pin 17 in FSEL1 at 21.
        gpio.set_output(0, (1 << 3) | (1 << 17), 0);
        assert_eq!(word(&gpio, GPIO_FSEL0), 0b001 << 9);
        assert_eq!(word(&gpio, GPIO_FSEL0 + 1), 0b001 << 21);
    }

    #[test]
    fn test_direction_change_leaves_neighbor_fields_alone() {
        let mut gpio = test_gpio();
        // All ten fields of FSEL0 set to an alternate-function encoding.
        set_word(&mut gpio, GPIO_FSEL0, 0x3fff_ffff);
        gpio.set_output(0, 1 << 3, 0);
        let fsel = word(&gpio, GPIO_FSEL0);
        assert_eq!((fsel >> 9) & 0b111, FSEL_OUTPUT);
        for field in (0..30).step_by(3) {
            if field == 9 {
                continue;
            }
            assert_eq!((fsel >> field) & 0b111, 0b111, "field {field} clobbered");
        }
    }

    #[test]
    fn test_bank1_mask_is_clipped_to_22_pins() {
        let mut gpio = test_gpio();
        gpio.set_dataout(1, 0xffff_ffff);
        // Bank 1's SET register is the word after bank 0's.
        assert_eq!(word(&gpio, GPIO_SET + 1), 0x003f_ffff);

        // Direction writes for the reserved high bits must not happen at
        // all: pins 54+ would land in FSEL5's upper fields.
        let mut clipped = test_gpio();
        clipped.set_output(1, 0xffc0_0000, 0xffff_ffff);
        for w in 0..0x40 {
            assert_eq!(word(&clipped, w), 0, "word {w} touched by clipped mask");
        }
    }

    #[test]
    fn test_bank1_registers_alias_high_words() {
        let mut gpio = test_gpio();
        gpio.set_dataout(1, 1 << 5);
        gpio.clr_dataout(1, 1 << 6);
        assert_eq!(word(&gpio, GPIO_SET + 1), 1 << 5);
        assert_eq!(word(&gpio, GPIO_CLR + 1), 1 << 6);
        assert_eq!(word(&gpio, GPIO_SET), 0);
        assert_eq!(word(&gpio, GPIO_CLR), 0);

        set_word(&mut gpio, GPIO_LEV + 1, 0x0015_0003);
        assert_eq!(gpio.get_datain(1, 0xffff_ffff), 0x0015_0003);
    }

    #[test]
    fn test_bank1_direction_uses_absolute_pin_numbers() {
        let mut gpio = test_gpio();
        // Bank 1 pin 0 is absolute pin 32: FSEL3, field offset 6.
        gpio.set_output(1, 1, 0);
        assert_eq!(word(&gpio, GPIO_FSEL0 + 3), 0b001 << 6);
        assert_eq!(gpio.get_direction(1, 1), 1);
        assert_eq!(gpio.get_direction(0, 0xffff_ffff), 0);
    }

    #[test]
    fn test_get_datain_applies_mask() {
        let mut gpio = test_gpio();
        set_word(&mut gpio, GPIO_LEV, 0xdead_beef);
        assert_eq!(gpio.get_datain(0, 0x0000_ffff), 0x0000_beef);
        assert_eq!(gpio.get_datain(0, 0), 0);
    }

    #[test]
    fn test_overlapping_set_then_clear() {
        let mut gpio = test_gpio();
        gpio.set_dataout(0, 0b1100);
        gpio.clr_dataout(0, 0b0110);
        // Both atomic registers received exactly their mask; on hardware
        // the overlapping pin 2 ends up low, pin 3 stays high.
        assert_eq!(word(&gpio, GPIO_SET), 0b1100);
        assert_eq!(word(&gpio, GPIO_CLR), 0b0110);
    }

    #[test]
    fn test_bank0_operations_leave_bank1_registers_alone() {
        let mut gpio = test_gpio();
        gpio.set_output(0, 0xffff_ffff, 0xaaaa_aaaa);
        gpio.set_dataout(0, 0x5555_5555);
        assert_eq!(word(&gpio, GPIO_SET + 1), 0);
        assert_eq!(word(&gpio, GPIO_CLR + 1), 0);
        assert_eq!(gpio.get_direction(1, 0xffff_ffff), 0);
    }
}
