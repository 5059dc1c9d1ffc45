//! Physical register window mapping.
//!
//! Both GPIO backends reach their controller through fixed physical
//! register windows mapped from `/dev/mem`. A [`MappedRegion`] owns one
//! such window for its lifetime and unmaps it on drop, so a backend that
//! fails partway through initialization cannot leak an earlier mapping.
//!
//! Registers are accessed exclusively through the volatile word primitives
//! below; the compiler must never cache or elide these reads and writes.

use std::io;
use std::ptr;

use log::debug;

use crate::{Error, Result};

const DEV_MEM: &str = "/dev/mem";

/// An exclusively-owned mapping of one physical register window.
///
/// A `MappedRegion` only exists if the mapping succeeded, so dropping it is
/// always paired with exactly one successful `mmap(2)`.
pub struct MappedRegion {
    addr: *mut u32,
    len: usize,
}

impl MappedRegion {
    /// Map `len` bytes of physical address space starting at `base`
    /// read-write through `/dev/mem`.
    pub fn map(base: u64, len: usize) -> Result<MappedRegion> {
        let fd = unsafe {
            libc::open(
                b"/dev/mem\0".as_ptr().cast(),
                libc::O_RDWR | libc::O_SYNC,
            )
        };
        if fd < 0 {
            return Err(Error::Open {
                path: DEV_MEM,
                source: io::Error::last_os_error(),
            });
        }
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                base as libc::off_t,
            )
        };
        // Capture errno before close(2) can overwrite it; the mapping keeps
        // the pages alive on its own, the descriptor is not needed further.
        let mmap_err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        if addr == libc::MAP_FAILED {
            return Err(Error::Map {
                base,
                len,
                source: mmap_err,
            });
        }
        debug!("mapped {:#x}+{:#x} at {:p}", base, len, addr);
        Ok(MappedRegion {
            addr: addr.cast(),
            len,
        })
    }

    /// Map `len` bytes of zero-filled anonymous memory.
    ///
    /// Lets the register code run against plain RAM where no privileged
    /// hardware access is available; the crate's own tests are built on
    /// this.
    pub fn anonymous(len: usize) -> Result<MappedRegion> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::Map {
                base: 0,
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(MappedRegion {
            addr: addr.cast(),
            len,
        })
    }

    /// Base of the window as a word pointer.
    pub fn as_ptr(&self) -> *mut u32 {
        self.addr
    }

    /// Window length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is zero-length (never true for a mapped window).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        debug!("unmapping {:#x} bytes at {:p}", self.len, self.addr);
        unsafe {
            libc::munmap(self.addr.cast(), self.len);
        }
    }
}

/// Volatile read of the register `word` 32-bit words past `base`.
///
/// # Safety
/// `base.add(word)` must lie within a live mapped window.
#[inline]
pub(crate) unsafe fn reg_read(base: *const u32, word: usize) -> u32 {
    unsafe { ptr::read_volatile(base.add(word)) }
}

/// Volatile write of the register `word` 32-bit words past `base`.
///
/// # Safety
/// `base.add(word)` must lie within a live mapped window.
#[inline]
pub(crate) unsafe fn reg_write(base: *mut u32, word: usize, value: u32) {
    unsafe { ptr::write_volatile(base.add(word), value) }
}
