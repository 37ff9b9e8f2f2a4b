//! Shared Communication Buffer
//!
//! A single statically reserved memory region is used to marshal every request and response exchanged with the
//! secure partition. The secure side always addresses it by its physical address. The normal world starts out using
//! the physical address as well, and switches to a virtual address once when the OS takes over the address space.
//!
//! ## Logging
//!
//! The `mm_comm` log target is used for buffer lifecycle messages.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;
use core::pin::Pin;
use core::ptr::NonNull;

use crate::error::{EfiError, Result};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Converts a physical address to its virtual mapping.
///
/// Implemented over the runtime services `ConvertPointer()` call with the optional pointer flag set.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait AddressConverter {
    /// Returns the virtual address for `address`.
    ///
    /// `Ok(None)` means no mapping exists and the address should be left as it is.
    fn convert_pointer(&self, address: usize) -> Result<Option<usize>>;
}

/// Addressing mode of the buffer from the caller's point of view.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressMode {
    Physical,
    Virtual,
}

/// Shared Communication Buffer
///
/// Owns the description of the region: its physical base, the base the current address space reaches it at, and
/// its fixed length.
pub struct CommBuffer {
    physical_base: u64,
    current_base: NonNull<u8>,
    length: usize,
    mode: AddressMode,
}

impl CommBuffer {
    /// Creates a `CommBuffer` over a static buffer whose physical address equals its current address.
    ///
    /// ## Safety
    ///
    /// - The buffer must have a static lifetime.
    /// - The buffer must not be moved in memory while it is being used.
    /// - The buffer must not be used by any other code except the secure partition it is shared with.
    pub unsafe fn new(buffer: Pin<&'static mut [u8]>) -> Self {
        let buffer = Pin::into_inner(buffer);
        let length = buffer.len();
        let current_base = NonNull::from(buffer).cast::<u8>();
        Self { physical_base: current_base.as_ptr() as u64, current_base, length, mode: AddressMode::Physical }
    }

    /// Creates a `CommBuffer` from a fixed physical range that is identity mapped at boot time.
    ///
    /// Fails with `InvalidParameter` when the base is null or the length is zero.
    ///
    /// ## Safety
    ///
    /// - The range must be valid for reads and writes of `length` bytes for the rest of the boot.
    /// - The range must not be used by any other code except the secure partition it is shared with.
    pub unsafe fn from_raw_parts(physical_base: u64, length: usize) -> Result<Self> {
        if length == 0 {
            log::error!(target: "mm_comm", "Shared buffer at {:#X} has zero length.", physical_base);
            return Err(EfiError::InvalidParameter);
        }
        let current_base = NonNull::new(physical_base as usize as *mut u8).ok_or_else(|| {
            log::error!(target: "mm_comm", "Shared buffer has a null base address.");
            EfiError::InvalidParameter
        })?;
        Ok(Self { physical_base, current_base, length, mode: AddressMode::Physical })
    }

    /// Returns the physical base address handed to the secure world.
    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    /// Returns the base address the buffer is currently accessed at.
    pub fn current_base(&self) -> usize {
        self.current_base.as_ptr() as usize
    }

    /// Returns the length of the buffer.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the buffer is currently reached through a physical or a virtual address.
    pub fn address_mode(&self) -> AddressMode {
        self.mode
    }

    /// Returns the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The constructors require the region to be valid for `length` bytes at `current_base`, and the
        // address is only ever replaced by its translation.
        unsafe { core::slice::from_raw_parts(self.current_base.as_ptr(), self.length) }
    }

    /// Returns the buffer contents mutably.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        // SAFETY: See `as_slice`. The exclusive borrow of `self` prevents aliasing through this value.
        unsafe { core::slice::from_raw_parts_mut(self.current_base.as_ptr(), self.length) }
    }

    /// Translates the current base to its virtual mapping.
    ///
    /// Only the first call has an effect. A missing mapping or a conversion failure leaves the physical address in
    /// place; the physical base reported to the secure world never changes.
    pub fn convert_to_virtual(&mut self, converter: &dyn AddressConverter) {
        if self.mode == AddressMode::Virtual {
            log::warn!(target: "mm_comm", "Shared buffer was already converted to {:#X}.", self.current_base());
            return;
        }

        match converter.convert_pointer(self.current_base()) {
            Ok(Some(address)) => match NonNull::new(address as *mut u8) {
                Some(base) => {
                    log::info!(
                        target: "mm_comm",
                        "Shared buffer remapped {:#X} -> {:#X}.",
                        self.current_base(),
                        address
                    );
                    self.current_base = base;
                    self.mode = AddressMode::Virtual;
                }
                None => log::warn!(target: "mm_comm", "Shared buffer translated to a null address, keeping physical."),
            },
            Ok(None) => {
                log::info!(target: "mm_comm", "No virtual mapping for shared buffer at {:#X}.", self.current_base());
            }
            Err(err) => {
                log::error!(
                    target: "mm_comm",
                    "Failed to convert shared buffer address {:#X}: {:?}",
                    self.current_base(),
                    err
                );
            }
        }
    }
}

#[cfg(not(tarpaulin_include))]
impl fmt::Debug for CommBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CommBuffer(phys: {:#X}, current: {:#X}, len: {:#X}, {:?})",
            self.physical_base,
            self.current_base(),
            self.len(),
            self.mode
        )?;
        for (i, chunk) in self.as_slice().chunks(16).take(8).enumerate() {
            write!(f, "{:08X}: ", i * 16)?;
            for byte in chunk {
                write!(f, "{:02X} ", byte)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
