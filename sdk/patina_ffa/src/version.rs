//! Interface Version Words
//!
//! Both the FF-A and legacy MM version calls exchange a single 32-bit word with the major version in bits 30:16 and
//! the minor version in bits 15:0. A callee that does not implement the call answers with the all-ones word.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

/// Returned in place of a version word by a callee that does not implement the version call.
pub const VERSION_NOT_SUPPORTED: u32 = 0xFFFF_FFFF;

const MAJOR_SHIFT: u32 = 16;
const MAJOR_MASK: u32 = 0x7FFF;
const MINOR_MASK: u32 = 0xFFFF;

/// A major/minor interface version.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    /// Creates a version from its components.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Packs the version into the word sent to the callee.
    pub const fn pack(self) -> u32 {
        ((self.major as u32 & MAJOR_MASK) << MAJOR_SHIFT) | (self.minor as u32 & MINOR_MASK)
    }

    /// Unpacks the word returned by the callee.
    ///
    /// Returns `None` when the callee answered with [`VERSION_NOT_SUPPORTED`]. Only the low 32 bits of the register
    /// are considered.
    pub const fn from_register(value: u64) -> Option<Self> {
        let word = value as u32;
        if word == VERSION_NOT_SUPPORTED {
            return None;
        }
        Some(Self { major: ((word >> MAJOR_SHIFT) & MAJOR_MASK) as u16, minor: (word & MINOR_MASK) as u16 })
    }

    /// Returns whether a callee reporting `self` can serve a caller that requires `required`.
    ///
    /// The majors must match exactly and the callee's minor must be at least the caller's minor.
    pub const fn satisfies(&self, required: Version) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
