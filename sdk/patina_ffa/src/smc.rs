//! Secure Monitor Call Primitive
//!
//! Issues a single blocking trap into a higher exception level carrying up to eight register-sized arguments, and
//! returns the eight register-sized results. The primitive holds no state; every caller builds its own arguments.
//!
//! ## Logging
//!
//! The `ffa` log target is used for tracing raw calls.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Register arguments and results of a single call.
///
/// `arg0` carries the function identifier on the way in and the return identifier (or status) on the way out.
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct SmcArgs {
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
    pub arg6: u64,
    pub arg7: u64,
}

impl SmcArgs {
    /// Creates arguments for `function` with every other register zeroed.
    pub const fn new(function: u64) -> Self {
        Self { arg0: function, arg1: 0, arg2: 0, arg3: 0, arg4: 0, arg5: 0, arg6: 0, arg7: 0 }
    }

    /// Returns the registers as an array in order.
    pub const fn to_array(&self) -> [u64; 8] {
        [self.arg0, self.arg1, self.arg2, self.arg3, self.arg4, self.arg5, self.arg6, self.arg7]
    }

    /// Builds arguments from an array of registers in order.
    pub const fn from_array(regs: [u64; 8]) -> Self {
        Self {
            arg0: regs[0],
            arg1: regs[1],
            arg2: regs[2],
            arg3: regs[3],
            arg4: regs[4],
            arg5: regs[5],
            arg6: regs[6],
            arg7: regs[7],
        }
    }
}

impl fmt::Debug for SmcArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SmcArgs[")?;
        for (i, reg) in self.to_array().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:#X}", reg)?;
        }
        write!(f, "]")
    }
}

/// Trait for issuing a call into the secure world.
///
/// This trait abstracts the trap instruction so the session and event loop logic can be tested without a secure
/// monitor present.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SmcCall {
    /// Issues the call and blocks until the callee returns control.
    fn call(&self, args: SmcArgs) -> SmcArgs;
}

/// The instruction used to reach the callee.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Conduit {
    /// Secure Monitor Call. Used by the normal world to reach EL3 or the SPMC.
    Smc,
    /// Supervisor Call. Used by a secure partition to reach its partition manager.
    Svc,
}

/// The architectural call primitive.
///
/// On targets other than AArch64 there is no secure world to reach, so every call is answered with the FF-A
/// "not supported" error.
#[derive(Debug, Copy, Clone)]
pub struct ArmSmc {
    conduit: Conduit,
}

impl ArmSmc {
    /// Creates a call primitive using the given conduit.
    ///
    /// ## Safety
    ///
    /// Calls issued through the returned value hand control to a more privileged component which may read and
    /// write any memory shared with it. The caller must ensure every address passed in a register refers to memory
    /// that is valid for the callee to access for the duration of the call.
    pub const unsafe fn new(conduit: Conduit) -> Self {
        Self { conduit }
    }

    /// Returns the conduit this primitive traps through.
    pub fn conduit(&self) -> Conduit {
        self.conduit
    }
}

impl SmcCall for ArmSmc {
    #[cfg(not(tarpaulin_include))]
    fn call(&self, args: SmcArgs) -> SmcArgs {
        log::trace!(target: "ffa", "{:?} call: {:?}", self.conduit, args);

        #[allow(unused_mut)]
        let mut regs = args.to_array();

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                // SAFETY: The constructor contract guarantees any memory referenced by the arguments is valid for
                // the callee. Registers x8-x17 may be clobbered by SMCCC v1.2 callees.
                unsafe {
                    match self.conduit {
                        Conduit::Smc => core::arch::asm!(
                            "smc #0",
                            inout("x0") regs[0],
                            inout("x1") regs[1],
                            inout("x2") regs[2],
                            inout("x3") regs[3],
                            inout("x4") regs[4],
                            inout("x5") regs[5],
                            inout("x6") regs[6],
                            inout("x7") regs[7],
                            lateout("x8") _, lateout("x9") _, lateout("x10") _, lateout("x11") _,
                            lateout("x12") _, lateout("x13") _, lateout("x14") _, lateout("x15") _,
                            lateout("x16") _, lateout("x17") _,
                            options(nostack),
                        ),
                        Conduit::Svc => core::arch::asm!(
                            "svc #0",
                            inout("x0") regs[0],
                            inout("x1") regs[1],
                            inout("x2") regs[2],
                            inout("x3") regs[3],
                            inout("x4") regs[4],
                            inout("x5") regs[5],
                            inout("x6") regs[6],
                            inout("x7") regs[7],
                            lateout("x8") _, lateout("x9") _, lateout("x10") _, lateout("x11") _,
                            lateout("x12") _, lateout("x13") _, lateout("x14") _, lateout("x15") _,
                            lateout("x16") _, lateout("x17") _,
                            options(nostack),
                        ),
                    }
                }
            } else {
                log::error!(target: "ffa", "Secure world calls are only available on AArch64.");
                let status = crate::abi::FfaStatus::NotSupported as i32 as i64 as u64;
                regs = [crate::abi::FFA_ERROR, 0, status, 0, 0, 0, 0, 0];
            }
        }

        let result = SmcArgs::from_array(regs);
        log::trace!(target: "ffa", "{:?} result: {:?}", self.conduit, result);
        result
    }
}
