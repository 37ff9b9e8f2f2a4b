//! Version & Capability Negotiation
//!
//! Exchanges version words with the secure world once at session creation and decides which calling convention
//! stays active for the lifetime of the session.
//!
//! ## Logging
//!
//! The `ffa` log target is used for negotiation results.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_ffa::{
    abi::{ARM_SMC_ID_MM_VERSION_AARCH32, FFA_VERSION},
    error::{EfiError, Result},
    smc::{SmcArgs, SmcCall},
    version::Version,
};

use crate::config::CallingConvention;

/// Version sent when requesting the partition-addressed convention.
pub const FFA_CALLER_VERSION: Version = Version::new(1, 1);

/// Version required of the secure world for the legacy convention.
pub const LEGACY_CALLER_VERSION: Version = Version::new(1, 0);

/// Negotiates the calling convention with the secure world.
///
/// When the partition-addressed convention is requested but the secure world only reports FF-A v1.0, the session
/// falls back to the legacy convention instead of failing. Any other mismatch fails with `Unsupported`.
pub fn negotiate(smc: &dyn SmcCall, requested: CallingConvention) -> Result<CallingConvention> {
    let (args, caller_version) = match requested {
        CallingConvention::PartitionAddressed => {
            let mut args = SmcArgs::new(FFA_VERSION);
            args.arg1 = FFA_CALLER_VERSION.pack() as u64;
            (args, FFA_CALLER_VERSION)
        }
        CallingConvention::Legacy => (SmcArgs::new(ARM_SMC_ID_MM_VERSION_AARCH32), LEGACY_CALLER_VERSION),
    };

    let ret = smc.call(args);
    let Some(remote) = Version::from_register(ret.arg0) else {
        log::error!(target: "ffa", "Secure world does not implement the {:?} version call.", requested);
        return Err(EfiError::Unsupported);
    };
    log::info!(target: "ffa", "Secure world version {} (caller {}).", remote, caller_version);

    if remote.satisfies(caller_version) {
        return Ok(requested);
    }

    if requested == CallingConvention::PartitionAddressed && remote.satisfies(LEGACY_CALLER_VERSION) {
        log::warn!(target: "ffa", "FF-A {} lacks direct request support for MM, falling back to legacy.", remote);
        return Ok(CallingConvention::Legacy);
    }

    log::error!(target: "ffa", "Incompatible secure world version {} (caller {}).", remote, caller_version);
    Err(EfiError::Unsupported)
}
