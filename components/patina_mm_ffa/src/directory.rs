//! FF-A Partition Directory
//!
//! Discovers the local endpoint ID and the MM secure partition's descriptor. Discovery registers a pair of
//! page-aligned RX/TX buffers with the partition manager, which it fills with the query results. The RX buffer is
//! handed back as soon as the descriptor is copied out, and the pair stays registered until the boot environment
//! shuts down.
//!
//! ## Logging
//!
//! The `ffa` log target is used for discovery steps.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::boxed::Box;

use core::cell::UnsafeCell;

use patina_ffa::{
    abi::{
        FfaStatus, FFA_ERROR, FFA_ID_GET, FFA_PAGE_SIZE, FFA_PARTITION_INFO_GET, FFA_RXTX_MAP_AARCH64,
        FFA_RXTX_PAGE_COUNT, FFA_RXTX_UNMAP, FFA_RX_RELEASE,
    },
    error::{EfiError, Result},
    partition::{smccc_uuid_words, PartitionInfo},
    smc::{SmcArgs, SmcCall},
};
use r_efi::efi;

/// The service identifier the MM secure partition registers under.
pub const EFI_MM_COMMUNICATION2_PROTOCOL_GUID: efi::Guid =
    efi::Guid::from_fields(0x378daedc, 0xf06b, 0x4446, 0x83, 0x14, &[0x40, 0xab, 0x93, 0x3c, 0x87, 0xa3]);

/// A single page written by the partition manager behind the compiler's back.
#[repr(C, align(4096))]
struct ScratchPage(UnsafeCell<[u8; FFA_PAGE_SIZE]>);

impl ScratchPage {
    fn new() -> Self {
        Self(UnsafeCell::new([0; FFA_PAGE_SIZE]))
    }

    fn address(&self) -> u64 {
        self.0.get() as u64
    }

    fn contents(&self) -> &[u8] {
        // SAFETY: The partition manager only writes the RX page between a partition query and the matching
        // release, and no Rust reference to the page is held across that window.
        unsafe { &*self.0.get() }
    }
}

struct RxTxPair {
    tx: ScratchPage,
    rx: ScratchPage,
}

/// Result of a successful discovery.
pub struct PartitionDirectory {
    local_id: u16,
    remote: PartitionInfo,
    buffers: Option<Box<RxTxPair>>,
}

fn check(ret: SmcArgs, step: &str) -> Result<SmcArgs> {
    if ret.arg0 == FFA_ERROR {
        log::error!(target: "ffa", "{} failed: {:?} ({:#X}).", step, FfaStatus::from_register(ret.arg2), ret.arg2);
        return Err(EfiError::Unsupported);
    }
    Ok(ret)
}

impl PartitionDirectory {
    /// Discovers the local endpoint and the partition serving `service`.
    ///
    /// Every failure is reported as `Unsupported`. If a failure happens after the RX/TX pair is registered, the
    /// pair is unregistered first.
    pub fn discover(smc: &dyn SmcCall, service: &efi::Guid) -> Result<Self> {
        let ret = check(smc.call(SmcArgs::new(FFA_ID_GET)), "FFA_ID_GET")?;
        let local_id = ret.arg2 as u16;
        log::debug!(target: "ffa", "Local endpoint ID {:#06X}.", local_id);

        let buffers = Box::new(RxTxPair { tx: ScratchPage::new(), rx: ScratchPage::new() });
        let mut map = SmcArgs::new(FFA_RXTX_MAP_AARCH64);
        map.arg1 = buffers.tx.address();
        map.arg2 = buffers.rx.address();
        map.arg3 = FFA_RXTX_PAGE_COUNT;
        check(smc.call(map), "FFA_RXTX_MAP")?;
        log::debug!(target: "ffa", "Mapped TX {:#X} / RX {:#X}.", map.arg1, map.arg2);

        let mut directory = Self { local_id, remote: PartitionInfo::default(), buffers: Some(buffers) };
        match directory.query(smc, service) {
            Ok(remote) => {
                log::info!(
                    target: "ffa",
                    "MM partition {:#06X}: {} execution contexts, properties {:#X}.",
                    remote.partition_id,
                    remote.execution_context_count,
                    remote.properties
                );
                directory.remote = remote;
                Ok(directory)
            }
            Err(err) => {
                directory.unmap(smc);
                Err(err)
            }
        }
    }

    fn query(&self, smc: &dyn SmcCall, service: &efi::Guid) -> Result<PartitionInfo> {
        let words = smccc_uuid_words(service);
        let mut args = SmcArgs::new(FFA_PARTITION_INFO_GET);
        args.arg1 = words[0] as u64;
        args.arg2 = words[1] as u64;
        args.arg3 = words[2] as u64;
        args.arg4 = words[3] as u64;
        let ret = check(smc.call(args), "FFA_PARTITION_INFO_GET")?;
        if ret.arg2 == 0 {
            log::error!(target: "ffa", "No partition serves {:?}.", service);
            return Err(EfiError::Unsupported);
        }

        let rx = self.buffers.as_ref().map(|buffers| buffers.rx.contents()).ok_or(EfiError::Unsupported)?;
        let remote = PartitionInfo::read_first(rx).ok_or(EfiError::Unsupported)?;

        let mut release = SmcArgs::new(FFA_RX_RELEASE);
        release.arg1 = self.local_id as u64;
        check(smc.call(release), "FFA_RX_RELEASE")?;

        Ok(remote)
    }

    /// Returns the local endpoint ID.
    pub fn local_id(&self) -> u16 {
        self.local_id
    }

    /// Returns the MM partition's descriptor.
    pub fn remote(&self) -> PartitionInfo {
        self.remote
    }

    /// Returns whether the RX/TX pair is still registered.
    pub fn is_mapped(&self) -> bool {
        self.buffers.is_some()
    }

    /// Unregisters the RX/TX pair. Calls after the first have no effect.
    ///
    /// If the partition manager refuses, the pages are leaked since it may still write to them.
    pub fn unmap(&mut self, smc: &dyn SmcCall) {
        let Some(buffers) = self.buffers.take() else {
            return;
        };

        let mut args = SmcArgs::new(FFA_RXTX_UNMAP);
        args.arg1 = (self.local_id as u64) << 16;
        let ret = smc.call(args);
        if ret.arg0 == FFA_ERROR {
            log::error!(target: "ffa", "FFA_RXTX_UNMAP failed: {:#X}. Leaking RX/TX pages.", ret.arg2);
            core::mem::forget(buffers);
        } else {
            log::debug!(target: "ffa", "Unmapped RX/TX pair.");
        }
    }
}

impl core::fmt::Debug for PartitionDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PartitionDirectory")
            .field("local_id", &self.local_id)
            .field("remote", &self.remote)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use patina_ffa::{abi::FFA_SUCCESS_AARCH32, smc::MockSmcCall};
    use std::sync::{Arc, Mutex};
    use zerocopy::IntoBytes;

    const LOCAL_ID: u16 = 0x0001;
    const REMOTE: PartitionInfo = PartitionInfo { partition_id: 0x8003, execution_context_count: 1, properties: 0x3 };

    fn success(arg2: u64) -> SmcArgs {
        let mut ret = SmcArgs::new(FFA_SUCCESS_AARCH32);
        ret.arg2 = arg2;
        ret
    }

    fn error(status: FfaStatus) -> SmcArgs {
        let mut ret = SmcArgs::new(FFA_ERROR);
        ret.arg2 = status as i32 as i64 as u64;
        ret
    }

    /// Expects ID_GET and RXTX_MAP, recording the RX page address the directory registers.
    fn expect_discovery_until_query(smc: &mut MockSmcCall, seq: &mut Sequence) -> Arc<Mutex<u64>> {
        let rx_address = Arc::new(Mutex::new(0u64));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_ID_GET)
            .times(1)
            .in_sequence(seq)
            .returning(|_| success(LOCAL_ID as u64));
        let rx = rx_address.clone();
        smc.expect_call()
            .withf(|args| {
                args.arg0 == FFA_RXTX_MAP_AARCH64
                    && args.arg1 % FFA_PAGE_SIZE as u64 == 0
                    && args.arg2 % FFA_PAGE_SIZE as u64 == 0
                    && args.arg3 == 1
            })
            .times(1)
            .in_sequence(seq)
            .returning(move |args| {
                *rx.lock().unwrap() = args.arg2;
                success(0)
            });
        rx_address
    }

    #[test]
    fn test_discover_reads_descriptor_and_releases_rx() {
        let mut smc = MockSmcCall::new();
        let mut seq = Sequence::new();
        let rx_address = expect_discovery_until_query(&mut smc, &mut seq);

        let rx = rx_address.clone();
        smc.expect_call()
            .withf(|args| {
                args.arg0 == FFA_PARTITION_INFO_GET
                    && args.arg1 == 0x378daedc
                    && args.arg2 == 0xf06b_4446
                    && args.arg3 == 0x8314_40ab
                    && args.arg4 == 0x933c_87a3
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                let address = *rx.lock().unwrap() as usize;
                // SAFETY: The address is the RX page registered by the directory under test.
                unsafe {
                    core::ptr::copy_nonoverlapping(REMOTE.as_bytes().as_ptr(), address as *mut u8, PartitionInfo::SIZE)
                };
                success(1)
            });
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RX_RELEASE && args.arg1 == LOCAL_ID as u64)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RXTX_UNMAP && args.arg1 == (LOCAL_ID as u64) << 16)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));

        let mut directory = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID).unwrap();
        assert_eq!(directory.local_id(), LOCAL_ID);
        assert_eq!(directory.remote(), REMOTE);
        assert!(directory.is_mapped());

        directory.unmap(&smc);
        assert!(!directory.is_mapped());
        // The pair is only unregistered once.
        directory.unmap(&smc);
    }

    #[test]
    fn test_id_get_failure_is_unsupported_without_mapping() {
        let mut smc = MockSmcCall::new();
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_ID_GET)
            .times(1)
            .returning(|_| error(FfaStatus::NotSupported));

        let result = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_map_failure_is_unsupported_without_unmap() {
        let mut smc = MockSmcCall::new();
        smc.expect_call().withf(|args| args.arg0 == FFA_ID_GET).times(1).returning(|_| success(LOCAL_ID as u64));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RXTX_MAP_AARCH64)
            .times(1)
            .returning(|_| error(FfaStatus::NoMemory));
        smc.expect_call().withf(|args| args.arg0 == FFA_RXTX_UNMAP).never();

        let result = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_query_failure_unmaps_before_reporting() {
        let mut smc = MockSmcCall::new();
        let mut seq = Sequence::new();
        let _rx = expect_discovery_until_query(&mut smc, &mut seq);
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_PARTITION_INFO_GET)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| error(FfaStatus::InvalidParameters));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RXTX_UNMAP && args.arg1 == (LOCAL_ID as u64) << 16)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));

        let result = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_empty_query_result_is_unsupported() {
        let mut smc = MockSmcCall::new();
        let mut seq = Sequence::new();
        let _rx = expect_discovery_until_query(&mut smc, &mut seq);
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_PARTITION_INFO_GET)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));
        smc.expect_call().withf(|args| args.arg0 == FFA_RX_RELEASE).never();
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RXTX_UNMAP)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));

        let result = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }

    #[test]
    fn test_release_failure_unmaps_before_reporting() {
        let mut smc = MockSmcCall::new();
        let mut seq = Sequence::new();
        let _rx = expect_discovery_until_query(&mut smc, &mut seq);
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_PARTITION_INFO_GET)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(1));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RX_RELEASE)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| error(FfaStatus::Denied));
        smc.expect_call()
            .withf(|args| args.arg0 == FFA_RXTX_UNMAP)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| success(0));

        let result = PartitionDirectory::discover(&smc, &EFI_MM_COMMUNICATION2_PROTOCOL_GUID);
        assert_eq!(result.err(), Some(EfiError::Unsupported));
    }
}
