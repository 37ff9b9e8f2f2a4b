//! Session bring-up tests against the simulated partition manager
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use crate::mm_ffa_integration::common::{
    handlers::{message, ReverseHandler, REVERSE_HANDLER_GUID},
    MmTestWorld, SHARED_BUFFER_SIZE,
};

use patina_ffa::{
    abi::{
        ARM_SMC_ID_MM_COMMUNICATE_AARCH64, ARM_SMC_ID_MM_VERSION_AARCH32, FFA_ID_GET, FFA_PARTITION_INFO_GET,
        FFA_RXTX_MAP_AARCH64, FFA_RXTX_UNMAP, FFA_RX_RELEASE, FFA_VERSION,
    },
    communicate::MmCommunicateHeader,
    error::EfiError,
    version::Version,
};
use patina_mm_ffa::{
    communicator::{ActiveConvention, MmCommunication, MmCommunicator},
    config::{CallingConvention, MmCommunicationConfiguration},
};
use patina_stmm::{
    event_loop::PartitionAbi,
    mmi::MmiDispatcher,
    simulation::{init_test_logger, secure_partition, SharedRegion, SimulatedSpmc, MM_PARTITION},
};

fn reverse_dispatcher() -> MmiDispatcher {
    let mut dispatcher = MmiDispatcher::new();
    dispatcher.register(REVERSE_HANDLER_GUID, Box::new(ReverseHandler)).expect("first registration");
    dispatcher
}

#[test]
fn test_ffa_discovery_sequence() {
    let world = MmTestWorld::new(
        CallingConvention::PartitionAddressed,
        Version::new(1, 1),
        PartitionAbi::Ffa { use_only_ffa: true },
        reverse_dispatcher(),
    )
    .unwrap();

    assert_eq!(
        world.calls(),
        vec![FFA_VERSION, FFA_ID_GET, FFA_RXTX_MAP_AARCH64, FFA_PARTITION_INFO_GET, FFA_RX_RELEASE]
    );
    assert_eq!(
        world.communicator.convention(),
        ActiveConvention::PartitionAddressed { local_id: 0x0001, remote: MM_PARTITION }
    );
    assert!(world.communicator.rxtx_mapped());
    assert!(!world.spmc.borrow().rx_held);
}

#[test]
fn test_ffa_v1_0_falls_back_to_legacy() {
    let world = MmTestWorld::new(
        CallingConvention::PartitionAddressed,
        Version::new(1, 0),
        PartitionAbi::Spm,
        reverse_dispatcher(),
    )
    .unwrap();

    assert_eq!(world.communicator.convention(), ActiveConvention::Legacy);
    assert_eq!(world.calls(), vec![FFA_VERSION]);
    assert!(!world.communicator.rxtx_mapped());

    let mut request = message(&REVERSE_HANDLER_GUID, &[9, 8, 7]);
    world.communicator.communicate(&mut request, None).unwrap();
    assert_eq!(&request[MmCommunicateHeader::SIZE..], &[7, 8, 9]);
    assert_eq!(world.calls().last(), Some(&ARM_SMC_ID_MM_COMMUNICATE_AARCH64));
}

#[test]
fn test_missing_ffa_is_unsupported() {
    let result = MmTestWorld::with_spmc(
        CallingConvention::PartitionAddressed,
        PartitionAbi::Spm,
        reverse_dispatcher(),
        |partition| SimulatedSpmc::new(Version::new(1, 1), Version::new(1, 0), partition).without_ffa(),
    );
    assert_eq!(result.err(), Some(EfiError::Unsupported));
}

#[test]
fn test_old_mm_version_is_unsupported() {
    init_test_logger();
    let (region, comm_buffer) = SharedRegion::allocate(SHARED_BUFFER_SIZE);
    let partition = secure_partition(reverse_dispatcher(), &region, PartitionAbi::Spm).unwrap();
    let spmc = SimulatedSpmc::new(Version::new(1, 1), Version::new(0, 9), partition);
    let state = spmc.state();

    let config = MmCommunicationConfiguration { convention: CallingConvention::Legacy, comm_buffer: Some(comm_buffer) };
    let err = MmCommunicator::new(config, Box::new(spmc)).err();
    assert_eq!(err, Some(EfiError::Unsupported));
    assert_eq!(state.borrow().calls, vec![ARM_SMC_ID_MM_VERSION_AARCH32]);
}

#[test]
fn test_failed_discovery_unmaps_rxtx_pair() {
    init_test_logger();
    let (region, comm_buffer) = SharedRegion::allocate(SHARED_BUFFER_SIZE);
    let partition = secure_partition(reverse_dispatcher(), &region, PartitionAbi::Ffa { use_only_ffa: true }).unwrap();
    let spmc = SimulatedSpmc::new(Version::new(1, 1), Version::new(1, 0), partition).with_partition_count(0);
    let state = spmc.state();

    let config = MmCommunicationConfiguration {
        convention: CallingConvention::PartitionAddressed,
        comm_buffer: Some(comm_buffer),
    };
    let err = MmCommunicator::new(config, Box::new(spmc)).err();

    assert_eq!(err, Some(EfiError::Unsupported));
    assert!(state.borrow().rxtx.is_none());
    assert_eq!(state.borrow().calls.last(), Some(&FFA_RXTX_UNMAP));
}

#[test]
fn test_missing_comm_buffer_is_invalid_parameter() {
    init_test_logger();
    let (region, _) = SharedRegion::allocate(SHARED_BUFFER_SIZE);
    let partition = secure_partition(reverse_dispatcher(), &region, PartitionAbi::Spm).unwrap();
    let spmc = SimulatedSpmc::new(Version::new(1, 1), Version::new(1, 0), partition);
    let state = spmc.state();

    let config = MmCommunicationConfiguration { convention: CallingConvention::Legacy, comm_buffer: None };
    assert_eq!(MmCommunicator::new(config, Box::new(spmc)).err(), Some(EfiError::InvalidParameter));
    assert!(state.borrow().calls.is_empty());
}

#[test]
fn test_exit_boot_services_unmaps_once() {
    let world = MmTestWorld::new(
        CallingConvention::PartitionAddressed,
        Version::new(1, 2),
        PartitionAbi::Ffa { use_only_ffa: true },
        reverse_dispatcher(),
    )
    .unwrap();

    world.communicator.on_exit_boot_services();
    world.communicator.on_exit_boot_services();

    assert!(!world.communicator.rxtx_mapped());
    assert!(world.spmc.borrow().rxtx.is_none());
    assert_eq!(world.calls().iter().filter(|call| **call == FFA_RXTX_UNMAP).count(), 1);

    let mut request = message(&REVERSE_HANDLER_GUID, b"after");
    world.communicator.communicate(&mut request, None).unwrap();
    assert_eq!(&request[MmCommunicateHeader::SIZE..], b"retfa");
}
