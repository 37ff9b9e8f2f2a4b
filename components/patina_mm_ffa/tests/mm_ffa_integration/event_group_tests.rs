//! Event group forwarding tests
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use crate::mm_ffa_integration::common::{handlers::RecordingHandler, MmTestWorld};

use patina_ffa::{error::EfiError, version::Version};
use patina_mm_ffa::{
    config::CallingConvention,
    events::{signal_event_group, FORWARDED_EVENT_GROUPS, READY_TO_BOOT_EVENT_GROUP_GUID},
};
use patina_stmm::{event_loop::PartitionAbi, mmi::MmiDispatcher};

fn recording_world(convention: CallingConvention, abi: PartitionAbi) -> (MmTestWorld, Vec<RecordingHandler>) {
    let mut dispatcher = MmiDispatcher::new();
    let recorders: Vec<RecordingHandler> = FORWARDED_EVENT_GROUPS.iter().map(|_| RecordingHandler::default()).collect();
    for (group, recorder) in FORWARDED_EVENT_GROUPS.iter().zip(&recorders) {
        dispatcher.register(*group, Box::new(recorder.clone())).unwrap();
    }
    let world = MmTestWorld::new(convention, Version::new(1, 1), abi, dispatcher).unwrap();
    (world, recorders)
}

#[test]
fn test_each_group_reaches_its_mm_handler() {
    let (world, recorders) =
        recording_world(CallingConvention::PartitionAddressed, PartitionAbi::Ffa { use_only_ffa: true });

    for (index, group) in FORWARDED_EVENT_GROUPS.iter().enumerate() {
        signal_event_group(&world.communicator, group).unwrap();
        for (other, recorder) in recorders.iter().enumerate() {
            let expected = if other <= index { 1 } else { 0 };
            assert_eq!(recorder.received.borrow().len(), expected, "handler {} after signaling {}", other, index);
        }
    }

    for recorder in &recorders {
        assert_eq!(*recorder.received.borrow(), vec![vec![0u8]]);
    }
}

#[test]
fn test_group_signal_over_legacy() {
    let (world, recorders) = recording_world(CallingConvention::Legacy, PartitionAbi::Spm);

    signal_event_group(&world.communicator, &READY_TO_BOOT_EVENT_GROUP_GUID).unwrap();
    let ready_to_boot =
        FORWARDED_EVENT_GROUPS.iter().position(|group| *group == READY_TO_BOOT_EVENT_GROUP_GUID).unwrap();
    assert_eq!(recorders[ready_to_boot].received.borrow().len(), 1);
}

#[test]
fn test_unhandled_group_over_legacy_is_unsupported() {
    let dispatcher = MmiDispatcher::new();
    let world = MmTestWorld::new(CallingConvention::Legacy, Version::new(1, 1), PartitionAbi::Spm, dispatcher).unwrap();

    assert_eq!(signal_event_group(&world.communicator, &READY_TO_BOOT_EVENT_GROUP_GUID), Err(EfiError::Unsupported));
}
