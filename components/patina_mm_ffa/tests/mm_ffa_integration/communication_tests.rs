//! Round trip tests between the normal world communicator and the secure world event loop
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

use crate::mm_ffa_integration::common::{
    handlers::{message, RecordingHandler, ReverseHandler, REVERSE_HANDLER_GUID, UNKNOWN_GUID},
    MmTestWorld, SHARED_BUFFER_SIZE,
};

use patina_ffa::{
    abi::{ARM_SMC_ID_MM_COMMUNICATE_AARCH64, FFA_MSG_SEND_DIRECT_REQ_AARCH64, FFA_RUN},
    communicate::MmCommunicateHeader,
    error::EfiError,
    version::Version,
};
use patina_mm_ffa::{
    communicator::{ActiveConvention, MmCommunication},
    config::CallingConvention,
};
use patina_stmm::{event_loop::PartitionAbi, mmi::MmiDispatcher, simulation::SimulatedSpmc};

const FFA_PARTITION: PartitionAbi = PartitionAbi::Ffa { use_only_ffa: true };

fn reverse_dispatcher() -> MmiDispatcher {
    let mut dispatcher = MmiDispatcher::new();
    dispatcher.register(REVERSE_HANDLER_GUID, Box::new(ReverseHandler)).expect("first registration");
    dispatcher
}

fn ffa_world(dispatcher: MmiDispatcher) -> MmTestWorld {
    MmTestWorld::new(CallingConvention::PartitionAddressed, Version::new(1, 1), FFA_PARTITION, dispatcher)
        .expect("FF-A world comes up")
}

fn legacy_world(dispatcher: MmiDispatcher) -> MmTestWorld {
    MmTestWorld::new(CallingConvention::Legacy, Version::new(1, 1), PartitionAbi::Spm, dispatcher)
        .expect("legacy world comes up")
}

#[test]
fn test_ffa_round_trip_returns_handler_reply() {
    let world = ffa_world(reverse_dispatcher());
    assert!(matches!(world.communicator.convention(), ActiveConvention::PartitionAddressed { local_id: 0x0001, .. }));

    let mut request = message(&REVERSE_HANDLER_GUID, b"Hello MM");
    world.communicator.communicate(&mut request, None).expect("round trip succeeds");

    let header = MmCommunicateHeader::read(&request).unwrap();
    assert_eq!(header.guid(), REVERSE_HANDLER_GUID);
    assert_eq!(header.message_length(), 8);
    assert_eq!(&request[MmCommunicateHeader::SIZE..], b"MM olleH");
    assert_eq!(world.calls().iter().filter(|call| **call == FFA_MSG_SEND_DIRECT_REQ_AARCH64).count(), 1);
}

#[test]
fn test_legacy_round_trip_returns_handler_reply() {
    let world = legacy_world(reverse_dispatcher());
    assert_eq!(world.communicator.convention(), ActiveConvention::Legacy);

    let mut request = message(&REVERSE_HANDLER_GUID, &[1, 2, 3, 4]);
    let mut comm_size = request.len();
    world.communicator.communicate(&mut request, Some(&mut comm_size)).expect("round trip succeeds");

    assert_eq!(&request[MmCommunicateHeader::SIZE..], &[4, 3, 2, 1]);
    assert_eq!(world.calls().last(), Some(&ARM_SMC_ID_MM_COMMUNICATE_AARCH64));
}

#[test]
fn test_consecutive_requests_reuse_shared_buffer() {
    let recorder = RecordingHandler::default();
    let mut dispatcher = MmiDispatcher::new();
    dispatcher.register(REVERSE_HANDLER_GUID, Box::new(recorder.clone())).unwrap();
    let world = ffa_world(dispatcher);

    for payload in [&b"first message"[..], &b"second"[..]] {
        let mut request = message(&REVERSE_HANDLER_GUID, payload);
        world.communicator.communicate(&mut request, None).unwrap();
    }

    assert_eq!(*recorder.received.borrow(), vec![b"first message".to_vec(), b"second".to_vec()]);
}

#[test]
fn test_preempted_partition_is_resumed_until_response() {
    let world = MmTestWorld::with_spmc(
        CallingConvention::PartitionAddressed,
        FFA_PARTITION,
        reverse_dispatcher(),
        |partition| SimulatedSpmc::new(Version::new(1, 1), Version::new(1, 0), partition).with_interrupts(3),
    )
    .expect("FF-A world comes up");

    let mut request = message(&REVERSE_HANDLER_GUID, b"abc");
    world.communicator.communicate(&mut request, None).expect("round trip survives interrupts");
    assert_eq!(&request[MmCommunicateHeader::SIZE..], b"cba");

    let calls = world.calls();
    let request_index = calls.iter().position(|call| *call == FFA_MSG_SEND_DIRECT_REQ_AARCH64).unwrap();
    assert_eq!(&calls[request_index + 1..], &[FFA_RUN, FFA_RUN, FFA_RUN]);
}

#[test]
fn test_unknown_recipient_over_legacy_is_unsupported() {
    let world = legacy_world(reverse_dispatcher());
    let mut request = message(&UNKNOWN_GUID, &[0xAA; 4]);
    assert_eq!(world.communicator.communicate(&mut request, None), Err(EfiError::Unsupported));
}

#[test]
fn test_unknown_recipient_over_ffa_completes_with_echo() {
    // Direct responses carry the MM status in a register the normal world does not inspect.
    let world = ffa_world(reverse_dispatcher());
    let mut request = message(&UNKNOWN_GUID, &[0xAA, 0xBB]);
    assert_eq!(world.communicator.communicate(&mut request, None), Ok(()));
    assert_eq!(&request[MmCommunicateHeader::SIZE..], &[0xAA, 0xBB]);
}

#[test]
fn test_oversized_message_reports_largest_fitting_length() {
    let world = ffa_world(reverse_dispatcher());
    let data = vec![0x5A; SHARED_BUFFER_SIZE];
    let mut request = message(&REVERSE_HANDLER_GUID, &data);

    assert_eq!(world.communicator.communicate(&mut request, None), Err(EfiError::BufferTooSmall));
    let header = MmCommunicateHeader::read(&request).unwrap();
    assert_eq!(header.message_length() as usize, SHARED_BUFFER_SIZE - MmCommunicateHeader::SIZE);
    assert!(!world.calls().contains(&FFA_MSG_SEND_DIRECT_REQ_AARCH64));
}

#[test]
fn test_zero_comm_size_reports_shared_buffer_length() {
    let world = legacy_world(reverse_dispatcher());
    let mut request = message(&REVERSE_HANDLER_GUID, &[1]);
    let mut comm_size = 0;

    assert_eq!(world.communicator.communicate(&mut request, Some(&mut comm_size)), Err(EfiError::BufferTooSmall));
    assert_eq!(comm_size, SHARED_BUFFER_SIZE);
}
