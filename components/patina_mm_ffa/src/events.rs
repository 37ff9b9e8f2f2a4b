//! Event Group Forwarding
//!
//! MM handlers may register for the same lifecycle event groups as normal world drivers. When one of these groups is
//! signaled in the normal world, a one byte message addressed to the group's GUID is sent to the secure partition.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_ffa::{communicate::MmCommunicateHeader, error::Result};
use r_efi::efi;

use crate::communicator::MmCommunication;

/// Signaled when the platform has finished dispatching DXE drivers from the platform firmware volumes.
pub const END_OF_DXE_EVENT_GROUP_GUID: efi::Guid =
    efi::Guid::from_fields(0x02ce967a, 0xdd7e, 0x4ffc, 0x9e, 0xe7, &[0x81, 0x0c, 0xf0, 0x47, 0x08, 0x80]);

/// Signaled when the OS loader calls `ExitBootServices()`.
pub const EXIT_BOOT_SERVICES_EVENT_GROUP_GUID: efi::Guid =
    efi::Guid::from_fields(0x27abf055, 0xb1b8, 0x4c26, 0x80, 0x48, &[0x74, 0x8f, 0x37, 0xba, 0xa2, 0xdf]);

/// Signaled right before the boot manager hands control to a boot option.
pub const READY_TO_BOOT_EVENT_GROUP_GUID: efi::Guid =
    efi::Guid::from_fields(0x7ce88fb3, 0x4bd7, 0x4679, 0x87, 0xa8, &[0xa8, 0xd8, 0xde, 0xe5, 0x0d, 0x2b]);

/// The event groups forwarded to the secure partition.
pub const FORWARDED_EVENT_GROUPS: [efi::Guid; 3] =
    [END_OF_DXE_EVENT_GROUP_GUID, EXIT_BOOT_SERVICES_EVENT_GROUP_GUID, READY_TO_BOOT_EVENT_GROUP_GUID];

/// Notifies MM handlers that `group` was signaled.
pub fn signal_event_group(mm_comm: &dyn MmCommunication, group: &efi::Guid) -> Result<()> {
    let mut message = [0u8; MmCommunicateHeader::SIZE + 1];
    MmCommunicateHeader::new(group, 1).write(&mut message)?;
    let mut comm_size = message.len();

    log::debug!(target: "mm_comm", "Forwarding event group {:?} to MM.", group);
    mm_comm.communicate(&mut message, Some(&mut comm_size)).map_err(|err| {
        log::error!(target: "mm_comm", "Failed to forward event group {:?}: {:?}", group, err);
        err
    })
}
