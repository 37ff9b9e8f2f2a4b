//! Simulated Secure Partition Manager
//!
//! Stands in for EL3 and the secure partition manager behind a normal world [`SmcCall`], so normal world code can
//! be tested against a real secure partition within one process. Every call is served against real memory:
//! discovery writes the partition descriptor into the registered RX page, and MM requests are forwarded to a
//! [`DelegatedEventLoop`] reading the same shared buffer the normal world filled in.
//!
//! Only available with the `mockall` feature.
//!
//! ## Examples and Usage
//!
//! ```rust,ignore
//! use patina_ffa::version::Version;
//! use patina_stmm::{event_loop::PartitionAbi, mmi::MmiDispatcher, simulation::*};
//!
//! init_test_logger();
//! let (region, comm_buffer) = SharedRegion::allocate(0x1000);
//! let partition = secure_partition(MmiDispatcher::new(), &region, PartitionAbi::Spm)?;
//! let spmc = SimulatedSpmc::new(Version::new(1, 1), Version::new(1, 0), partition);
//! // Hand `spmc` and `comm_buffer` to the normal world communicator.
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{cell::RefCell, pin::Pin};
use std::{rc::Rc, sync::Once};

use patina_ffa::{
    abi::{
        endpoint_pair, FfaStatus, ARM_SMC_ID_MM_COMMUNICATE_AARCH64, ARM_SMC_ID_MM_VERSION_AARCH32, FFA_ERROR,
        FFA_ID_GET, FFA_INTERRUPT, FFA_MSG_SEND_DIRECT_REQ_AARCH64, FFA_MSG_SEND_DIRECT_RESP_AARCH64,
        FFA_PARTITION_INFO_GET, FFA_RUN, FFA_RXTX_MAP_AARCH64, FFA_RXTX_UNMAP, FFA_RX_RELEASE, FFA_SUCCESS_AARCH32,
        FFA_VERSION,
    },
    comm_buffer::CommBuffer,
    error::Result,
    partition::{smccc_uuid_words, PartitionInfo},
    smc::{SmcArgs, SmcCall},
    version::{Version, VERSION_NOT_SUPPORTED},
};
use r_efi::efi;
use zerocopy::IntoBytes;

use crate::{
    event_loop::{DelegatedEventLoop, PartitionAbi},
    mmi::MmiDispatcher,
};

/// Normal world endpoint ID handed out by `FFA_ID_GET`.
pub const NORMAL_WORLD_ID: u16 = 0x0001;

/// Descriptor of the simulated MM partition.
pub const MM_PARTITION: PartitionInfo =
    PartitionInfo { partition_id: 0x8003, execution_context_count: 8, properties: 0x3 };

/// The service GUID the MM partition answers partition queries for.
pub const MM_SERVICE_GUID: efi::Guid =
    efi::Guid::from_fields(0x378daedc, 0xf06b, 0x4446, 0x83, 0x14, &[0x40, 0xab, 0x93, 0x3c, 0x87, 0xa3]);

/// The secure world's handling of one event, returning its completion.
pub type SecurePartition = Rc<dyn Fn(&SmcArgs) -> SmcArgs>;

static LOGGER_INIT: Once = Once::new();

/// Installs `env_logger` once per test process. Silent unless `RUST_LOG` is set.
pub fn init_test_logger() {
    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        if std::env::var("RUST_LOG").is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }
        builder.is_test(true).init();
    });
}

/// Observable state of the partition manager.
#[derive(Debug, Default)]
pub struct SpmcState {
    /// Function IDs in the order they were called.
    pub calls: Vec<u64>,
    /// The registered `(tx, rx)` pair.
    pub rxtx: Option<(u64, u64)>,
    /// Whether the RX page is owned by the normal world.
    pub rx_held: bool,
    /// `FFA_INTERRUPT` replies issued before each direct response.
    pub interrupts_per_request: usize,
    interrupts_remaining: usize,
    pending_response: Option<SmcArgs>,
}

/// Shared memory reachable from both worlds.
pub struct SharedRegion {
    pub base: u64,
    pub len: usize,
}

impl SharedRegion {
    /// Allocates a region of `len` bytes and returns it with the normal world's view of it.
    ///
    /// The memory is leaked so both views stay valid for the rest of the process.
    pub fn allocate(len: usize) -> (Self, CommBuffer) {
        let memory: &'static mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());
        // SAFETY: The leaked allocation lives for the rest of the process.
        let normal_world = unsafe { CommBuffer::new(Pin::new(memory)) };
        (Self { base: normal_world.physical_base(), len }, normal_world)
    }

    /// Returns the secure world's view of the region.
    pub fn secure_view(&self) -> Result<CommBuffer> {
        // SAFETY: The region was leaked by `allocate` and stays valid.
        unsafe { CommBuffer::from_raw_parts(self.base, self.len) }
    }
}

/// The secure side never issues calls of its own while serving an event.
struct UnusedSvc;

impl SmcCall for UnusedSvc {
    fn call(&self, args: SmcArgs) -> SmcArgs {
        log::error!(target: "stmm", "Secure partition issued {:?} while serving an event.", args);
        let mut ret = SmcArgs::new(FFA_ERROR);
        ret.arg2 = FfaStatus::NotSupported as i32 as i64 as u64;
        ret
    }
}

static UNUSED_SVC: UnusedSvc = UnusedSvc;

/// Builds a secure partition serving `dispatcher` over `region`.
pub fn secure_partition(
    dispatcher: MmiDispatcher,
    region: &SharedRegion,
    abi: PartitionAbi,
) -> Result<SecurePartition> {
    let dispatcher: &'static MmiDispatcher = Box::leak(Box::new(dispatcher));
    let event_loop = DelegatedEventLoop::new(&UNUSED_SVC, dispatcher, region.secure_view()?, abi);
    Ok(Rc::new(move |event: &SmcArgs| event_loop.handle_event(event)))
}

/// A partition manager answering the version calls with fixed words.
#[derive(Clone)]
pub struct SimulatedSpmc {
    ffa_version: u32,
    mm_version: u32,
    partition_count: u64,
    state: Rc<RefCell<SpmcState>>,
    partition: SecurePartition,
}

impl SimulatedSpmc {
    /// Creates a partition manager reporting `ffa_version` and `mm_version`, with one MM partition.
    pub fn new(ffa_version: Version, mm_version: Version, partition: SecurePartition) -> Self {
        Self {
            ffa_version: ffa_version.pack(),
            mm_version: mm_version.pack(),
            partition_count: 1,
            state: Rc::new(RefCell::new(SpmcState::default())),
            partition,
        }
    }

    /// Answers `FFA_VERSION` with the "not supported" word.
    pub fn without_ffa(mut self) -> Self {
        self.ffa_version = VERSION_NOT_SUPPORTED;
        self
    }

    /// Reports `count` partitions for the MM service.
    pub fn with_partition_count(mut self, count: u64) -> Self {
        self.partition_count = count;
        self
    }

    /// Preempts the partition `count` times before each direct response.
    pub fn with_interrupts(self, count: usize) -> Self {
        self.state.borrow_mut().interrupts_per_request = count;
        self
    }

    /// Returns the shared state for inspection after the SPMC was handed to the communicator.
    pub fn state(&self) -> Rc<RefCell<SpmcState>> {
        self.state.clone()
    }

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

    fn partition_info_get(&self, state: &mut SpmcState, args: &SmcArgs) -> SmcArgs {
        let Some((_, rx)) = state.rxtx else {
            return Self::error(FfaStatus::Denied);
        };
        if state.rx_held {
            return Self::error(FfaStatus::Busy);
        }

        let words = smccc_uuid_words(&MM_SERVICE_GUID);
        let requested = [args.arg1 as u32, args.arg2 as u32, args.arg3 as u32, args.arg4 as u32];
        if requested != words {
            return Self::error(FfaStatus::InvalidParameters);
        }

        let partition = MM_PARTITION;
        let descriptor = partition.as_bytes();
        // SAFETY: The normal world registered this page as its RX buffer.
        unsafe { core::ptr::copy_nonoverlapping(descriptor.as_ptr(), rx as *mut u8, descriptor.len()) };
        state.rx_held = true;
        Self::success(self.partition_count)
    }

    fn direct_request(&self, state: &mut SpmcState, args: &SmcArgs) -> SmcArgs {
        if args.arg1 != endpoint_pair(NORMAL_WORLD_ID, MM_PARTITION.partition_id) {
            return Self::error(FfaStatus::InvalidParameters);
        }

        let mut event = SmcArgs::new(FFA_MSG_SEND_DIRECT_REQ_AARCH64);
        event.arg1 = args.arg1;
        event.arg3 = args.arg3;
        let completion = (self.partition)(&event);

        let mut response = SmcArgs::new(FFA_MSG_SEND_DIRECT_RESP_AARCH64);
        response.arg1 = endpoint_pair(MM_PARTITION.partition_id, NORMAL_WORLD_ID);
        response.arg3 = completion.arg3;
        response.arg4 = completion.arg4;

        if state.interrupts_per_request == 0 {
            return response;
        }
        state.interrupts_remaining = state.interrupts_per_request - 1;
        state.pending_response = Some(response);
        SmcArgs::new(FFA_INTERRUPT)
    }

    fn run(&self, state: &mut SpmcState, args: &SmcArgs) -> SmcArgs {
        if args.arg1 != endpoint_pair(MM_PARTITION.partition_id, 0) {
            return Self::error(FfaStatus::InvalidParameters);
        }
        if state.interrupts_remaining > 0 {
            state.interrupts_remaining -= 1;
            return SmcArgs::new(FFA_INTERRUPT);
        }
        state.pending_response.take().unwrap_or_else(|| Self::error(FfaStatus::Denied))
    }

    fn mm_communicate(&self, args: &SmcArgs) -> SmcArgs {
        let mut event = SmcArgs::new(ARM_SMC_ID_MM_COMMUNICATE_AARCH64);
        event.arg1 = args.arg2;
        let completion = (self.partition)(&event);
        SmcArgs::new(completion.arg1)
    }
}

impl SmcCall for SimulatedSpmc {
    fn call(&self, args: SmcArgs) -> SmcArgs {
        let mut state = self.state.borrow_mut();
        state.calls.push(args.arg0);

        match args.arg0 {
            FFA_VERSION => SmcArgs::new(self.ffa_version as u64),
            ARM_SMC_ID_MM_VERSION_AARCH32 => SmcArgs::new(self.mm_version as u64),
            FFA_ID_GET => Self::success(NORMAL_WORLD_ID as u64),
            FFA_RXTX_MAP_AARCH64 => {
                if state.rxtx.is_some() {
                    return Self::error(FfaStatus::Denied);
                }
                state.rxtx = Some((args.arg1, args.arg2));
                Self::success(0)
            }
            FFA_PARTITION_INFO_GET => self.partition_info_get(&mut state, &args),
            FFA_RX_RELEASE => {
                state.rx_held = false;
                Self::success(0)
            }
            FFA_RXTX_UNMAP => {
                if args.arg1 != (NORMAL_WORLD_ID as u64) << 16 || state.rxtx.take().is_none() {
                    return Self::error(FfaStatus::InvalidParameters);
                }
                Self::success(0)
            }
            FFA_MSG_SEND_DIRECT_REQ_AARCH64 => self.direct_request(&mut state, &args),
            FFA_RUN => self.run(&mut state, &args),
            ARM_SMC_ID_MM_COMMUNICATE_AARCH64 => self.mm_communicate(&args),
            _ => Self::error(FfaStatus::NotSupported),
        }
    }
}
