//! HEST Error Source Aggregator
//!
//! An MMI handler that collects the error source descriptors of every MM driver providing them into one reply.
//! The total size is unknown until all providers have been asked, so each request runs in two passes:
//!
//! 1. **Probe**: Every provider is asked for its descriptor count and length without a destination buffer.
//! 2. **Fill**: If the caller's buffer can hold the totals, every provider appends its descriptors after the info
//!    header, each starting where the previous one stopped.
//!
//! A caller whose buffer is too small receives the info header alone and can retry with a buffer of the right size.
//!
//! ## Logging
//!
//! The `hest` log target is used for provider failures and reply sizes.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{boxed::Box, rc::Rc, vec::Vec};

use patina_ffa::error::{EfiError, Result};
use patina_stmm::mmi::MmiHandler;

use crate::descriptor_info::ErrorSourceDescInfo;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Descriptor count and length reported by a provider.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ErrorSourceSummary {
    /// Length of the descriptors in bytes.
    pub length: usize,
    /// Number of descriptors.
    pub count: usize,
}

/// An MM driver publishing HEST error source descriptors.
pub trait ErrorSourceProvider {
    /// Reports or writes the provider's error source descriptors.
    ///
    /// - With no `buffer`, fills `summary` with the count and length of all of the provider's descriptors and
    ///   returns `Err(EfiError::BufferTooSmall)`.
    /// - With a `buffer`, writes the descriptors to its start, fills `summary` with what was written and returns
    ///   `Ok(())`.
    fn get_error_source_descriptors(&self, buffer: Option<&mut [u8]>, summary: &mut ErrorSourceSummary) -> Result<()>;
}

/// Looks up the providers currently published.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ErrorSourceProviderLocator {
    /// Returns every published provider, in no particular order.
    fn locate(&self) -> Result<Vec<Rc<dyn ErrorSourceProvider>>>;
}

/// The set of providers registered by MM drivers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Rc<dyn ErrorSourceProvider>>,
}

impl ProviderRegistry {
    /// Creates a registry with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `provider`.
    pub fn register(&mut self, provider: Rc<dyn ErrorSourceProvider>) {
        self.providers.push(provider);
    }
}

impl ErrorSourceProviderLocator for ProviderRegistry {
    fn locate(&self) -> Result<Vec<Rc<dyn ErrorSourceProvider>>> {
        if self.providers.is_empty() {
            return Err(EfiError::NotFound);
        }
        Ok(self.providers.clone())
    }
}

/// HEST Error Source Aggregator
///
/// Registered as the MMI handler for
/// [`MM_HEST_GET_ERROR_SOURCE_INFO_GUID`](crate::descriptor_info::MM_HEST_GET_ERROR_SOURCE_INFO_GUID).
pub struct HestErrorSourceAggregator {
    locator: Box<dyn ErrorSourceProviderLocator>,
}

impl HestErrorSourceAggregator {
    /// Creates an aggregator that asks `locator` for the published providers on every request.
    pub fn new(locator: Box<dyn ErrorSourceProviderLocator>) -> Self {
        Self { locator }
    }

    /// Sums what each provider reports in probe mode. Providers that do not answer `BufferTooSmall` are skipped.
    fn probe(providers: &[Rc<dyn ErrorSourceProvider>]) -> ErrorSourceSummary {
        providers.iter().enumerate().fold(ErrorSourceSummary::default(), |total, (index, provider)| {
            let mut summary = ErrorSourceSummary::default();
            match provider.get_error_source_descriptors(None, &mut summary) {
                Err(EfiError::BufferTooSmall) => {}
                result => {
                    log::warn!(target: "hest", "Provider {} probe returned {:?}, skipping.", index, result);
                    return total;
                }
            }

            match (total.length.checked_add(summary.length), total.count.checked_add(summary.count)) {
                (Some(length), Some(count)) => {
                    log::trace!(
                        target: "hest",
                        "Provider {}: {} descriptors, {:#X} bytes.",
                        index,
                        summary.count,
                        summary.length
                    );
                    ErrorSourceSummary { length, count }
                }
                _ => {
                    log::warn!(target: "hest", "Provider {} reports an unrepresentable size, skipping.", index);
                    total
                }
            }
        })
    }
}

impl MmiHandler for HestErrorSourceAggregator {
    fn handle(&self, comm_buffer: &mut [u8]) -> Result<()> {
        if comm_buffer.len() < ErrorSourceDescInfo::SIZE {
            log::error!(target: "hest", "Buffer of {:#X} bytes cannot hold the info header.", comm_buffer.len());
            return Err(EfiError::InvalidParameter);
        }

        let providers = self.locator.locate().map_err(|err| {
            log::error!(target: "hest", "No error source providers found: {:?}", err);
            EfiError::NotFound
        })?;

        let total = Self::probe(&providers);
        if total.count == 0 || total.length == 0 {
            log::info!(target: "hest", "No error source descriptors published.");
            return Err(EfiError::NotFound);
        }

        ErrorSourceDescInfo::new(total.count, total.length).write(comm_buffer)?;

        let required = ErrorSourceDescInfo::SIZE.checked_add(total.length).ok_or(EfiError::BufferTooSmall)?;
        if required > comm_buffer.len() {
            log::info!(
                target: "hest",
                "Reply needs {:#X} bytes, buffer holds {:#X}.",
                required,
                comm_buffer.len()
            );
            return Err(EfiError::BufferTooSmall);
        }

        let mut writer = DescriptorWriter::new(&mut comm_buffer[ErrorSourceDescInfo::SIZE..required]);
        providers.iter().enumerate().for_each(|(index, provider)| writer.append(index, provider.as_ref()));

        let written = writer.summary();
        if written != total {
            log::error!(
                target: "hest",
                "Providers wrote {} descriptors in {:#X} bytes, probed {} in {:#X}.",
                written.count,
                written.length,
                total.count,
                total.length
            );
            ErrorSourceDescInfo::new(written.count, written.length).write(comm_buffer)?;
        }

        log::debug!(
            target: "hest",
            "Collected {} error source descriptors, {:#X} bytes.",
            written.count,
            written.length
        );
        Ok(())
    }
}

/// Appends provider descriptors to a fixed payload area behind a single cursor.
struct DescriptorWriter<'a> {
    payload: &'a mut [u8],
    cursor: usize,
    count: usize,
}

impl<'a> DescriptorWriter<'a> {
    fn new(payload: &'a mut [u8]) -> Self {
        Self { payload, cursor: 0, count: 0 }
    }

    /// Lets `provider` write at the cursor. Failed providers, and providers claiming more than the remaining
    /// capacity, leave the cursor untouched.
    fn append(&mut self, index: usize, provider: &dyn ErrorSourceProvider) {
        let remaining = &mut self.payload[self.cursor..];
        let capacity = remaining.len();
        let mut summary = ErrorSourceSummary::default();

        match provider.get_error_source_descriptors(Some(remaining), &mut summary) {
            Ok(()) if summary.length <= capacity => {
                self.cursor += summary.length;
                self.count = self.count.saturating_add(summary.count);
            }
            Ok(()) => {
                log::warn!(
                    target: "hest",
                    "Provider {} claims {:#X} bytes with {:#X} remaining, skipping.",
                    index,
                    summary.length,
                    capacity
                );
            }
            Err(err) => {
                log::warn!(target: "hest", "Provider {} fill failed: {:?}, skipping.", index, err);
            }
        }
    }

    fn summary(&self) -> ErrorSourceSummary {
        ErrorSourceSummary { length: self.cursor, count: self.count }
    }
}
