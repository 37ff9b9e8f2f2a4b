//! FF-A Console Logger
//!
//! A [`log::Log`] implementation for secure partitions that have no device of their own to write to. Formatted
//! records are buffered and handed to the partition manager through `FFA_CONSOLE_LOG`, which carries up to
//! [`FFA_CONSOLE_LOG_MAX_BYTES`] characters per call packed little endian into registers 2 through 7.
//!
//! ## Examples and Usage
//!
//! ```rust,no_run
//! use patina_ffa::smc::{ArmSmc, Conduit};
//! use patina_stmm::console::FfaConsoleLogger;
//!
//! // SAFETY: Console calls pass no memory to the partition manager.
//! static LOGGER: FfaConsoleLogger<ArmSmc> = FfaConsoleLogger::new(
//!     &[("stmm", log::LevelFilter::Info)],
//!     log::LevelFilter::Warn,
//!     unsafe { ArmSmc::new(Conduit::Svc) },
//! );
//!
//! log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Trace)).unwrap();
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt::Write;

use patina_ffa::{
    abi::{FFA_CONSOLE_LOG_AARCH64, FFA_CONSOLE_LOG_MAX_BYTES, FFA_SUCCESS_AARCH32, FFA_SUCCESS_AARCH64},
    smc::{SmcArgs, SmcCall},
};

/// The logger writing through the partition manager's console.
pub struct FfaConsoleLogger<'a, C>
where
    C: SmcCall + Send + Sync,
{
    console: C,
    target_filters: &'a [(&'a str, log::LevelFilter)],
    max_level: log::LevelFilter,
}

impl<'a, C> FfaConsoleLogger<'a, C>
where
    C: SmcCall + Send + Sync,
{
    /// Creates a new FfaConsoleLogger.
    ///
    /// ## Arguments
    ///
    /// * `target_filters` - Per target maximum levels, matched by target prefix.
    /// * `max_level` - The maximum log level for targets without a filter.
    /// * `console` - The conduit to the partition manager.
    ///
    pub const fn new(
        target_filters: &'a [(&'a str, log::LevelFilter)],
        max_level: log::LevelFilter,
        console: C,
    ) -> Self {
        Self { console, target_filters, max_level }
    }

    /// Writes `data` to the console in as many calls as needed.
    ///
    /// Stops at the first rejected call and reports whether everything was accepted.
    fn console_write(&self, data: &[u8]) -> bool {
        data.chunks(FFA_CONSOLE_LOG_MAX_BYTES).all(|chunk| {
            let result = self.console.call(console_log_args(chunk));
            matches!(result.arg0, FFA_SUCCESS_AARCH32 | FFA_SUCCESS_AARCH64)
        })
    }
}

impl<C> log::Log for FfaConsoleLogger<'_, C>
where
    C: SmcCall + Send + Sync,
{
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level().to_level_filter()
            <= *self
                .target_filters
                .iter()
                .find(|(name, _)| metadata.target().starts_with(name))
                .map(|(_, level)| level)
                .unwrap_or(&self.max_level)
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut writer = BufferedWriter::new(self);
            // A rejected call drops the rest of the record.
            let _ = writeln!(writer, "{}: {}", record.level(), record.args()).and_then(|()| writer.flush());
        }
    }

    fn flush(&self) {
        // Every record is written out before `log` returns.
    }
}

/// Packs up to [`FFA_CONSOLE_LOG_MAX_BYTES`] characters into a console call.
fn console_log_args(chunk: &[u8]) -> SmcArgs {
    let mut regs = [0u64; FFA_CONSOLE_LOG_MAX_BYTES / 8];
    for (index, byte) in chunk.iter().take(FFA_CONSOLE_LOG_MAX_BYTES).enumerate() {
        regs[index / 8] |= (*byte as u64) << (8 * (index % 8));
    }

    SmcArgs {
        arg0: FFA_CONSOLE_LOG_AARCH64,
        arg1: chunk.len().min(FFA_CONSOLE_LOG_MAX_BYTES) as u64,
        arg2: regs[0],
        arg3: regs[1],
        arg4: regs[2],
        arg5: regs[3],
        arg6: regs[4],
        arg7: regs[5],
    }
}

/// Size of the buffer for the buffered writer. A whole number of console calls.
const WRITER_BUFFER_SIZE: usize = FFA_CONSOLE_LOG_MAX_BYTES * 3;

/// A wrapper for buffering and redirecting writes from the formatter.
struct BufferedWriter<'a, C>
where
    C: SmcCall + Send + Sync,
{
    writer: &'a FfaConsoleLogger<'a, C>,
    buffer: [u8; WRITER_BUFFER_SIZE],
    buffer_size: usize,
}

impl<'a, C> BufferedWriter<'a, C>
where
    C: SmcCall + Send + Sync,
{
    const fn new(writer: &'a FfaConsoleLogger<'a, C>) -> Self {
        Self { writer, buffer: [0; WRITER_BUFFER_SIZE], buffer_size: 0 }
    }

    /// Flushes the current buffer to the console. Fails if the partition manager rejects any of it.
    fn flush(&mut self) -> core::fmt::Result {
        if self.buffer_size == 0 {
            return Ok(());
        }

        let accepted = self.writer.console_write(&self.buffer[..self.buffer_size]);
        self.buffer_size = 0;
        if accepted {
            Ok(())
        } else {
            Err(core::fmt::Error)
        }
    }
}

impl<C> Write for BufferedWriter<'_, C>
where
    C: SmcCall + Send + Sync,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let data = s.as_bytes();
        let len = data.len();

        if len < WRITER_BUFFER_SIZE {
            if len > WRITER_BUFFER_SIZE - self.buffer_size {
                self.flush()?;
            }
            self.buffer[self.buffer_size..self.buffer_size + len].copy_from_slice(data);
            self.buffer_size += len;
        } else {
            self.flush()?;
            if !self.writer.console_write(data) {
                return Err(core::fmt::Error);
            }
        }

        Ok(())
    }
}
