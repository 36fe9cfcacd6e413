// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the emulator core.
//!
//! Most variants here are recoverable: the emulator logs them and keeps
//! running, matching real hardware's tolerance of software bugs. Only
//! [`EmulatorError::RomLoad`] and [`EmulatorError::BackupIo`] are meant to
//! propagate out of a `load` call and abort a boot attempt.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Every error kind the core recognizes (§7 of the design spec).
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    /// A misaligned load/store. The access is truncated to the containing
    /// aligned unit; this is logged but never fatal.
    #[error("unaligned {bus_kind} access at {address:#010x} (size {size})")]
    UnalignedAccess {
        address: u32,
        size: u8,
        bus_kind: &'static str,
    },

    /// A read or write landed on an address with no registered handler.
    /// Reads yield 0, writes are dropped.
    #[error("unmapped IO {op} at {address:#010x}")]
    UnmappedIo { address: u32, op: &'static str },

    /// The decoded opcode has no handler. Raises the Undefined exception at
    /// vector 0x04, the same path as a software breakpoint.
    #[error("unimplemented instruction {opcode:#010x} at pc={pc:#010x}")]
    UnimplementedInstruction { opcode: u32, pc: u32 },

    /// A matrix stack PUSH ran past its configured depth.
    #[error("matrix stack overflow on {stack}")]
    MatrixStackOverflow { stack: &'static str },

    /// A matrix stack POP/RESTORE ran past its configured depth.
    #[error("matrix stack underflow on {stack}")]
    MatrixStackUnderflow { stack: &'static str },

    /// DIV_DENOM was zero. `result`/`remainder` are the sentinel values
    /// actually written to DIV_RESULT/DIV_REMAIN.
    #[error("division by zero (mode {mode}): result={result:#018x} remainder={remainder:#018x}")]
    DivideByZero {
        mode: u8,
        result: u64,
        remainder: u64,
    },

    /// IPCFIFOSEND wrote to a full send FIFO. The sticky error bit is set
    /// and the existing entries are preserved (nothing is dropped further).
    #[error("IPC FIFO overflow on {side} side")]
    IpcFifoOverflow { side: &'static str },

    /// IPCFIFORECV read from an empty receive FIFO.
    #[error("IPC FIFO underflow on {side} side")]
    IpcFifoUnderflow { side: &'static str },

    /// Backup-media IO failed while loading a save. Unlike the other
    /// variants, this one is fatal to a boot attempt.
    #[error("backup storage IO failed: {reason}")]
    BackupIo { reason: String },

    /// A ROM failed to load outright (bad header, truncated file, missing
    /// path). Surfaces with the ROM path and reason, never halts an
    /// already-running emulation.
    #[error("failed to load ROM {path}: {reason}")]
    RomLoad { path: PathBuf, reason: String },

    /// Wraps an underlying filesystem error for convenient `?` use in
    /// loader code.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tally of recoverable errors observed since the last reset, grouped by
/// kind. [`System::error_counts`](crate::core::system::System::error_counts)
/// exposes this for §7's "counted and summarized in the log" requirement.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounters {
    pub unaligned_access: u64,
    pub unmapped_io: u64,
    pub unimplemented_instruction: u64,
    pub matrix_stack_overflow: u64,
    pub matrix_stack_underflow: u64,
    pub divide_by_zero: u64,
    pub ipc_fifo_overflow: u64,
    pub ipc_fifo_underflow: u64,
}

impl ErrorCounters {
    pub fn record(&mut self, err: &EmulatorError) {
        match err {
            EmulatorError::UnalignedAccess { .. } => self.unaligned_access += 1,
            EmulatorError::UnmappedIo { .. } => self.unmapped_io += 1,
            EmulatorError::UnimplementedInstruction { .. } => {
                self.unimplemented_instruction += 1
            }
            EmulatorError::MatrixStackOverflow { .. } => self.matrix_stack_overflow += 1,
            EmulatorError::MatrixStackUnderflow { .. } => self.matrix_stack_underflow += 1,
            EmulatorError::DivideByZero { .. } => self.divide_by_zero += 1,
            EmulatorError::IpcFifoOverflow { .. } => self.ipc_fifo_overflow += 1,
            EmulatorError::IpcFifoUnderflow { .. } => self.ipc_fifo_underflow += 1,
            EmulatorError::BackupIo { .. } | EmulatorError::RomLoad { .. } | EmulatorError::Io(_) => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.unaligned_access
            + self.unmapped_io
            + self.unimplemented_instruction
            + self.matrix_stack_overflow
            + self.matrix_stack_underflow
            + self.divide_by_zero
            + self.ipc_fifo_overflow
            + self.ipc_fifo_underflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_tally_by_kind() {
        let mut counters = ErrorCounters::default();
        counters.record(&EmulatorError::UnmappedIo {
            address: 0x0400_1000,
            op: "read",
        });
        counters.record(&EmulatorError::UnmappedIo {
            address: 0x0400_1004,
            op: "write",
        });
        counters.record(&EmulatorError::DivideByZero {
            mode: 0,
            result: 0xFFFF_FFFF,
            remainder: 7,
        });
        assert_eq!(counters.unmapped_io, 2);
        assert_eq!(counters.divide_by_zero, 1);
        assert_eq!(counters.total(), 3);
    }
}
