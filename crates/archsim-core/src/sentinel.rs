//! Call-stack sentinel: per-frame bookkeeping of stack accesses and
//! detection of writes that escape the innermost frame.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use thiserror::Error;

use crate::{FaultKind, IntRepr, RegisterFile, RegisterRef, Segment};

/// Write outside the innermost frame's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("write to 0x{address:x} outside the active frame [0x{start:x}, 0x{end:x})")]
pub struct StackViolation {
    /// Offending address.
    pub address: u64,
    /// Window start (inclusive).
    pub start: u64,
    /// Window end (exclusive).
    pub end: u64,
}

impl StackViolation {
    /// Always [`FaultKind::StackCorruption`].
    #[must_use]
    pub const fn fault_kind(self) -> FaultKind {
        FaultKind::StackCorruption
    }
}

/// One active call frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Address the call transferred control to.
    pub entry_address: u64,
    /// Stack pointer when the frame was entered.
    pub entry_sp: u64,
    /// Inclusive start of the writable window.
    pub window_start: u64,
    /// Exclusive end of the writable window.
    pub window_end: u64,
    written: BTreeSet<u64>,
    read: BTreeSet<u64>,
    modified: BTreeSet<RegisterRef>,
    saved: Vec<(RegisterRef, IntRepr)>,
}

impl CallFrame {
    /// Frame entered at `entry_address` with an empty window at `entry_sp`.
    #[must_use]
    pub const fn new(entry_address: u64, entry_sp: u64) -> Self {
        Self {
            entry_address,
            entry_sp,
            window_start: entry_sp,
            window_end: entry_sp,
            written: BTreeSet::new(),
            read: BTreeSet::new(),
            modified: BTreeSet::new(),
            saved: Vec::new(),
        }
    }

    /// Replaces the window with `[start, end)`.
    #[must_use]
    pub fn with_window(mut self, start: u64, end: u64) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    /// Records callee-saved register values to audit on return.
    #[must_use]
    pub fn with_saved(mut self, saved: Vec<(RegisterRef, IntRepr)>) -> Self {
        self.saved = saved;
        self
    }

    /// Returns `true` when `addr` lies inside the window.
    #[must_use]
    pub const fn in_window(&self, addr: u64) -> bool {
        addr >= self.window_start && addr < self.window_end
    }

    /// Stack addresses written while this frame was innermost.
    pub fn written(&self) -> impl Iterator<Item = u64> + '_ {
        self.written.iter().copied()
    }

    /// Stack addresses read while this frame was innermost.
    pub fn read(&self) -> impl Iterator<Item = u64> + '_ {
        self.read.iter().copied()
    }

    fn summary(&self, depth: usize) -> FrameSummary {
        FrameSummary {
            depth,
            entry_address: self.entry_address,
            entry_sp: self.entry_sp,
            window_start: self.window_start,
            window_end: self.window_end,
            writes: self.written.len(),
            reads: self.read.len(),
            modified_registers: self.modified.iter().copied().collect(),
        }
    }
}

/// Read-only view of one frame for step reports.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FrameSummary {
    /// Nesting depth; `0` is the outermost frame.
    pub depth: usize,
    /// Call target.
    pub entry_address: u64,
    /// Stack pointer at entry.
    pub entry_sp: u64,
    /// Inclusive window start.
    pub window_start: u64,
    /// Exclusive window end.
    pub window_end: u64,
    /// Distinct stack addresses written.
    pub writes: usize,
    /// Distinct stack addresses read.
    pub reads: usize,
    /// Registers written inside the frame.
    pub modified_registers: Vec<RegisterRef>,
}

/// Result of closing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FrameReport {
    /// Summary of the closed frame.
    pub frame: FrameSummary,
    /// Saved registers whose value differs from the value at entry.
    pub unrestored: Vec<RegisterRef>,
}

/// Stack of active call frames.
#[derive(Debug, Clone, Default)]
pub struct Sentinel {
    frames: Vec<CallFrame>,
}

impl Sentinel {
    /// Creates a sentinel with no active frame.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Number of active frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost active frame.
    #[must_use]
    pub fn current(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Opens a frame.
    pub fn push_frame(&mut self, frame: CallFrame) {
        log::debug!(
            "frame push 0x{:x} window [0x{:x}, 0x{:x})",
            frame.entry_address,
            frame.window_start,
            frame.window_end
        );
        self.frames.push(frame);
    }

    /// Closes the innermost frame and audits its saved registers against
    /// the current register values.
    pub fn pop_frame(&mut self, registers: &RegisterFile) -> Option<FrameReport> {
        let depth = self.frames.len().checked_sub(1)?;
        let frame = self.frames.pop()?;
        let unrestored = frame
            .saved
            .iter()
            .filter(|(reg, value)| registers.peek(*reg) != Some(*value))
            .map(|(reg, _)| *reg)
            .collect::<Vec<_>>();
        if !unrestored.is_empty() {
            log::debug!(
                "frame 0x{:x} returned with {} unrestored saved registers",
                frame.entry_address,
                unrestored.len()
            );
        }
        Some(FrameReport {
            frame: frame.summary(depth),
            unrestored,
        })
    }

    /// Checks a write of `len` bytes at `addr` against the innermost frame.
    ///
    /// Writes outside `stack`, or with no frame active, are always allowed.
    ///
    /// # Errors
    ///
    /// Returns [`StackViolation`] for the first byte that lies in the stack
    /// segment but outside the innermost window.
    pub fn check_write(&self, addr: u64, len: u64, stack: Segment) -> Result<(), StackViolation> {
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };
        for offset in 0..len.max(1) {
            let Some(byte) = addr.checked_add(offset) else {
                break;
            };
            if stack.contains(byte) && !frame.in_window(byte) {
                return Err(StackViolation {
                    address: byte,
                    start: frame.window_start,
                    end: frame.window_end,
                });
            }
        }
        Ok(())
    }

    /// Records a committed stack write against the innermost frame.
    pub fn record_write(&mut self, addr: u64, len: u64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.written.extend(addr..addr.saturating_add(len));
        }
    }

    /// Records a stack read against the innermost frame.
    pub fn record_read(&mut self, addr: u64, len: u64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.read.extend(addr..addr.saturating_add(len));
        }
    }

    /// Records a register write against the innermost frame.
    pub fn record_register_write(&mut self, reg: RegisterRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.modified.insert(reg);
        }
    }

    /// Grows the innermost window down to `new_sp` when the stack pointer is
    /// lowered.
    pub fn extend(&mut self, new_sp: u64) {
        if let Some(frame) = self.frames.last_mut() {
            if new_sp < frame.window_start {
                frame.window_start = new_sp;
            }
        }
    }

    /// Summaries of every active frame, outermost first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<FrameSummary> {
        self.frames
            .iter()
            .enumerate()
            .map(|(depth, frame)| frame.summary(depth))
            .collect()
    }

    /// Text rendering of the active frames, innermost first.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let _ = writeln!(
                out,
                "#{depth} 0x{:08x} sp=0x{:08x} [0x{:08x}, 0x{:08x}) writes={}",
                frame.entry_address,
                frame.entry_sp,
                frame.window_start,
                frame.window_end,
                frame.written.len()
            );
        }
        out
    }

    /// Drops every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
