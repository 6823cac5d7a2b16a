//! # Verification Diagnostics
//!
//! A trace of anchor points and instructions collected during verbose verification, plus the
//! renderer that turns a latched error detail into a readable multi-line report. Message
//! catalogs are the caller's business; this module only formats the captured data.

use std::fmt::Write;

use crate::error::ErrorDetail;
use crate::frame::Frame;
use crate::names::ClassNames;
use crate::types::TypeWord;

/// One recorded trace step.
#[derive(Clone, Debug)]
pub struct TraceEntry {
    /// Bytecode offset.
    pub pc: u32,
    /// Instruction mnemonic, or a pseudo-label for anchors.
    pub mnemonic: &'static str,
    /// Operand stack before the step.
    pub stack: Vec<TypeWord>,
    /// Whether this entry is a map point rather than an instruction.
    pub is_anchor: bool,
}

/// Trace log for verbose verification output.
#[derive(Debug, Default)]
pub struct VerificationTrace {
    enabled: bool,
    entries: Vec<TraceEntry>,
}

impl VerificationTrace {
    /// Create a trace; a disabled trace records nothing.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    /// `true` when entries are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an instruction step.
    pub fn log_instruction(&mut self, pc: u32, mnemonic: &'static str, frame: &Frame) {
        if !self.enabled {
            return;
        }
        self.entries.push(TraceEntry {
            pc,
            mnemonic,
            stack: frame.stack.clone(),
            is_anchor: false,
        });
    }

    /// Record a map point.
    pub fn log_anchor(&mut self, pc: u32, frame: &Frame) {
        if !self.enabled {
            return;
        }
        self.entries.push(TraceEntry {
            pc,
            mnemonic: "[frame]",
            stack: frame.stack.clone(),
            is_anchor: true,
        });
    }

    /// The recorded entries.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Render the trace with class names resolved.
    #[must_use]
    pub fn format(&self, names: &ClassNames) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let stack: Vec<String> = entry.stack.iter().map(|word| word.format(names)).collect();
            if entry.is_anchor {
                let _ = writeln!(out, "=== pc {} {} [{}]", entry.pc, entry.mnemonic, stack.join(", "));
            } else {
                let _ = writeln!(out, "pc {:4}: {:<14} [{}]", entry.pc, entry.mnemonic, stack.join(", "));
            }
        }
        out
    }

    /// Forget all entries, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Render an error detail with class names resolved, one field per line.
#[must_use]
pub fn render_detail(detail: &ErrorDetail, names: &ClassNames) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "VerifyError: {}", detail.kind);
    if let Some(pc) = detail.pc {
        let _ = writeln!(out, "  pc: {pc}");
    }
    if let Some(slot) = detail.frame_position {
        let _ = writeln!(out, "  slot: {slot}");
    }
    if let Some(index) = detail.target_frame_index {
        let _ = writeln!(out, "  frame: {index}");
    }
    if let Some(expected) = detail.expected {
        let _ = writeln!(out, "  expected: {}", expected.format(names));
    }
    if let Some(found) = detail.found {
        let _ = writeln!(out, "  found: {}", found.format(names));
    }
    if let Some(temp) = detail.temp_data {
        let _ = writeln!(out, "  companion: {}", temp.format(names));
    }
    if let Some(triple) = &detail.method_triple {
        let _ = writeln!(out, "  callee: {triple}");
    }
    out
}
