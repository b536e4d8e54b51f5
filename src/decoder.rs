//! Capstone-based x86 instruction decoder.
//!
//! The lifter targets 32-bit PE images, so the processor mode is fixed to
//! x86 `Mode32`.

use std::fmt;

use capstone::arch::x86::ArchMode as X86Mode;
use capstone::{prelude::BuildsCapstone, Capstone};

use crate::{Addr, Instruction, MAX_INSTRUCTION_SIZE};

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Capstone error
    #[error("Capstone error: {0}")]
    Capstone(#[from] capstone::Error),

    /// The bytes at `addr` do not form a valid x86 instruction
    #[error("unable to parse instruction at address {addr}; next bytes: {context}")]
    InvalidInstruction { addr: Addr, context: String },
}

/// Classification of instructions that end a basic block by control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorKind {
    /// LOOP, LOOPE, LOOPNE
    Loop,
    /// Conditional jumps (JA, JE, JNE, ...)
    CondJump,
    /// Unconditional JMP
    Jump,
    /// RET
    Ret,
}

/// Classify a mnemonic as a terminator, if it is one.
///
/// CALL is deliberately absent: calls fall through during block
/// construction.
pub fn terminator(mnemonic: &str) -> Option<TerminatorKind> {
    match mnemonic {
        // Loop terminators.
        "loop" | "loope" | "loopne" => Some(TerminatorKind::Loop),
        // Conditional jump terminators.
        "ja" | "jae" | "jb" | "jbe" | "jcxz" | "je" | "jecxz" | "jg" | "jge" | "jl" | "jle"
        | "jne" | "jno" | "jnp" | "jns" | "jo" | "jp" | "jrcxz" | "js" => {
            Some(TerminatorKind::CondJump)
        }
        // Unconditional jump terminators.
        "jmp" => Some(TerminatorKind::Jump),
        // Return terminators.
        "ret" => Some(TerminatorKind::Ret),
        _ => None,
    }
}

/// An x86 32-bit instruction decoder backed by Capstone.
pub struct X86Decoder {
    cs: Capstone,
}

impl fmt::Debug for X86Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("X86Decoder")
    }
}

impl X86Decoder {
    /// Build a decoder in x86 32-bit mode.
    pub fn new() -> Result<Self, DecoderError> {
        let cs = Capstone::new()
            .x86()
            .mode(X86Mode::Mode32)
            .detail(false)
            .build()?;
        Ok(X86Decoder { cs })
    }

    /// Decode exactly one instruction at the beginning of `src`, tagging the
    /// result with `addr`.
    ///
    /// On failure the error carries the instruction address and up to 16
    /// bytes of context for diagnostics.
    pub fn decode(&self, addr: Addr, src: &[u8]) -> Result<Instruction, DecoderError> {
        let window = &src[..src.len().min(MAX_INSTRUCTION_SIZE)];
        let insns = self.cs.disasm_count(window, addr.value() as u64, 1)?;
        let Some(i) = insns.iter().next() else {
            return Err(DecoderError::InvalidInstruction {
                addr,
                context: hex_dump(window),
            });
        };

        // Copy up to MAX_INSTRUCTION_SIZE bytes of encoding.
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..i.bytes().len()].copy_from_slice(i.bytes());

        Ok(Instruction {
            addr,
            len: i.bytes().len() as u8,
            mnemonic: i.mnemonic().unwrap_or("").to_string(),
            operands: i.op_str().unwrap_or("").to_string(),
            bytes,
        })
    }
}

/// Render bytes as space-separated hex pairs for decode diagnostics.
fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
