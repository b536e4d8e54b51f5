//! Core types and pipeline for the pelift binary lifter.
//!
//! This library lifts 32-bit x86 PE executables into a structural,
//! IR-ready representation: functions made of basic blocks made of decoded
//! instructions, each annotated with its original virtual address. Control
//! flow recovery is delegated to out-of-band oracles (function entry
//! addresses, basic block entry addresses, and block-to-function membership
//! for non-contiguous functions), so the lifter itself only performs
//! translation.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use pelift::{
//!     lifter::Lifter,
//!     oracle::JsonOracleSource,
//! };
//!
//! // Oracles are read from funcs.json, blocks.json and chunks.json.
//! let source = JsonOracleSource::new(".");
//!
//! // Lift one binary executable.
//! let lifter = Lifter::new("path/to/binary.exe", &source).unwrap();
//! let program = lifter.lift().unwrap();
//!
//! for func in &program.functions {
//!     for block in program.function_blocks(func) {
//!         // Process the lifted basic blocks...
//!     }
//! }
//! ```

pub mod assemble;
pub mod decoder;
pub mod format;
pub mod lifter;
pub mod oracle;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::decoder::DecoderError;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// A 32-bit virtual address.
///
/// The textual form is `0x` followed by eight uppercase hex digits. Parsing
/// via [`FromStr`] accepts base 10, or base 16 when the string carries a
/// `0x`/`0X` prefix. The serde codec used for oracle files is stricter and
/// rejects strings without the `0x` prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(u32);

impl Addr {
    /// Largest representable address.
    pub const MAX: Addr = Addr(u32::MAX);

    /// Construct an address from its numeric value.
    pub const fn new(value: u32) -> Self {
        Addr(value)
    }

    /// Numeric value of the address.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Strict parse used by the oracle file codec: `0x`-prefixed hex only.
    pub fn parse_strict(s: &str) -> Result<Self, String> {
        let hex = s
            .strip_prefix("0x")
            .ok_or_else(|| format!("invalid hex representation {s:?}; missing 0x prefix"))?;
        u32::from_str_radix(hex, 16)
            .map(Addr)
            .map_err(|err| format!("invalid hex representation {s:?}: {err}"))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl FromStr for Addr {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).map(Addr)
        } else {
            s.parse::<u32>().map(Addr)
        }
    }
}

impl From<u32> for Addr {
    fn from(value: u32) -> Self {
        Addr(value)
    }
}

impl std::ops::Add<u32> for Addr {
    type Output = Addr;

    fn add(self, rhs: u32) -> Addr {
        Addr(self.0 + rhs)
    }
}

impl std::ops::Sub for Addr {
    type Output = u32;

    fn sub(self, rhs: Addr) -> u32 {
        self.0 - rhs.0
    }
}

impl Serialize for Addr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddrVisitor;

        impl Visitor<'_> for AddrVisitor {
            type Value = Addr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of the form \"0x\" followed by 1-8 hex digits")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Addr, E> {
                Addr::parse_strict(s).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AddrVisitor)
    }
}

/// One decoded x86 instruction, annotated with its virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Virtual address of the instruction
    pub addr: Addr,
    /// Size of the instruction in bytes
    pub len: u8,
    /// Instruction mnemonic (e.g., "mov", "ret")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub operands: String,
    /// Raw bytes of the instruction (up to MAX_INSTRUCTION_SIZE)
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
}

impl Instruction {
    /// Returns the instruction bytes, up to the actual instruction length.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Address of the instruction immediately following this one.
    pub fn next_addr(&self) -> Addr {
        self.addr + self.len as u32
    }

    /// Returns true if this instruction ends a basic block by control flow.
    pub fn is_terminator(&self) -> bool {
        decoder::terminator(&self.mnemonic).is_some()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{}\t{}", self.mnemonic, self.operands)
        }
    }
}

/// A basic block; a sequence of non-branching instructions terminated by an
/// explicit or implicit (oracle-declared fall-through) control flow boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Entry address of the basic block
    pub entry: Addr,
    /// One or more instructions
    pub insts: Vec<Instruction>,
}

impl BasicBlock {
    /// Symbolic name of the block, as used in the IR handoff.
    pub fn name(&self) -> String {
        format!("block_{:08X}", self.entry.value())
    }

    /// Address one past the last instruction of the block.
    pub fn end_addr(&self) -> Option<Addr> {
        self.insts.last().map(Instruction::next_addr)
    }

    /// Get the last instruction in the block
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.insts.last()
    }

    /// Get the size of the block in bytes
    pub fn size(&self) -> usize {
        self.insts.iter().map(|i| i.len as usize).sum()
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name())?;
        for inst in &self.insts {
            write!(f, "\n\t{}\t{}", inst.addr, inst)?;
        }
        Ok(())
    }
}

/// A function consisting of one or more basic blocks.
///
/// Blocks are stored by address only; the blocks themselves live in the
/// [`Program`] pool, so one block can belong to several non-contiguous
/// functions without shared ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Address of the entry basic block
    pub entry: Addr,
    /// Entry addresses of the basic blocks belonging to this function
    pub blocks: BTreeSet<Addr>,
}

impl Function {
    /// Create an empty function with the given entry address.
    pub fn new(entry: Addr) -> Self {
        Function {
            entry,
            blocks: BTreeSet::new(),
        }
    }

    /// Symbolic name of the function, as used in the IR handoff.
    pub fn name(&self) -> String {
        format!("func_{:08X}", self.entry.value())
    }
}

/// The lifted program: the handoff from the code-recovery pipeline to an IR
/// emission back-end.
///
/// Basic blocks live once in an address-keyed pool; functions reference them
/// by entry address. Nothing is mutated after assembly, so the whole graph
/// can be read concurrently.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// All decoded basic blocks, keyed by entry address
    pub blocks: BTreeMap<Addr, BasicBlock>,
    /// Functions in ascending entry-address order
    pub functions: Vec<Function>,
}

impl Program {
    /// Look up the unique basic block starting at `addr`.
    pub fn block(&self, addr: Addr) -> Option<&BasicBlock> {
        self.blocks.get(&addr)
    }

    /// Iterate the blocks of `func` in ascending address order.
    pub fn function_blocks<'a>(
        &'a self,
        func: &'a Function,
    ) -> impl Iterator<Item = &'a BasicBlock> {
        func.blocks.iter().filter_map(move |addr| self.blocks.get(addr))
    }
}

/// Error type for lift operations
#[derive(Debug, thiserror::Error)]
pub enum LiftError {
    /// Failed to parse an oracle file
    #[error("failed to parse oracle file {path}: {detail}")]
    OracleParse { path: String, detail: String },

    /// Failed to open or parse the PE image
    #[error("failed to open PE image: {0}")]
    PeOpen(String),

    /// The image is not a 32-bit PE
    #[error("support for 64-bit executables not yet implemented")]
    UnsupportedArch,

    /// Failed to read the raw data of a section
    #[error("failed to read raw data of section {0:?}")]
    SectionRead(String),

    /// Instruction decoder rejected the bytes
    #[error(transparent)]
    Decode(#[from] DecoderError),

    /// Contiguous block assignment invariant violated
    #[error("unable to locate function containing basic block; expected address >= {start}, got {found}")]
    BlockBeforeFunctionStart { start: Addr, found: Addr },

    /// `chunks` references a basic block that was never decoded
    #[error("unable to locate basic block at {0}")]
    MissingBlock(Addr),

    /// `chunks` references an unknown function
    #[error("unable to locate function at {0}")]
    MissingFunction(Addr),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(addr: u32, len: u8, mnemonic: &str, raw: &[u8]) -> Instruction {
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Instruction {
            addr: Addr::new(addr),
            len,
            mnemonic: mnemonic.to_string(),
            operands: String::new(),
            bytes,
        }
    }

    #[test]
    fn test_addr_display() {
        assert_eq!(Addr::new(0x401000).to_string(), "0x00401000");
        assert_eq!(Addr::new(0).to_string(), "0x00000000");
        assert_eq!(Addr::new(u32::MAX).to_string(), "0xFFFFFFFF");
    }

    #[test]
    fn test_addr_parse_bases() {
        assert_eq!("4198400".parse::<Addr>().unwrap(), Addr::new(0x401000));
        assert_eq!("0x401000".parse::<Addr>().unwrap(), Addr::new(0x401000));
        assert_eq!("0X401000".parse::<Addr>().unwrap(), Addr::new(0x401000));
        assert!("0x100000000".parse::<Addr>().is_err());
        assert!("4294967296".parse::<Addr>().is_err());
        assert!("0xzz".parse::<Addr>().is_err());
    }

    #[test]
    fn test_addr_round_trip() {
        for value in [0u32, 1, 0x401000, 0xDEAD_BEEF, u32::MAX] {
            let addr = Addr::new(value);
            assert_eq!(addr.to_string().parse::<Addr>().unwrap(), addr);
        }
    }

    #[test]
    fn test_addr_strict_codec() {
        let addr: Addr = serde_json::from_str("\"0x00401000\"").unwrap();
        assert_eq!(addr, Addr::new(0x401000));

        // Short forms are allowed, the prefix is not optional.
        let addr: Addr = serde_json::from_str("\"0x1\"").unwrap();
        assert_eq!(addr, Addr::new(1));
        assert!(serde_json::from_str::<Addr>("\"401000\"").is_err());
        assert!(serde_json::from_str::<Addr>("\"0x\"").is_err());
        assert!(serde_json::from_str::<Addr>("\"0x123456789\"").is_err());

        assert_eq!(
            serde_json::to_string(&Addr::new(0x401000)).unwrap(),
            "\"0x00401000\""
        );
    }

    #[test]
    fn test_addr_arithmetic() {
        let addr = Addr::new(0x401000);
        assert_eq!(addr + 5, Addr::new(0x401005));
        assert_eq!(Addr::new(0x401005) - addr, 5);
    }

    #[test]
    fn test_instruction_bytes() {
        let i = inst(0x401000, 5, "mov", &[0xb8, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(i.bytes(), &[0xb8, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(i.next_addr(), Addr::new(0x401005));
    }

    #[test]
    fn test_basic_block_operations() {
        let block = BasicBlock {
            entry: Addr::new(0x401000),
            insts: vec![
                inst(0x401000, 5, "mov", &[0xb8, 0x01, 0x00, 0x00, 0x00]),
                inst(0x401005, 1, "ret", &[0xc3]),
            ],
        };

        assert_eq!(block.name(), "block_00401000");
        assert_eq!(block.end_addr(), Some(Addr::new(0x401006)));
        assert_eq!(block.last_instruction().unwrap().mnemonic, "ret");
        assert_eq!(block.size(), 6);
    }

    #[test]
    fn test_symbolic_names() {
        let func = Function::new(Addr::new(0x401000));
        assert_eq!(func.name(), "func_00401000");
    }

    #[test]
    fn test_program_block_lookup() {
        let mut program = Program::default();
        let entry = Addr::new(0x401000);
        program.blocks.insert(
            entry,
            BasicBlock {
                entry,
                insts: vec![inst(0x401000, 1, "ret", &[0xc3])],
            },
        );
        let mut func = Function::new(entry);
        func.blocks.insert(entry);
        program.functions.push(func);

        assert!(program.block(entry).is_some());
        let blocks: Vec<_> = program.function_blocks(&program.functions[0]).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].entry, entry);
    }
}
