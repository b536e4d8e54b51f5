//! Per-binary lift orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::{assemble_functions, decode_blocks};
use crate::decoder::X86Decoder;
use crate::oracle::{OracleSource, Oracles};
use crate::parser::{PeImage, Section};
use crate::{Addr, BasicBlock, LiftError, Program};

/// A binary executable lifter.
///
/// One lift processes one binary sequentially: the oracles are loaded once
/// at construction; [`Lifter::lift`] opens the PE image, decodes the basic
/// blocks of every executable section and assembles them into functions.
#[derive(Debug)]
pub struct Lifter {
    /// Binary executable path
    bin_path: PathBuf,
    /// Oracle address sets
    oracles: Oracles,
    /// x86 decoder, fixed to 32-bit mode
    decoder: X86Decoder,
}

impl Lifter {
    /// Create a lifter for the given binary executable path, loading the
    /// oracle collections from `source`.
    pub fn new(
        bin_path: impl Into<PathBuf>,
        source: &dyn OracleSource,
    ) -> Result<Self, LiftError> {
        Ok(Lifter {
            bin_path: bin_path.into(),
            oracles: source.load()?,
            decoder: X86Decoder::new().map_err(LiftError::Decode)?,
        })
    }

    /// Path of the binary this lifter operates on.
    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    /// Lift the binary executable into its structural representation.
    pub fn lift(&self) -> Result<Program, LiftError> {
        log::debug!("lift(bin_path = {:?})", self.bin_path);
        let data = fs::read(&self.bin_path)
            .map_err(|err| LiftError::PeOpen(format!("{}: {err}", self.bin_path.display())))?;
        let image = PeImage::parse(&data)?;

        // Decode blocks per executable section, ascending by address, so the
        // combined list stays sorted for function assembly.
        let mut sections: Vec<&Section> = image.executable_sections().collect();
        sections.sort_by_key(|s| s.virtual_address);

        let mut blocks: Vec<BasicBlock> = Vec::new();
        for sect in &sections {
            let start = image.base + sect.virtual_address.value();
            log::debug!("=== [ section {:?} ] ===", sect.name);
            let addrs = section_block_addrs(&self.oracles.block_addrs, start, sect.data.len());
            blocks.extend(decode_blocks(start, &sect.data, addrs, &self.decoder)?);
        }

        for &addr in &self.oracles.block_addrs {
            if !blocks.iter().any(|b| b.entry == addr) {
                log::warn!("basic block address {addr} not covered by any executable section");
            }
        }

        assemble_functions(blocks, &self.oracles)
    }
}

/// The contiguous run of `block_addrs` that falls inside the section
/// `[start, start + len)`.
fn section_block_addrs(block_addrs: &[Addr], start: Addr, len: usize) -> &[Addr] {
    let end = start.value() as u64 + len as u64;
    let lo = block_addrs.partition_point(|&a| a < start);
    let hi = block_addrs.partition_point(|&a| (a.value() as u64) < end);
    &block_addrs[lo..hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(values: &[u32]) -> Vec<Addr> {
        values.iter().copied().map(Addr::new).collect()
    }

    #[test]
    fn test_section_block_addrs_partition() {
        let all = addrs(&[0x1000, 0x401000, 0x401005, 0x402000, 0x500000]);
        let within = section_block_addrs(&all, Addr::new(0x401000), 0x1000);
        assert_eq!(within, &addrs(&[0x401000, 0x401005])[..]);
    }

    #[test]
    fn test_section_block_addrs_empty() {
        let all = addrs(&[0x1000]);
        assert!(section_block_addrs(&all, Addr::new(0x401000), 0x1000).is_empty());
        assert!(section_block_addrs(&[], Addr::new(0x401000), 0x1000).is_empty());
    }
}
