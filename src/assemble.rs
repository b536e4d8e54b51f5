//! Oracle-guided basic block decoding and function assembly.
//!
//! Block boundaries come from the oracle rather than from control-flow
//! discovery: a block ends either at a terminator instruction or where the
//! next declared block begins (a fall-through split). Functions are carved
//! out of the ascending block list by the function entry windows, then
//! extended with the non-contiguous memberships asserted by `chunks`.

use std::collections::BTreeMap;

use crate::decoder::X86Decoder;
use crate::oracle::Oracles;
use crate::{Addr, BasicBlock, Function, LiftError, Program};

/// Decode one basic block per address in `block_addrs` from a section that
/// starts at virtual address `start` with contents `data`.
///
/// `block_addrs` must be ascending and every address must fall inside
/// `[start, start + data.len())`; the lifter partitions the oracle block
/// list per section before calling this.
pub fn decode_blocks(
    start: Addr,
    data: &[u8],
    block_addrs: &[Addr],
    decoder: &X86Decoder,
) -> Result<Vec<BasicBlock>, LiftError> {
    log::debug!("decode_blocks(start = {start}, {} block(s))", block_addrs.len());
    let mut blocks = Vec::with_capacity(block_addrs.len());
    for (j, &block_addr) in block_addrs.iter().enumerate() {
        log::debug!("   block_{:08X}:", block_addr.value());
        let next_block = block_addrs.get(j + 1).copied();
        let mut insts = Vec::new();
        let mut inst_addr = block_addr;
        loop {
            let offset = (inst_addr - start) as usize;
            let src = data.get(offset..).unwrap_or(&[]);
            let inst = decoder.decode(inst_addr, src)?;
            inst_addr = inst.next_addr();
            log::debug!("      {}\t{}", inst.addr, inst);
            let done = inst.is_terminator();
            insts.push(inst);
            if done {
                break;
            }
            if let Some(next) = next_block {
                if inst_addr >= next {
                    if inst_addr > next {
                        // The oracle declared a block boundary inside this
                        // instruction; the next block still restarts at its
                        // declared address.
                        log::warn!(
                            "instruction at {} straddles declared block boundary {}",
                            insts.last().map(|i| i.addr).unwrap_or(block_addr),
                            next
                        );
                    }
                    break;
                }
            }
        }
        blocks.push(BasicBlock {
            entry: block_addr,
            insts,
        });
    }
    Ok(blocks)
}

/// Group decoded basic blocks into functions.
///
/// The contiguous phase assigns each block to the function whose half-open
/// entry window contains it; the chunks phase additionally inserts blocks
/// into the non-contiguous functions that claim them.
pub fn assemble_functions(
    blocks: Vec<BasicBlock>,
    oracles: &Oracles,
) -> Result<Program, LiftError> {
    log::debug!("assemble_functions({} block(s))", blocks.len());
    let entries: Vec<Addr> = blocks.iter().map(|b| b.entry).collect();
    let pool: BTreeMap<Addr, BasicBlock> =
        blocks.into_iter().map(|b| (b.entry, b)).collect();

    // Add contiguous basic blocks. The cursor walks the ascending block
    // list once across all functions.
    let mut functions = Vec::with_capacity(oracles.func_addrs.len());
    let mut index_from_addr = BTreeMap::new();
    let mut j = 0;
    for (i, &func_addr) in oracles.func_addrs.iter().enumerate() {
        let start = func_addr;
        let end = oracles.func_addrs.get(i + 1).copied().unwrap_or(Addr::MAX);
        let mut func = Function::new(func_addr);
        while let Some(&block_addr) = entries.get(j) {
            if block_addr >= end {
                break;
            }
            if block_addr < start {
                return Err(LiftError::BlockBeforeFunctionStart {
                    start,
                    found: block_addr,
                });
            }
            func.blocks.insert(block_addr);
            j += 1;
        }
        index_from_addr.insert(func_addr, i);
        functions.push(func);
    }

    // Add non-contiguous basic blocks. Membership is additive: a block
    // keeps its contiguous owner and gains the owners named by chunks.
    for (&block_addr, func_addrs) in &oracles.chunks {
        if !pool.contains_key(&block_addr) {
            return Err(LiftError::MissingBlock(block_addr));
        }
        for &func_addr in func_addrs {
            let &i = index_from_addr
                .get(&func_addr)
                .ok_or(LiftError::MissingFunction(func_addr))?;
            log::debug!(
                "   add basic block {} to non-continuous function {}",
                block_addr,
                func_addr
            );
            functions[i].blocks.insert(block_addr);
        }
    }

    Ok(Program {
        blocks: pool,
        functions,
    })
}
