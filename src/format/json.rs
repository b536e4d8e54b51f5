//! JSON output formatter

use serde::{Deserialize, Serialize};

use super::ProgramFormatter;
use crate::{Addr, BasicBlock, Instruction, LiftError, Program};

/// Serializable instruction for JSON output
#[derive(Serialize, Deserialize)]
struct InstructionJson {
    /// Address of the instruction
    address: Addr,
    /// Size of the instruction in bytes
    size: u8,
    /// Mnemonic (e.g., "mov", "ret")
    mnemonic: String,
    /// Operands
    operands: String,
    /// Bytes of the instruction as hex string
    bytes: String,
}

/// Serializable basic block for JSON output
#[derive(Serialize, Deserialize)]
struct BasicBlockJson {
    /// Symbolic block name
    name: String,
    /// Entry address of the block
    entry: Addr,
    /// Instructions in this block
    instructions: Vec<InstructionJson>,
}

/// Serializable function for JSON output
#[derive(Serialize, Deserialize)]
struct FunctionJson {
    /// Symbolic function name
    name: String,
    /// Entry address of the function
    entry: Addr,
    /// Basic blocks, ascending by address; shared blocks repeat under each
    /// owning function
    blocks: Vec<BasicBlockJson>,
}

/// Serializable lift result for JSON output
#[derive(Serialize, Deserialize)]
struct ProgramJson {
    /// Functions in the lifted program
    functions: Vec<FunctionJson>,
}

/// Format a lifted program as JSON
pub struct JsonFormatter;

impl ProgramFormatter for JsonFormatter {
    fn format(&self, program: &Program) -> Result<String, LiftError> {
        let functions = program
            .functions
            .iter()
            .map(|func| FunctionJson {
                name: func.name(),
                entry: func.entry,
                blocks: program.function_blocks(func).map(block_to_json).collect(),
            })
            .collect();

        serde_json::to_string_pretty(&ProgramJson { functions })
            .map_err(|err| LiftError::Generic(format!("JSON serialization error: {err}")))
    }
}

/// Convert a basic block to JSON format
fn block_to_json(block: &BasicBlock) -> BasicBlockJson {
    BasicBlockJson {
        name: block.name(),
        entry: block.entry,
        instructions: block.insts.iter().map(instruction_to_json).collect(),
    }
}

/// Convert an instruction to JSON format
fn instruction_to_json(inst: &Instruction) -> InstructionJson {
    InstructionJson {
        address: inst.addr,
        size: inst.len,
        mnemonic: inst.mnemonic.clone(),
        operands: inst.operands.clone(),
        bytes: inst
            .bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
