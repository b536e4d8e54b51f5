//! Oracle collections and their JSON file source.
//!
//! Oracles carry the out-of-band ground truth that drives the lifter:
//! function entry addresses, basic block entry addresses, and the
//! block-to-function membership of non-contiguous functions. The file
//! format is one possible source; the assembler only depends on
//! [`OracleSource`], so in-memory or database-backed sources need no
//! changes elsewhere.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::{Addr, LiftError};

/// Oracle file holding the function entry addresses.
pub const FUNCS_JSON: &str = "funcs.json";
/// Oracle file holding the basic block entry addresses.
pub const BLOCKS_JSON: &str = "blocks.json";
/// Oracle file mapping block addresses to the non-contiguous functions
/// claiming them.
pub const CHUNKS_JSON: &str = "chunks.json";

/// Address sets guiding one lift.
///
/// `func_addrs` and `block_addrs` are sorted ascending after loading and
/// immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Oracles {
    /// Function entry addresses, ascending
    pub func_addrs: Vec<Addr>,
    /// Basic block entry addresses, ascending
    pub block_addrs: Vec<Addr>,
    /// Maps a basic block address to the set of non-contiguous functions
    /// that claim the block
    pub chunks: BTreeMap<Addr, BTreeSet<Addr>>,
}

/// A source of oracle address sets.
pub trait OracleSource {
    /// Load the three oracle collections.
    fn load(&self) -> Result<Oracles, LiftError>;
}

/// Oracle source reading `funcs.json`, `blocks.json` and `chunks.json`
/// from a directory.
///
/// An absent file leaves the corresponding collection empty and logs a
/// warning; a present file is parsed strictly.
#[derive(Debug, Clone)]
pub struct JsonOracleSource {
    dir: PathBuf,
}

impl JsonOracleSource {
    /// Create a source rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonOracleSource { dir: dir.into() }
    }

    /// Parse one oracle file, or return `None` if it does not exist.
    fn parse_file<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, LiftError> {
        let path = self.dir.join(name);
        let buf = match fs::read(&path) {
            Ok(buf) => buf,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("unable to locate JSON file {:?}", path);
                return Ok(None);
            }
            Err(err) => return Err(oracle_parse(&path, err)),
        };
        log::debug!("parse_json(path = {:?})", path);
        serde_json::from_slice(&buf)
            .map(Some)
            .map_err(|err| oracle_parse(&path, err))
    }
}

impl OracleSource for JsonOracleSource {
    fn load(&self) -> Result<Oracles, LiftError> {
        let mut func_addrs: Vec<Addr> = self.parse_file(FUNCS_JSON)?.unwrap_or_default();
        func_addrs.sort_unstable();

        let mut block_addrs: Vec<Addr> = self.parse_file(BLOCKS_JSON)?.unwrap_or_default();
        block_addrs.sort_unstable();

        // The booleans in chunks.json are ignored; the keys are the set.
        let raw: BTreeMap<Addr, BTreeMap<Addr, bool>> =
            self.parse_file(CHUNKS_JSON)?.unwrap_or_default();
        let chunks = raw
            .into_iter()
            .map(|(block, funcs)| (block, funcs.into_keys().collect()))
            .collect();

        Ok(Oracles {
            func_addrs,
            block_addrs,
            chunks,
        })
    }
}

fn oracle_parse(path: &Path, err: impl std::fmt::Display) -> LiftError {
    LiftError::OracleParse {
        path: path.display().to_string(),
        detail: err.to_string(),
    }
}
