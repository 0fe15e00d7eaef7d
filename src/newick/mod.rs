//! Newick text codec.
//!
//! ```text
//! tree     := clade ';'
//! clade    := leaf | internal
//! leaf     := taxon? (':' number)?
//! internal := '(' clade (',' clade)* ')' support? (':' number)?
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::num::ParseFloatError;
use std::path::Path;

use thiserror::Error;

mod parser;
mod writer;

pub use parser::{parse_str, parse_tree, read_trees};
pub use writer::{to_newick, write_trees};

use crate::tree::Tree;

/// Malformed Newick input.
#[derive(Debug, Error)]
pub enum NewickError {
    #[error("unbalanced brackets in `{0}`")]
    UnbalancedBrackets(String),
    #[error("invalid branch length `{text}`")]
    InvalidLength {
        text: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("empty clade")]
    EmptyClade,
    #[error("unexpected text `{0}` before '('")]
    UnexpectedText(String),
    #[error("expected exactly one tree, found {0}")]
    TreeCount(usize),
    #[error("failed to read Newick input")]
    Io(#[from] io::Error),
}

/// Reads every tree in a Newick file.
pub fn load_trees(path: &Path) -> Result<Vec<Tree>, NewickError> {
    let file = File::open(path)?;
    read_trees(BufReader::new(file))
}
