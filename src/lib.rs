//! Styled phylogenetic trees: Newick codec, clade styling, figure export and
//! project files.

pub mod app;
pub mod export;
pub mod io;
pub mod newick;
pub mod project;
pub mod render;
pub mod style;
pub mod tree;
