use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crate::newick;
use crate::project;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFileFormat {
    Newick,
    Project,
}

impl fmt::Display for TreeFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeFileFormat::Newick => write!(f, "Newick"),
            TreeFileFormat::Project => write!(f, "project"),
        }
    }
}

/// Trees read from one input file.
#[derive(Debug, Clone)]
pub struct TreeBundle {
    pub format: TreeFileFormat,
    pub trees: Vec<Tree>,
}

impl TreeBundle {
    pub fn new(format: TreeFileFormat, trees: Vec<Tree>) -> Self {
        Self { format, trees }
    }
}

/// Loads a Newick or project file, telling them apart by content.
pub fn load_trees(path: &Path) -> Result<TreeBundle> {
    let raw = fs::read(path)
        .with_context(|| format!("failed to read tree file: {}", path.display()))?;

    let format = detect_format(&raw);
    let trees = match format {
        TreeFileFormat::Project => project::load(raw.as_slice())
            .with_context(|| format!("failed to load project {}", path.display()))?,
        TreeFileFormat::Newick => {
            let text = std::str::from_utf8(&raw)
                .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;
            newick::parse_str(text)
                .with_context(|| format!("failed to parse Newick file {}", path.display()))?
        }
    };

    if trees.is_empty() {
        bail!("tree file did not contain any trees");
    }

    info!(
        "loaded {} tree(s) from {} file {}",
        trees.len(),
        format,
        path.display()
    );
    Ok(TreeBundle::new(format, trees))
}

/// Writes `trees` as Newick text, one tree per line.
pub fn write_newick_file(path: &Path, trees: &[Tree]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    newick::write_trees(BufWriter::new(file), trees)
        .with_context(|| format!("failed to write Newick to {}", path.display()))?;
    info!("wrote {} tree(s) to {}", trees.len(), path.display());
    Ok(())
}

fn detect_format(raw: &[u8]) -> TreeFileFormat {
    if project::is_project(raw) {
        TreeFileFormat::Project
    } else {
        TreeFileFormat::Newick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_correctly() {
        assert_eq!(detect_format(b"(A:0.1,B:0.2);"), TreeFileFormat::Newick);
        assert_eq!(detect_format(&[0x1f, 0x8b, 0x08]), TreeFileFormat::Project);
        assert_eq!(detect_format(b""), TreeFileFormat::Newick);
    }

    #[test]
    fn loads_multiple_newick_trees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.nwk");
        fs::write(&path, "(A:0.1,B:0.2);\n(C:0.3,D:0.4);\n").unwrap();

        let bundle = load_trees(&path).unwrap();
        assert_eq!(bundle.format, TreeFileFormat::Newick);
        assert_eq!(bundle.trees.len(), 2);
    }

    #[test]
    fn loads_project_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.tsp");
        let tree = newick::parse_tree("((A,B),C);").unwrap();
        project::save_file(&path, &[tree]).unwrap();

        let bundle = load_trees(&path).unwrap();
        assert_eq!(bundle.format, TreeFileFormat::Project);
        assert_eq!(bundle.trees[0].leaves().count(), 3);
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.nwk");
        fs::write(&path, "\n\n").unwrap();
        let err = load_trees(&path).unwrap_err();
        assert!(err.to_string().contains("did not contain any trees"));
    }

    #[test]
    fn newick_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.nwk");
        let trees = newick::parse_str("(A:1,B:2);(C,D);").unwrap();
        write_newick_file(&path, &trees).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "(A:1,B:2);\n(C,D);\n");
    }
}
