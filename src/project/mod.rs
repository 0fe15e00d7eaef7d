//! Gzip-compressed JSON project files holding trees with their styles.
//!
//! ```text
//! gzip( {"version": "1", "payload": {"trees": [
//!     {"treeText": "...;", "treeStyle": {...}, "cladeStyles": [...], "label": "..."}
//! ]}} )
//! ```
//!
//! `cladeStyles` follows the canonical clade order of the tree parsed back from
//! `treeText`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::newick::{parse_tree, to_newick};
use crate::style::{CladeStyle, TreeStyle};
use crate::tree::Tree;

pub const FORMAT_VERSION: &str = "1";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read or write project data")]
    Io(#[from] io::Error),
    #[error("invalid project data: {message}")]
    InvalidData {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("unsupported project version `{found}` (expected `{expected}`)")]
    UnsupportedVersion { found: String, expected: &'static str },
}

impl ProjectError {
    fn invalid(message: impl Into<String>) -> Self {
        ProjectError::InvalidData {
            message: message.into(),
            source: None,
        }
    }

    fn invalid_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ProjectError::InvalidData {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Top-level document.
#[derive(Serialize, Deserialize)]
struct Envelope<P> {
    version: String,
    payload: P,
}

/// Version field alone, read before anything else in the document is decoded.
#[derive(Deserialize)]
struct VersionHeader {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    trees: Vec<TreeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeRecord {
    tree_text: String,
    tree_style: TreeStyle,
    clade_styles: Vec<CladeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl TreeRecord {
    /// Fails when the tree's Newick text would not parse back into the same
    /// number of clades, so that a saved file always loads.
    fn from_tree(index: usize, tree: &Tree) -> Result<Self, ProjectError> {
        let tree_text = to_newick(tree);
        let clade_styles: Vec<_> = tree.all_clades().map(|id| tree[id].style.clone()).collect();

        let reparsed = parse_tree(&tree_text).map_err(|err| {
            ProjectError::invalid_with(
                format!("tree {index} cannot be written as Newick text `{tree_text}`"),
                err,
            )
        })?;
        if reparsed.clade_count() != clade_styles.len() {
            return Err(ProjectError::invalid(format!(
                "tree {index} has {} clades but its Newick text has {}",
                clade_styles.len(),
                reparsed.clade_count()
            )));
        }

        Ok(Self {
            tree_text,
            tree_style: tree.style.clone(),
            clade_styles,
            label: tree.label.clone(),
        })
    }

    fn into_tree(self, index: usize) -> Result<Tree, ProjectError> {
        let mut tree = parse_tree(&self.tree_text).map_err(|err| {
            ProjectError::invalid_with(format!("tree {index} has invalid Newick text"), err)
        })?;

        let ids: Vec<_> = tree.all_clades().collect();
        if ids.len() != self.clade_styles.len() {
            return Err(ProjectError::invalid(format!(
                "tree {index} has {} clades but {} clade styles",
                ids.len(),
                self.clade_styles.len()
            )));
        }

        tree.style = self.tree_style;
        tree.label = self.label;
        for (id, style) in ids.into_iter().zip(self.clade_styles) {
            tree[id].style = style;
        }
        Ok(tree)
    }
}

/// Writes `trees` as a compressed project document. Nothing is written when
/// any tree cannot be stored.
pub fn save<W: Write>(writer: W, trees: &[Tree]) -> Result<(), ProjectError> {
    let records = trees
        .iter()
        .enumerate()
        .map(|(index, tree)| TreeRecord::from_tree(index, tree))
        .collect::<Result<Vec<_>, _>>()?;
    let envelope = Envelope {
        version: FORMAT_VERSION.to_owned(),
        payload: Payload { trees: records },
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|err| ProjectError::invalid_with("failed to encode project", err))?;

    let mut encoder = GzEncoder::new(writer, Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()?.flush()?;
    debug!("saved {} tree(s), {} bytes of JSON", trees.len(), json.len());
    Ok(())
}

/// Reads a project document. Either every tree loads or an error is returned.
pub fn load<R: Read>(mut reader: R) -> Result<Vec<Tree>, ProjectError> {
    let mut compressed = Vec::new();
    reader.read_to_end(&mut compressed)?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|err| ProjectError::invalid_with("project data is not gzip-compressed", err))?;

    let header: VersionHeader = serde_json::from_slice(&json)
        .map_err(|err| ProjectError::invalid_with("malformed project envelope", err))?;
    if header.version != FORMAT_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            found: header.version,
            expected: FORMAT_VERSION,
        });
    }

    let envelope: Envelope<Payload> = serde_json::from_slice(&json)
        .map_err(|err| ProjectError::invalid_with("malformed project payload", err))?;

    let trees = envelope
        .payload
        .trees
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_tree(index))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("loaded {} tree(s) from project", trees.len());
    Ok(trees)
}

pub fn save_file(path: &Path, trees: &[Tree]) -> Result<(), ProjectError> {
    let file = File::create(path)?;
    save(BufWriter::new(file), trees)?;
    info!("saved project {}", path.display());
    Ok(())
}

pub fn load_file(path: &Path) -> Result<Vec<Tree>, ProjectError> {
    let file = File::open(path)?;
    let trees = load(BufReader::new(file))?;
    info!("loaded project {}", path.display());
    Ok(trees)
}

/// True when `bytes` starts with the gzip magic number.
pub fn is_project(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{CladeLabel, Color};

    fn styled_tree() -> Tree {
        let mut tree = parse_tree(
            "(A:2,((BAA:5,BAB:3)20/30:1,((BBAA:2,BBAB:1)85/95:1,BBB:3)100/100:2)30/45:2,C:1);",
        )
        .unwrap();
        tree.label = Some("scenario".into());
        tree.style.x_scale = 42.0;
        tree.style.show_node_values = true;
        let ids: Vec<_> = tree.all_clades().collect();
        for (n, id) in ids.iter().enumerate() {
            tree[*id].style.branch_color = Some(Color::from_rgb(n as u8 * 10, 0, 0));
        }
        tree[ids[2]].style.collapsed = true;
        tree[ids[2]].style.label = Some(CladeLabel::new("B", Color::BLACK));
        tree
    }

    fn gzip_json(json: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn round_trip_keeps_styles_in_order() {
        let tree = styled_tree();
        let mut bytes = Vec::new();
        save(&mut bytes, &[tree.clone(), parse_tree("(X,Y);").unwrap()]).unwrap();
        assert!(is_project(&bytes));

        let loaded = load(bytes.as_slice()).unwrap();
        assert_eq!(loaded.len(), 2);
        let back = &loaded[0];
        assert_eq!(back.clade_count(), tree.clade_count());
        assert_eq!(back.style, tree.style);
        assert_eq!(back.label.as_deref(), Some("scenario"));

        let styles = |t: &Tree| {
            t.all_clades()
                .map(|id| t[id].style.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(styles(back), styles(&tree));
        assert_eq!(to_newick(back), to_newick(&tree));
    }

    #[test]
    fn version_mismatch_is_rejected_before_payload_decoding() {
        let bytes = gzip_json(r#"{"version": "2", "payload": {"not": "a payload"}}"#);
        match load(bytes.as_slice()) {
            Err(ProjectError::UnsupportedVersion { found, expected }) => {
                assert_eq!(found, "2");
                assert_eq!(expected, FORMAT_VERSION);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unknown_version_wins_over_unknown_layout() {
        let bytes = gzip_json(r#"{"version": "2", "document": [1, 2, 3]}"#);
        assert!(matches!(
            load(bytes.as_slice()),
            Err(ProjectError::UnsupportedVersion { found, .. }) if found == "2"
        ));
    }

    fn assert_unsaveable(trees: &[Tree], index: usize) {
        let mut bytes = Vec::new();
        match save(&mut bytes, trees) {
            Err(ProjectError::InvalidData { message, .. }) => {
                assert!(message.starts_with(&format!("tree {index} ")), "{message}");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(bytes.is_empty());
    }

    #[test]
    fn anonymous_leaf_without_length_is_not_saved() {
        let mut tree = Tree::new();
        let root = tree.new_clade();
        let a = tree.new_clade();
        let b = tree.new_clade();
        tree.add_child(root, a).unwrap();
        tree.add_child(root, b).unwrap();
        assert_eq!(to_newick(&tree), "(,);");
        assert_unsaveable(&[tree], 0);
    }

    #[test]
    fn empty_tree_is_not_saved() {
        assert_unsaveable(&[parse_tree("(X,Y);").unwrap(), Tree::new()], 1);
    }

    #[test]
    fn taxon_with_newick_punctuation_is_not_saved() {
        let mut tree = parse_tree("(A,B);").unwrap();
        let leaf = tree.leaves().next().unwrap();
        tree[leaf].name = Some("Homo sapiens (human)".into());
        assert_unsaveable(&[tree], 0);

        for name in ["a,b", "a:b", "a;b"] {
            let mut tree = parse_tree("(A,B);").unwrap();
            let leaf = tree.leaves().next().unwrap();
            tree[leaf].name = Some(name.into());
            assert_unsaveable(&[tree], 0);
        }
    }

    #[test]
    fn style_count_mismatch_is_invalid_data() {
        let bytes = gzip_json(
            r#"{"version": "1", "payload": {"trees": [
                {"treeText": "(A,B);", "treeStyle": {}, "cladeStyles": [{}, {}]}
            ]}}"#,
        );
        assert!(matches!(
            load(bytes.as_slice()),
            Err(ProjectError::InvalidData { .. })
        ));
    }

    #[test]
    fn missing_fields_are_invalid_data() {
        let bytes =
            gzip_json(r#"{"version": "1", "payload": {"trees": [{"treeText": "(A,B);"}]}}"#);
        assert!(matches!(
            load(bytes.as_slice()),
            Err(ProjectError::InvalidData { .. })
        ));

        let bytes = gzip_json(r#"{"payload": {}}"#);
        assert!(matches!(
            load(bytes.as_slice()),
            Err(ProjectError::InvalidData { .. })
        ));
    }

    #[test]
    fn bad_tree_text_is_invalid_data_with_source() {
        let bytes = gzip_json(
            r#"{"version": "1", "payload": {"trees": [
                {"treeText": "(A,B", "treeStyle": {}, "cladeStyles": []}
            ]}}"#,
        );
        let err = load(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidData { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn uncompressed_data_is_invalid() {
        assert!(!is_project(b"(A,B);"));
        assert!(matches!(
            load(&b"(A,B);"[..]),
            Err(ProjectError::InvalidData { .. })
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.tsp");
        save_file(&path, &[styled_tree()]).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(matches!(
            load_file(&dir.path().join("missing.tsp")),
            Err(ProjectError::Io(_))
        ));
    }
}
