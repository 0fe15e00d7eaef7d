use std::io::{self, Write};

use crate::tree::{CladeId, Tree};

/// Returns the Newick representation of `tree`, terminated by `;`.
///
/// Leaves emit their taxon, internal clades their support label; lengths are
/// written with `f64`'s shortest round-trip formatting. Labels are not escaped.
pub fn to_newick(tree: &Tree) -> String {
    let mut newick = String::with_capacity(tree.clade_count() * 8);
    write_clade(tree, tree.root(), &mut newick);
    newick.push(';');
    newick
}

/// Writes each tree on its own line.
pub fn write_trees<W: Write>(mut writer: W, trees: &[Tree]) -> io::Result<()> {
    for tree in trees {
        writer.write_all(to_newick(tree).as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

enum Step {
    Open(CladeId),
    Close(CladeId),
    Separator,
}

fn write_clade(tree: &Tree, root: CladeId, newick: &mut String) {
    let mut steps = vec![Step::Open(root)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Open(id) => {
                let clade = &tree[id];
                if clade.is_leaf() {
                    if let Some(name) = &clade.name {
                        newick.push_str(name);
                    }
                    push_length(clade.length(), newick);
                    continue;
                }
                newick.push('(');
                steps.push(Step::Close(id));
                for (index, &child) in clade.children().iter().enumerate().rev() {
                    steps.push(Step::Open(child));
                    if index > 0 {
                        steps.push(Step::Separator);
                    }
                }
            }
            Step::Close(id) => {
                let clade = &tree[id];
                newick.push(')');
                if let Some(support) = &clade.support {
                    newick.push_str(support);
                }
                push_length(clade.length(), newick);
            }
            Step::Separator => newick.push(','),
        }
    }
}

fn push_length(length: Option<f64>, newick: &mut String) {
    if let Some(length) = length {
        newick.push(':');
        newick.push_str(&length.to_string());
    }
}
