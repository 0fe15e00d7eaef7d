use std::io::BufRead;

use log::debug;

use super::NewickError;
use crate::tree::{CladeId, Tree};

/// Parses every `;`-terminated tree in `input`.
///
/// Each line is trimmed on its own and may hold several trees; empty lines and
/// empty pieces between semicolons are skipped.
pub fn parse_str(input: &str) -> Result<Vec<Tree>, NewickError> {
    let mut trees = Vec::new();
    for line in input.lines() {
        parse_line(line, &mut trees)?;
    }
    debug!("parsed {} Newick tree(s)", trees.len());
    Ok(trees)
}

/// Parses input that must contain exactly one tree.
pub fn parse_tree(input: &str) -> Result<Tree, NewickError> {
    let mut trees = parse_str(input)?;
    if trees.len() != 1 {
        return Err(NewickError::TreeCount(trees.len()));
    }
    Ok(trees.remove(0))
}

/// Streaming counterpart of [`parse_str`].
pub fn read_trees<R: BufRead>(reader: R) -> Result<Vec<Tree>, NewickError> {
    let mut trees = Vec::new();
    for line in reader.lines() {
        parse_line(&line?, &mut trees)?;
    }
    debug!("read {} Newick tree(s)", trees.len());
    Ok(trees)
}

fn parse_line(line: &str, trees: &mut Vec<Tree>) -> Result<(), NewickError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    for chunk in line.split(';') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let mut tree = Tree::new();
        parse_clades(&mut tree, chunk)?;
        trees.push(tree);
    }
    Ok(())
}

/// Builds the clades of one tree from `span` in a single left-to-right scan.
///
/// Clades are created in pre-order, so ids follow the canonical order. Open
/// internal clades are kept on an explicit stack and nesting depth is limited
/// only by memory.
fn parse_clades(tree: &mut Tree, span: &str) -> Result<(), NewickError> {
    check_brackets(span)?;
    let unbalanced = || NewickError::UnbalancedBrackets(span.to_owned());

    let bytes = span.as_bytes();
    let mut open: Vec<CladeId> = Vec::new();
    let mut current = tree.root();
    let mut pos = 0;

    loop {
        // Start of `current`: an opening bracket or a leaf label.
        let end = label_end(bytes, pos);
        let text = span[pos..end].trim();
        if bytes.get(end) == Some(&b'(') {
            if !text.is_empty() {
                return Err(NewickError::UnexpectedText(text.to_owned()));
            }
            open.push(current);
            current = tree.push_child(current);
            pos = end + 1;
            continue;
        }
        if text.is_empty() {
            return Err(NewickError::EmptyClade);
        }
        let (name, length) = split_label(text)?;
        let clade = &mut tree[current];
        clade.name = name;
        clade.set_length(length);
        pos = end;

        // Close finished clades until a sibling starts or the input ends.
        loop {
            match bytes.get(pos) {
                None if open.is_empty() => return Ok(()),
                None => return Err(unbalanced()),
                Some(b',') => {
                    let parent = *open.last().ok_or_else(unbalanced)?;
                    current = tree.push_child(parent);
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let closed = open.pop().ok_or_else(unbalanced)?;
                    let end = label_end(bytes, pos + 1);
                    if bytes.get(end) == Some(&b'(') {
                        return Err(unbalanced());
                    }
                    let (support, length) = split_label(&span[pos + 1..end])?;
                    let clade = &mut tree[closed];
                    clade.support = support;
                    clade.set_length(length);
                    pos = end;
                }
            }
        }
    }
}

/// Rejects spans whose brackets do not pair up.
fn check_brackets(span: &str) -> Result<(), NewickError> {
    let mut level: usize = 0;
    for byte in span.bytes() {
        match byte {
            b'(' => level += 1,
            b')' => {
                level = level
                    .checked_sub(1)
                    .ok_or_else(|| NewickError::UnbalancedBrackets(span.to_owned()))?;
            }
            _ => {}
        }
    }
    if level != 0 {
        return Err(NewickError::UnbalancedBrackets(span.to_owned()));
    }
    Ok(())
}

/// Index of the next bracket or comma at or after `start`.
fn label_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| matches!(b, b'(' | b')' | b','))
        .map_or(bytes.len(), |offset| start + offset)
}

/// Splits `label:length` on the last colon.
fn split_label(text: &str) -> Result<(Option<String>, Option<f64>), NewickError> {
    let text = text.trim();
    let (label, length) = match text.rfind(':') {
        Some(colon) => {
            let length_text = text[colon + 1..].trim();
            let length = length_text
                .parse::<f64>()
                .map_err(|source| NewickError::InvalidLength {
                    text: length_text.to_owned(),
                    source,
                })?;
            (text[..colon].trim(), Some(length))
        }
        None => (text, None),
    };

    let label = (!label.is_empty()).then(|| label.to_owned());
    Ok((label, length))
}
