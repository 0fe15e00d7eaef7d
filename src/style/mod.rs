//! Rendering attributes for whole trees and individual clades.
//!
//! Styles are plain values: they carry no reference to the tree structure, so
//! the project container can store them as a flat list beside the Newick text.

use serde::{Deserialize, Serialize};

mod color;
mod decoration;

pub use color::Color;
pub use decoration::{BranchDecorationStyle, DecorationShape};

/// Per-clade rendering attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CladeStyle {
    pub branch_color: Option<Color>,
    pub leaf_color: Option<Color>,
    pub collapsed: bool,
    pub label: Option<CladeLabel>,
    pub shade: Option<Color>,
}

/// Text drawn beside a bracket spanning the clade's leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CladeLabel {
    pub text: String,
    #[serde(default)]
    pub color: Color,
}

impl CladeLabel {
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScaleBarStyle {
    pub visible: bool,
    /// Length in branch-length units; `None` picks a round value from the tree depth.
    pub length: Option<f64>,
    pub font_size: f32,
    pub line_width: f32,
    pub color: Color,
}

impl Default for ScaleBarStyle {
    fn default() -> Self {
        Self {
            visible: false,
            length: None,
            font_size: 11.0,
            line_width: 2.0,
            color: Color::BLACK,
        }
    }
}

/// Global rendering parameters for one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeStyle {
    /// Pixels per unit of branch length.
    pub x_scale: f32,
    /// Pixels between neighbouring leaves.
    pub y_scale: f32,
    pub branch_width: f32,
    pub branch_color: Color,
    pub label_color: Color,
    pub leaf_label_font_size: f32,
    pub node_value_font_size: f32,
    pub branch_value_font_size: f32,
    pub clade_label_font_size: f32,
    pub show_leaf_labels: bool,
    pub show_node_values: bool,
    pub show_branch_values: bool,
    pub branch_value_precision: usize,
    pub scale_bar: ScaleBarStyle,
    pub decorations: Vec<BranchDecorationStyle>,
}

impl Default for TreeStyle {
    fn default() -> Self {
        Self {
            x_scale: 100.0,
            y_scale: 20.0,
            branch_width: 1.8,
            branch_color: Color::BLACK,
            label_color: Color::BLACK,
            leaf_label_font_size: 13.0,
            node_value_font_size: 10.0,
            branch_value_font_size: 10.0,
            clade_label_font_size: 13.0,
            show_leaf_labels: true,
            show_node_values: false,
            show_branch_values: false,
            branch_value_precision: 2,
            scale_bar: ScaleBarStyle::default(),
            decorations: Vec::new(),
        }
    }
}
