//! Backend-agnostic drawing of styled trees.
//!
//! [`draw_tree`] computes every piece of geometry and hands finished
//! primitives to a [`DrawSink`]. Sinks only render; they never lay out.

use std::io;

use clap::ValueEnum;
use log::debug;
use thiserror::Error;

use crate::style::{BranchDecorationStyle, Color};
use crate::tree::layout::{nice_tick_span, TreeLayout, DEFAULT_MISSING_LENGTH};
use crate::tree::{Clade, CladeId, Tree};

pub mod scene_graph;

pub use scene_graph::{SceneBuilder, SceneGraph, SceneGroup, SceneItem, ScenePrimitive};

const LABEL_GAP: f32 = 6.0;
const CLADE_LABEL_GAP: f32 = 12.0;
const SCALE_BAR_OFFSET: f32 = 24.0;
const CHAR_WIDTH_FACTOR: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn from_two_points(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_center(center: Point, size: f32) -> Self {
        let half = size * 0.5;
        Self {
            min: Point::new(center.x - half, center.y - half),
            max: Point::new(center.x + half, center.y + half),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Start,
    Middle,
    End,
}

/// A single line of text. `anchor` is the vertical middle of the line at the
/// aligned edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub anchor: Point,
    pub font_size: f32,
    pub color: Color,
    pub align: TextAlign,
}

impl TextRun {
    /// Width estimate for sinks without font metrics.
    pub fn estimated_width(&self) -> f32 {
        estimate_text_width(&self.text, self.font_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    pub from: Point,
    pub to: Point,
    pub stroke: Stroke,
    pub label: TextRun,
}

/// Which branch segments take the clade's own branch colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BranchColouring {
    #[default]
    Both,
    HorizontalOnly,
    VerticalOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawOptions {
    pub branch_colouring: BranchColouring,
    pub margin: f32,
    /// Branch length used for clades without one.
    pub missing_length: f64,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            branch_colouring: BranchColouring::Both,
            margin: 20.0,
            missing_length: DEFAULT_MISSING_LENGTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0} sink received drawing calls before begin_tree")]
    NotStarted(&'static str),
    #[error("PDF backend failed: {0}")]
    Pdf(String),
    #[error("raster backend failed: {0}")]
    Raster(String),
    #[error("failed to write rendered document")]
    Io(#[from] io::Error),
}

/// Receiver of the drawing protocol driven by [`draw_tree`].
///
/// Call order: `init_document`, `begin_tree`, then for every visible clade in
/// canonical order the optional shade, collapsed triangle, leaf label, node
/// value, branch value and clade label, followed by the horizontal branch,
/// the vertical branch (internal clades only), matching decorations and
/// `on_clade_drawn`. Finally the optional scale bar and `finish_document`.
pub trait DrawSink {
    fn init_document(&mut self) -> Result<(), RenderError>;
    fn begin_tree(&mut self, size: Size, tree: &Tree) -> Result<(), RenderError>;
    fn draw_shade(&mut self, clade: CladeId, area: Rect, color: Color);
    fn draw_collapsed_triangle(
        &mut self,
        clade: CladeId,
        triangle: [Point; 3],
        leaves: usize,
        fill: Color,
        stroke: Stroke,
    );
    fn draw_leaf_label(&mut self, clade: CladeId, label: &TextRun);
    fn draw_node_value(&mut self, clade: CladeId, label: &TextRun);
    fn draw_branch_value(&mut self, clade: CladeId, label: &TextRun);
    fn draw_clade_label(
        &mut self,
        clade: CladeId,
        bracket: [Point; 2],
        stroke: Stroke,
        label: &TextRun,
    );
    fn draw_horizontal_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke);
    fn draw_vertical_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke);
    fn draw_branch_decoration(
        &mut self,
        clade: CladeId,
        index: usize,
        center: Point,
        decoration: &BranchDecorationStyle,
    );
    fn on_clade_drawn(&mut self, clade: CladeId);
    fn draw_scalebar(&mut self, scale_bar: &ScaleBar);
    fn finish_document(&mut self) -> Result<(), RenderError>;
}

/// Lays out `tree` as a rectangular phylogram and drives `sink` through the
/// drawing protocol.
pub fn draw_tree<S: DrawSink + ?Sized>(
    tree: &Tree,
    options: &DrawOptions,
    sink: &mut S,
) -> Result<(), RenderError> {
    let layout = TreeLayout::rectangular(tree, options.missing_length);
    let geometry = Geometry::new(tree, &layout, options);
    debug!(
        "drawing {} visible clade(s) on a {:.0}x{:.0} canvas",
        layout.visible.len(),
        geometry.size.width,
        geometry.size.height
    );

    sink.init_document()?;
    sink.begin_tree(geometry.size, tree)?;

    for &id in &layout.visible {
        draw_clade(tree, &layout, &geometry, options, id, sink);
    }

    if let Some(scale_bar) = scale_bar(tree, &layout, &geometry) {
        sink.draw_scalebar(&scale_bar);
    }

    sink.finish_document()
}

/// Pixel mapping of a layout.
struct Geometry {
    size: Size,
    margin: f32,
    x_scale: f32,
    y_scale: f32,
    tree_height: f32,
    label_edge: f32,
    bracket_x: f32,
}

impl Geometry {
    fn new(tree: &Tree, layout: &TreeLayout, options: &DrawOptions) -> Self {
        let style = &tree.style;
        let margin = options.margin.max(0.0);
        let x_scale = style.x_scale.max(0.0);
        let y_scale = style.y_scale.max(0.0);

        let tree_width = layout.width * x_scale;
        let tree_height = layout.slots.saturating_sub(1) as f32 * y_scale;

        let label_column = if style.show_leaf_labels {
            layout
                .visible
                .iter()
                .filter_map(|&id| tip_label_text(tree, id))
                .map(|text| estimate_text_width(&text, style.leaf_label_font_size))
                .fold(0.0, f32::max)
                + LABEL_GAP
        } else {
            0.0
        };

        let clade_label_column = layout
            .visible
            .iter()
            .filter_map(|&id| tree[id].style.label.as_ref())
            .map(|label| {
                CLADE_LABEL_GAP
                    + LABEL_GAP
                    + estimate_text_width(&label.text, style.clade_label_font_size)
            })
            .fold(0.0, f32::max);

        let scale_bar_height = if style.scale_bar.visible {
            SCALE_BAR_OFFSET + style.scale_bar.font_size * 1.5
        } else {
            0.0
        };

        let label_edge = margin + tree_width + label_column;
        Self {
            size: Size {
                width: label_edge + clade_label_column + margin,
                height: 2.0 * margin + tree_height + scale_bar_height,
            },
            margin,
            x_scale,
            y_scale,
            tree_height,
            label_edge,
            bracket_x: label_edge + CLADE_LABEL_GAP,
        }
    }

    fn to_px(&self, (x, y): (f32, f32)) -> Point {
        Point::new(self.margin + x * self.x_scale, self.margin + y * self.y_scale)
    }

    fn slot_y(&self, slot: f32) -> f32 {
        self.margin + slot * self.y_scale
    }
}

#[derive(Clone, Copy)]
enum Segment {
    Horizontal,
    Vertical,
}

fn branch_stroke(tree: &Tree, clade: &Clade, segment: Segment, options: &DrawOptions) -> Stroke {
    let own_colour = match (options.branch_colouring, segment) {
        (BranchColouring::Both, _)
        | (BranchColouring::HorizontalOnly, Segment::Horizontal)
        | (BranchColouring::VerticalOnly, Segment::Vertical) => clade.style.branch_color,
        _ => None,
    };
    Stroke {
        width: tree.style.branch_width,
        color: own_colour.unwrap_or(tree.style.branch_color),
    }
}

/// Text shown at a tip: the taxon, or for collapsed clades a leaf count when
/// the clade has no name.
fn tip_label_text(tree: &Tree, id: CladeId) -> Option<String> {
    let clade = &tree[id];
    if clade.is_leaf() {
        clade.name.clone()
    } else if clade.style.collapsed {
        Some(
            clade
                .name
                .clone()
                .unwrap_or_else(|| format!("{} leaves", tree.leaf_count(id))),
        )
    } else {
        None
    }
}

fn draw_clade<S: DrawSink + ?Sized>(
    tree: &Tree,
    layout: &TreeLayout,
    geometry: &Geometry,
    options: &DrawOptions,
    id: CladeId,
    sink: &mut S,
) {
    let Some(position) = layout.position(id) else {
        return;
    };
    let style = &tree.style;
    let clade = &tree[id];
    let node = geometry.to_px(position);
    let parent_x = clade
        .parent()
        .and_then(|parent| layout.position(parent))
        .map(|(x, _)| x)
        .unwrap_or(0.0);
    let branch_start = Point::new(geometry.to_px((parent_x, 0.0)).x, node.y);
    let collapsed = clade.style.collapsed && !clade.is_leaf();
    let tip_x = layout
        .collapsed_extent(id)
        .map(|extent| geometry.to_px((extent, 0.0)).x)
        .unwrap_or(node.x);

    if let (Some(color), Some((first, last))) = (clade.style.shade, layout.slot_span(id)) {
        let half = geometry.y_scale * 0.5;
        let area = Rect::from_two_points(
            Point::new(branch_start.x, geometry.slot_y(first) - half),
            Point::new(geometry.label_edge, geometry.slot_y(last) + half),
        );
        sink.draw_shade(id, area, color);
    }

    if collapsed {
        let half = geometry.y_scale * 0.4;
        let fill = clade
            .style
            .leaf_color
            .or(clade.style.branch_color)
            .unwrap_or(style.branch_color)
            .with_alpha(96);
        let triangle = [
            node,
            Point::new(tip_x, node.y - half),
            Point::new(tip_x, node.y + half),
        ];
        sink.draw_collapsed_triangle(
            id,
            triangle,
            tree.leaf_count(id),
            fill,
            branch_stroke(tree, clade, Segment::Horizontal, options),
        );
    }

    if style.show_leaf_labels {
        if let Some(text) = tip_label_text(tree, id) {
            sink.draw_leaf_label(
                id,
                &TextRun {
                    text,
                    anchor: Point::new(tip_x + LABEL_GAP, node.y),
                    font_size: style.leaf_label_font_size,
                    color: clade.style.leaf_color.unwrap_or(style.label_color),
                    align: TextAlign::Start,
                },
            );
        }
    }

    if style.show_node_values && !clade.is_leaf() {
        if let Some(support) = &clade.support {
            sink.draw_node_value(
                id,
                &TextRun {
                    text: support.clone(),
                    anchor: Point::new(node.x - 3.0, node.y - style.node_value_font_size * 0.7),
                    font_size: style.node_value_font_size,
                    color: style.label_color,
                    align: TextAlign::End,
                },
            );
        }
    }

    if style.show_branch_values && clade.parent().is_some() {
        if let Some(length) = clade.length() {
            let middle = branch_start.midpoint(node);
            sink.draw_branch_value(
                id,
                &TextRun {
                    text: format!("{:.*}", style.branch_value_precision, length),
                    anchor: Point::new(middle.x, middle.y - style.branch_value_font_size * 0.7),
                    font_size: style.branch_value_font_size,
                    color: style.label_color,
                    align: TextAlign::Middle,
                },
            );
        }
    }

    if let (Some(label), Some((first, last))) = (&clade.style.label, layout.slot_span(id)) {
        let reach = geometry.y_scale * 0.3;
        let top = Point::new(geometry.bracket_x, geometry.slot_y(first) - reach);
        let bottom = Point::new(geometry.bracket_x, geometry.slot_y(last) + reach);
        sink.draw_clade_label(
            id,
            [top, bottom],
            Stroke {
                width: 1.5,
                color: label.color,
            },
            &TextRun {
                text: label.text.clone(),
                anchor: Point::new(geometry.bracket_x + LABEL_GAP, top.midpoint(bottom).y),
                font_size: style.clade_label_font_size,
                color: label.color,
                align: TextAlign::Start,
            },
        );
    }

    sink.draw_horizontal_branch(
        id,
        branch_start,
        node,
        branch_stroke(tree, clade, Segment::Horizontal, options),
    );

    if !clade.is_leaf() && !collapsed {
        let child_ys = clade
            .children()
            .iter()
            .filter_map(|&child| layout.position(child))
            .map(|(_, y)| y);
        let (first, last) = child_ys.fold((f32::MAX, f32::MIN), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });
        if first <= last {
            sink.draw_vertical_branch(
                id,
                Point::new(node.x, geometry.slot_y(first)),
                Point::new(node.x, geometry.slot_y(last)),
                branch_stroke(tree, clade, Segment::Vertical, options),
            );
        }
    }

    if let Some(text) = clade.decoration_text() {
        let center = branch_start.midpoint(node);
        for (index, decoration) in style.decorations.iter().enumerate() {
            if decoration.is_match(text) {
                sink.draw_branch_decoration(id, index, center, decoration);
            }
        }
    }

    sink.on_clade_drawn(id);
}

fn scale_bar(tree: &Tree, layout: &TreeLayout, geometry: &Geometry) -> Option<ScaleBar> {
    let bar_style = &tree.style.scale_bar;
    if !bar_style.visible {
        return None;
    }

    let length = bar_style
        .length
        .map(|length| length as f32)
        .or_else(|| nice_tick_span(layout.width))
        .filter(|length| *length > 0.0)?;

    let baseline_y = geometry.margin + geometry.tree_height + SCALE_BAR_OFFSET;
    let from = Point::new(geometry.margin, baseline_y);
    let to = Point::new(geometry.margin + length * geometry.x_scale, baseline_y);

    Some(ScaleBar {
        from,
        to,
        stroke: Stroke {
            width: bar_style.line_width,
            color: bar_style.color,
        },
        label: TextRun {
            text: format!("{length}"),
            anchor: Point::new(from.midpoint(to).x, baseline_y + bar_style.font_size * 0.9),
            font_size: bar_style.font_size,
            color: bar_style.color,
            align: TextAlign::Middle,
        },
    })
}

fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * CHAR_WIDTH_FACTOR
}
