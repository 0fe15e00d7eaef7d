use log::debug;

use super::{DrawSink, Point, Rect, RenderError, ScaleBar, Size, Stroke, TextRun};
use crate::style::{BranchDecorationStyle, Color};
use crate::tree::{CladeId, Tree};

pub const SHADES: &str = "shades";
pub const COLLAPSED: &str = "collapsed";
pub const BRANCHES: &str = "branches";
pub const LEAF_LABELS: &str = "leaf-labels";
pub const NODE_VALUES: &str = "node-values";
pub const BRANCH_VALUES: &str = "branch-values";
pub const CLADE_LABELS: &str = "clade-labels";
pub const DECORATIONS: &str = "decorations";
pub const SCALE_BAR: &str = "scale-bar";

/// Groups in paint order.
pub const GROUP_ORDER: [&str; 9] = [
    SHADES,
    COLLAPSED,
    BRANCHES,
    DECORATIONS,
    LEAF_LABELS,
    NODE_VALUES,
    BRANCH_VALUES,
    CLADE_LABELS,
    SCALE_BAR,
];

#[derive(Debug, Clone, PartialEq)]
pub enum ScenePrimitive {
    Rect {
        rect: Rect,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Circle {
        center: Point,
        radius: f32,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Polygon {
        points: Vec<Point>,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Line {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    Polyline {
        points: Vec<Point>,
        stroke: Stroke,
    },
    Text(TextRun),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneItem {
    pub id: String,
    pub primitive: ScenePrimitive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneGroup {
    pub id: &'static str,
    pub items: Vec<SceneItem>,
}

/// Backend-neutral drawing of one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub size: Size,
    pub background: Color,
    pub groups: Vec<SceneGroup>,
    /// Clades in the order they were drawn.
    pub clades: Vec<CladeId>,
}

impl SceneGraph {
    pub fn new(size: Size, background: Color) -> Self {
        Self {
            size,
            background,
            groups: GROUP_ORDER
                .iter()
                .map(|&id| SceneGroup {
                    id,
                    items: Vec::new(),
                })
                .collect(),
            clades: Vec::new(),
        }
    }

    pub fn group(&self, id: &str) -> Option<&SceneGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&SceneItem> {
        self.groups
            .iter()
            .flat_map(|group| group.items.iter())
            .find(|item| item.id == id)
    }

    /// All items in paint order.
    pub fn items(&self) -> impl Iterator<Item = &SceneItem> {
        self.groups.iter().flat_map(|group| group.items.iter())
    }

    fn push(&mut self, group: &str, id: String, primitive: ScenePrimitive) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group) {
            group.items.push(SceneItem { id, primitive });
        }
    }
}

/// Vector sink collecting drawing calls into a [`SceneGraph`].
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    background: Color,
    scene: Option<SceneGraph>,
}

impl SceneBuilder {
    pub fn new(background: Color) -> Self {
        Self {
            background,
            scene: None,
        }
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        self.scene.as_ref()
    }

    pub fn into_scene(self) -> Option<SceneGraph> {
        self.scene
    }

    fn push(&mut self, group: &str, id: String, primitive: ScenePrimitive) {
        if let Some(scene) = self.scene.as_mut() {
            scene.push(group, id, primitive);
        }
    }
}

impl DrawSink for SceneBuilder {
    fn init_document(&mut self) -> Result<(), RenderError> {
        self.scene = None;
        Ok(())
    }

    fn begin_tree(&mut self, size: Size, _tree: &Tree) -> Result<(), RenderError> {
        self.scene = Some(SceneGraph::new(size, self.background));
        Ok(())
    }

    fn draw_shade(&mut self, clade: CladeId, area: Rect, color: Color) {
        self.push(
            SHADES,
            format!("shade-{clade}"),
            ScenePrimitive::Rect {
                rect: area,
                fill: Some(color),
                stroke: None,
            },
        );
    }

    fn draw_collapsed_triangle(
        &mut self,
        clade: CladeId,
        triangle: [Point; 3],
        _leaves: usize,
        fill: Color,
        stroke: Stroke,
    ) {
        self.push(
            COLLAPSED,
            format!("collapsed-{clade}"),
            ScenePrimitive::Polygon {
                points: triangle.to_vec(),
                fill: Some(fill),
                stroke: Some(stroke),
            },
        );
    }

    fn draw_leaf_label(&mut self, clade: CladeId, label: &TextRun) {
        self.push(
            LEAF_LABELS,
            format!("leaf-label-{clade}"),
            ScenePrimitive::Text(label.clone()),
        );
    }

    fn draw_node_value(&mut self, clade: CladeId, label: &TextRun) {
        self.push(
            NODE_VALUES,
            format!("node-value-{clade}"),
            ScenePrimitive::Text(label.clone()),
        );
    }

    fn draw_branch_value(&mut self, clade: CladeId, label: &TextRun) {
        self.push(
            BRANCH_VALUES,
            format!("branch-value-{clade}"),
            ScenePrimitive::Text(label.clone()),
        );
    }

    fn draw_clade_label(
        &mut self,
        clade: CladeId,
        bracket: [Point; 2],
        stroke: Stroke,
        label: &TextRun,
    ) {
        let [top, bottom] = bracket;
        let tick = 4.0;
        self.push(
            CLADE_LABELS,
            format!("clade-bracket-{clade}"),
            ScenePrimitive::Polyline {
                points: vec![
                    Point::new(top.x - tick, top.y),
                    top,
                    bottom,
                    Point::new(bottom.x - tick, bottom.y),
                ],
                stroke,
            },
        );
        self.push(
            CLADE_LABELS,
            format!("clade-label-{clade}"),
            ScenePrimitive::Text(label.clone()),
        );
    }

    fn draw_horizontal_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        self.push(
            BRANCHES,
            format!("branch-h-{clade}"),
            ScenePrimitive::Line { from, to, stroke },
        );
    }

    fn draw_vertical_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        self.push(
            BRANCHES,
            format!("branch-v-{clade}"),
            ScenePrimitive::Line { from, to, stroke },
        );
    }

    fn draw_branch_decoration(
        &mut self,
        clade: CladeId,
        index: usize,
        center: Point,
        decoration: &BranchDecorationStyle,
    ) {
        let (fill, stroke) = if decoration.shape.is_filled() {
            (Some(decoration.color), None)
        } else {
            (
                Some(self.background),
                Some(Stroke {
                    width: 1.0,
                    color: decoration.color,
                }),
            )
        };
        let primitive = if decoration.shape.is_circle() {
            ScenePrimitive::Circle {
                center,
                radius: decoration.size * 0.5,
                fill,
                stroke,
            }
        } else {
            ScenePrimitive::Rect {
                rect: Rect::from_center(center, decoration.size),
                fill,
                stroke,
            }
        };
        self.push(DECORATIONS, format!("decoration-{clade}-{index}"), primitive);
    }

    fn on_clade_drawn(&mut self, clade: CladeId) {
        if let Some(scene) = self.scene.as_mut() {
            scene.clades.push(clade);
        }
    }

    fn draw_scalebar(&mut self, scale_bar: &ScaleBar) {
        let tick = 4.0;
        self.push(
            SCALE_BAR,
            "scale-bar-line".to_owned(),
            ScenePrimitive::Line {
                from: scale_bar.from,
                to: scale_bar.to,
                stroke: scale_bar.stroke,
            },
        );
        for (suffix, end) in [("start", scale_bar.from), ("end", scale_bar.to)] {
            self.push(
                SCALE_BAR,
                format!("scale-bar-tick-{suffix}"),
                ScenePrimitive::Line {
                    from: Point::new(end.x, end.y - tick),
                    to: Point::new(end.x, end.y + tick),
                    stroke: scale_bar.stroke,
                },
            );
        }
        self.push(
            SCALE_BAR,
            "scale-bar-label".to_owned(),
            ScenePrimitive::Text(scale_bar.label.clone()),
        );
    }

    fn finish_document(&mut self) -> Result<(), RenderError> {
        let scene = self.scene.as_ref().ok_or(RenderError::NotStarted("scene"))?;
        debug!(
            "scene {:.0}x{:.0} with {} item(s) for {} clade(s)",
            scene.size.width,
            scene.size.height,
            scene.items().count(),
            scene.clades.len()
        );
        Ok(())
    }
}
