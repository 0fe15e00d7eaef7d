use svg::node::element::{Circle, Group, Line, Polygon, Polyline, Rectangle, Text};
use svg::node::Node;
use svg::Document;

use super::{ExportError, ExportOptions};
use crate::render::{
    draw_tree, Point, RenderError, SceneBuilder, SceneGraph, ScenePrimitive, Stroke, TextAlign,
    TextRun,
};
use crate::style::Color;
use crate::tree::Tree;

/// Draws `tree` and serializes the scene as an SVG document.
pub fn render_svg(tree: &Tree, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let mut builder = SceneBuilder::new(options.background);
    draw_tree(tree, &options.draw, &mut builder)?;
    let scene = builder
        .into_scene()
        .ok_or(RenderError::NotStarted("scene"))?;

    let mut bytes = Vec::new();
    svg::write(&mut bytes, &scene_to_document(&scene))?;
    Ok(bytes)
}

/// Converts a scene into an SVG document with one `<g>` per scene group.
pub fn scene_to_document(scene: &SceneGraph) -> Document {
    let width = scene.size.width.ceil();
    let height = scene.size.height.ceil();

    let mut document = Document::new()
        .set("width", width)
        .set("height", height)
        .set("viewBox", (0, 0, width as i32, height as i32));

    let background = Rectangle::new()
        .set("width", "100%")
        .set("height", "100%")
        .set("fill", scene.background.to_hex())
        .set("fill-opacity", scene.background.opacity());
    document = document.add(background);

    for group in &scene.groups {
        let mut element = Group::new().set("id", group.id);
        for item in &group.items {
            element = add_primitive(element, &item.id, &item.primitive);
        }
        document = document.add(element);
    }

    document
}

fn add_primitive(group: Group, id: &str, primitive: &ScenePrimitive) -> Group {
    match primitive {
        ScenePrimitive::Rect { rect, fill, stroke } => {
            let mut node = Rectangle::new()
                .set("id", id)
                .set("x", rect.min.x)
                .set("y", rect.min.y)
                .set("width", rect.width())
                .set("height", rect.height());
            paint(&mut node, *fill, *stroke);
            group.add(node)
        }
        ScenePrimitive::Circle {
            center,
            radius,
            fill,
            stroke,
        } => {
            let mut node = Circle::new()
                .set("id", id)
                .set("cx", center.x)
                .set("cy", center.y)
                .set("r", *radius);
            paint(&mut node, *fill, *stroke);
            group.add(node)
        }
        ScenePrimitive::Polygon {
            points,
            fill,
            stroke,
        } => {
            let mut node = Polygon::new()
                .set("id", id)
                .set("points", point_list(points));
            paint(&mut node, *fill, *stroke);
            group.add(node)
        }
        ScenePrimitive::Line { from, to, stroke } => {
            let mut node = Line::new()
                .set("id", id)
                .set("x1", from.x)
                .set("y1", from.y)
                .set("x2", to.x)
                .set("y2", to.y)
                .set("stroke-linecap", "round");
            paint(&mut node, None, Some(*stroke));
            group.add(node)
        }
        ScenePrimitive::Polyline { points, stroke } => {
            let mut node = Polyline::new()
                .set("id", id)
                .set("points", point_list(points));
            paint(&mut node, None, Some(*stroke));
            group.add(node)
        }
        ScenePrimitive::Text(run) => group.add(text_element(id, run)),
    }
}

fn text_element(id: &str, run: &TextRun) -> Text {
    let anchor = match run.align {
        TextAlign::Start => "start",
        TextAlign::Middle => "middle",
        TextAlign::End => "end",
    };
    Text::new("")
        .set("id", id)
        .set("x", run.anchor.x)
        .set("y", run.anchor.y)
        .set("font-family", "Helvetica, Arial, sans-serif")
        .set("font-size", run.font_size)
        .set("fill", run.color.to_hex())
        .set("fill-opacity", run.color.opacity())
        .set("dominant-baseline", "middle")
        .set("text-anchor", anchor)
        .add(svg::node::Text::new(run.text.clone()))
}

fn paint<N: Node>(node: &mut N, fill: Option<Color>, stroke: Option<Stroke>) {
    match fill {
        Some(color) => {
            node.assign("fill", color.to_hex());
            if !color.is_opaque() {
                node.assign("fill-opacity", color.opacity());
            }
        }
        None => node.assign("fill", "none"),
    }
    match stroke {
        Some(stroke) => {
            node.assign("stroke", stroke.color.to_hex());
            node.assign("stroke-width", stroke.width);
            if !stroke.color.is_opaque() {
                node.assign("stroke-opacity", stroke.color.opacity());
            }
        }
        None => node.assign("stroke", "none"),
    }
}

fn point_list(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_tree;
    use crate::style::CladeLabel;

    fn svg_text(tree: &Tree) -> String {
        String::from_utf8(render_svg(tree, &ExportOptions::default()).unwrap()).unwrap()
    }

    #[test]
    fn document_contains_named_groups_and_items() {
        let svg = svg_text(&parse_tree("((A:1,B:2):1,C:3);").unwrap());
        assert!(svg.contains("<svg"));
        for group in ["shades", "branches", "leaf-labels", "scale-bar"] {
            assert!(svg.contains(&format!("id=\"{group}\"")), "missing {group}");
        }
        assert!(svg.contains("id=\"branch-h-0\""));
        assert!(svg.contains("id=\"leaf-label-2\""));
        assert!(svg.contains(">C<"));
    }

    #[test]
    fn shade_colour_and_opacity_are_written() {
        let mut tree = parse_tree("((A,B),C);").unwrap();
        let inner = tree[tree.root()].children()[0];
        tree[inner].style.shade = Some(Color::from_rgba(0, 128, 255, 128));
        tree[inner].style.label = Some(CladeLabel::new("AB", Color::BLACK));
        let svg = svg_text(&tree);

        assert!(svg.contains("id=\"shade-1\""));
        assert!(svg.contains("#0080ff"));
        assert!(svg.contains("fill-opacity"));
        assert!(svg.contains("id=\"clade-bracket-1\""));
    }

    #[test]
    fn label_text_is_escaped() {
        let svg = svg_text(&parse_tree("(A<B,C&D);").unwrap());
        assert!(svg.contains("A&lt;B"));
        assert!(svg.contains("C&amp;D"));
    }
}
