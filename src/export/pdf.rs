use std::f32::consts::TAU;

use log::debug;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color as PdfColor, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point as PdfPoint, Polygon, Pt, Rgb, TextMatrix,
};

use super::{ExportError, ExportOptions};
use crate::render::{
    draw_tree, DrawSink, Point, Rect, RenderError, ScaleBar, Size, Stroke, TextAlign, TextRun,
};
use crate::style::{BranchDecorationStyle, Color};
use crate::tree::{CladeId, Tree};

const CIRCLE_SEGMENTS: usize = 24;

/// Draws `tree` onto a single PDF page.
pub fn render_pdf(tree: &Tree, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let mut sink = PdfSink::new(&options.title, options.background);
    draw_tree(tree, &options.draw, &mut sink)?;
    Ok(sink.into_bytes().ok_or(RenderError::NotStarted("pdf"))?)
}

/// Scene pixels (96 dpi) to millimetres.
fn px_to_mm(px: f32) -> f32 {
    px * 25.4 / 96.0
}

fn px_to_pt(px: f32) -> f32 {
    px * 72.0 / 96.0
}

/// Paginated sink writing straight into a printpdf page.
pub struct PdfSink {
    title: String,
    background: Color,
    page: Option<PdfPage>,
    bytes: Option<Vec<u8>>,
}

struct PdfPage {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    height_px: f32,
    background: Color,
}

impl PdfSink {
    pub fn new(title: &str, background: Color) -> Self {
        Self {
            title: title.to_owned(),
            background,
            page: None,
            bytes: None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl DrawSink for PdfSink {
    fn init_document(&mut self) -> Result<(), RenderError> {
        self.page = None;
        self.bytes = None;
        Ok(())
    }

    fn begin_tree(&mut self, size: Size, _tree: &Tree) -> Result<(), RenderError> {
        let width_mm = px_to_mm(size.width);
        let height_mm = px_to_mm(size.height);
        let (doc, page, layer) =
            PdfDocument::new(self.title.as_str(), Mm(width_mm), Mm(height_mm), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| RenderError::Pdf(err.to_string()))?;

        let page = PdfPage {
            doc,
            layer,
            font,
            height_px: size.height,
            background: self.background,
        };
        page.draw_background(size);
        self.page = Some(page);
        Ok(())
    }

    fn draw_shade(&mut self, _clade: CladeId, area: Rect, color: Color) {
        if let Some(page) = &self.page {
            page.polygon(&area.corners(), Some(color), None);
        }
    }

    fn draw_collapsed_triangle(
        &mut self,
        _clade: CladeId,
        triangle: [Point; 3],
        _leaves: usize,
        fill: Color,
        stroke: Stroke,
    ) {
        if let Some(page) = &self.page {
            page.polygon(&triangle, Some(fill), Some(stroke));
        }
    }

    fn draw_leaf_label(&mut self, _clade: CladeId, label: &TextRun) {
        if let Some(page) = &self.page {
            page.text(label);
        }
    }

    fn draw_node_value(&mut self, _clade: CladeId, label: &TextRun) {
        if let Some(page) = &self.page {
            page.text(label);
        }
    }

    fn draw_branch_value(&mut self, _clade: CladeId, label: &TextRun) {
        if let Some(page) = &self.page {
            page.text(label);
        }
    }

    fn draw_clade_label(
        &mut self,
        _clade: CladeId,
        bracket: [Point; 2],
        stroke: Stroke,
        label: &TextRun,
    ) {
        if let Some(page) = &self.page {
            page.polyline(&bracket, stroke);
            page.text(label);
        }
    }

    fn draw_horizontal_branch(&mut self, _clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        if let Some(page) = &self.page {
            page.polyline(&[from, to], stroke);
        }
    }

    fn draw_vertical_branch(&mut self, _clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        if let Some(page) = &self.page {
            page.polyline(&[from, to], stroke);
        }
    }

    fn draw_branch_decoration(
        &mut self,
        _clade: CladeId,
        _index: usize,
        center: Point,
        decoration: &BranchDecorationStyle,
    ) {
        let Some(page) = &self.page else {
            return;
        };
        let outline: Vec<Point> = if decoration.shape.is_circle() {
            let radius = decoration.size * 0.5;
            (0..CIRCLE_SEGMENTS)
                .map(|i| {
                    let angle = TAU * i as f32 / CIRCLE_SEGMENTS as f32;
                    Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
                })
                .collect()
        } else {
            Rect::from_center(center, decoration.size).corners().to_vec()
        };

        if decoration.shape.is_filled() {
            page.polygon(&outline, Some(decoration.color), None);
        } else {
            page.polygon(
                &outline,
                Some(page.background),
                Some(Stroke {
                    width: 1.0,
                    color: decoration.color,
                }),
            );
        }
    }

    fn on_clade_drawn(&mut self, _clade: CladeId) {}

    fn draw_scalebar(&mut self, scale_bar: &ScaleBar) {
        if let Some(page) = &self.page {
            page.polyline(&[scale_bar.from, scale_bar.to], scale_bar.stroke);
            page.text(&scale_bar.label);
        }
    }

    fn finish_document(&mut self) -> Result<(), RenderError> {
        let page = self.page.take().ok_or(RenderError::NotStarted("pdf"))?;
        let bytes = page
            .doc
            .save_to_bytes()
            .map_err(|err| RenderError::Pdf(err.to_string()))?;
        debug!("PDF document is {} bytes", bytes.len());
        self.bytes = Some(bytes);
        Ok(())
    }
}

impl PdfPage {
    fn point(&self, p: Point) -> PdfPoint {
        PdfPoint::new(Mm(px_to_mm(p.x)), Mm(px_to_mm(convert_y(p.y, self.height_px))))
    }

    /// PDF has no alpha here, so translucent colours are flattened onto the
    /// page background.
    fn color(&self, color: Color) -> PdfColor {
        let [r, g, b] = color.blend_over(self.background).to_unit_rgb();
        PdfColor::Rgb(Rgb::new(r, g, b, None))
    }

    fn draw_background(&self, size: Size) {
        let area = Rect::from_two_points(Point::new(0.0, 0.0), Point::new(size.width, size.height));
        self.polygon(&area.corners(), Some(self.background), None);
    }

    fn polygon(&self, points: &[Point], fill: Option<Color>, stroke: Option<Stroke>) {
        if points.len() < 3 {
            return;
        }
        let mode = match (fill, stroke) {
            (Some(_), Some(_)) => PaintMode::FillStroke,
            (Some(_), None) => PaintMode::Fill,
            (None, Some(_)) => PaintMode::Stroke,
            (None, None) => return,
        };
        if let Some(color) = fill {
            self.layer.set_fill_color(self.color(color));
        }
        if let Some(stroke) = stroke {
            self.set_stroke(stroke);
        }

        let mut polygon = Polygon::default();
        polygon.mode = mode;
        polygon
            .rings
            .push(points.iter().map(|&p| (self.point(p), false)).collect());
        self.layer.add_polygon(polygon);
    }

    fn polyline(&self, points: &[Point], stroke: Stroke) {
        if points.len() < 2 {
            return;
        }
        self.set_stroke(stroke);
        self.layer.add_line(Line {
            points: points.iter().map(|&p| (self.point(p), false)).collect(),
            is_closed: false,
        });
    }

    fn set_stroke(&self, stroke: Stroke) {
        self.layer.set_outline_color(self.color(stroke.color));
        self.layer.set_outline_thickness(px_to_pt(stroke.width));
    }

    fn text(&self, run: &TextRun) {
        if run.text.is_empty() {
            return;
        }
        let shift = match run.align {
            TextAlign::Start => 0.0,
            TextAlign::Middle => run.estimated_width() * 0.5,
            TextAlign::End => run.estimated_width(),
        };
        let x_pt = px_to_pt(run.anchor.x - shift);
        let baseline = run.anchor.y + run.font_size * 0.35;
        let y_pt = px_to_pt(convert_y(baseline, self.height_px));

        self.layer.begin_text_section();
        self.layer.set_font(&self.font, px_to_pt(run.font_size));
        self.layer.set_fill_color(self.color(run.color));
        self.layer
            .set_text_matrix(TextMatrix::Translate(Pt(x_pt), Pt(y_pt)));
        self.layer.write_text(run.text.as_str(), &self.font);
        self.layer.end_text_section();
    }
}

/// Scene y grows downwards, PDF y upwards.
fn convert_y(y: f32, page_height: f32) -> f32 {
    page_height - y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_tree;
    use crate::style::{CladeLabel, DecorationShape};

    #[test]
    fn produces_a_pdf_document() {
        let mut tree = parse_tree("((A:1,B:2)100:1,C:3);").unwrap();
        let inner = tree[tree.root()].children()[0];
        tree[inner].style.shade = Some(Color::from_rgba(255, 0, 0, 80));
        tree[inner].style.label = Some(CladeLabel::new("AB", Color::BLACK));
        tree.style.scale_bar.visible = true;
        tree.style.decorations = vec![BranchDecorationStyle::new(
            Some("100"),
            DecorationShape::OpenCircle,
            5.0,
            Color::BLACK,
        )];

        let bytes = render_pdf(&tree, &ExportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn finishing_before_begin_is_an_error() {
        let mut sink = PdfSink::new("test", Color::WHITE);
        sink.init_document().unwrap();
        assert!(matches!(
            sink.finish_document(),
            Err(RenderError::NotStarted("pdf"))
        ));
        assert!(sink.bytes().is_none());
    }

    #[test]
    fn y_axis_is_flipped() {
        assert_eq!(convert_y(10.0, 100.0), 90.0);
        assert!((px_to_mm(96.0) - 25.4).abs() < 1e-4);
    }
}
