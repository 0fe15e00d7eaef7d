use font_kit::family_name::FamilyName;
use font_kit::properties::Properties;
use font_kit::source::SystemSource;
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use log::{debug, warn};
use tiny_skia::{FillRule, LineCap, Paint, Path, PathBuilder, Pixmap, Transform};

use super::{ExportError, ExportOptions};
use crate::render::{
    draw_tree, DrawSink, Point, Rect, RenderError, ScaleBar, SceneBuilder, SceneGraph,
    ScenePrimitive, Size, Stroke, TextAlign, TextRun,
};
use crate::style::{BranchDecorationStyle, Color};
use crate::tree::{CladeId, Tree};

#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Output pixels per scene unit, clamped to `0.05..=8.0`.
    pub scale: f32,
    /// TrueType/OpenType bytes used for labels. When absent, the system sans-serif
    /// font is used; text is skipped only if none can be found.
    pub font_data: Option<Vec<u8>>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            font_data: None,
        }
    }
}

/// Draws `tree` and encodes the result as PNG.
pub fn render_png(tree: &Tree, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let mut sink = RasterSink::new(options.background, &options.raster)?;
    draw_tree(tree, &options.draw, &mut sink)?;
    Ok(sink
        .into_png()
        .ok_or(RenderError::NotStarted("raster"))?)
}

/// Raster sink: collects the scene like [`SceneBuilder`] and rasterizes it
/// with tiny-skia when the document is finished.
pub struct RasterSink {
    scene: SceneBuilder,
    renderer: SkiaSceneRenderer,
    png: Option<Vec<u8>>,
}

impl RasterSink {
    pub fn new(background: Color, options: &RasterOptions) -> Result<Self, RenderError> {
        Ok(Self {
            scene: SceneBuilder::new(background),
            renderer: SkiaSceneRenderer::new(options)?,
            png: None,
        })
    }

    pub fn png(&self) -> Option<&[u8]> {
        self.png.as_deref()
    }

    pub fn into_png(self) -> Option<Vec<u8>> {
        self.png
    }
}

impl DrawSink for RasterSink {
    fn init_document(&mut self) -> Result<(), RenderError> {
        self.png = None;
        self.scene.init_document()
    }

    fn begin_tree(&mut self, size: Size, tree: &Tree) -> Result<(), RenderError> {
        self.scene.begin_tree(size, tree)
    }

    fn draw_shade(&mut self, clade: CladeId, area: Rect, color: Color) {
        self.scene.draw_shade(clade, area, color);
    }

    fn draw_collapsed_triangle(
        &mut self,
        clade: CladeId,
        triangle: [Point; 3],
        leaves: usize,
        fill: Color,
        stroke: Stroke,
    ) {
        self.scene
            .draw_collapsed_triangle(clade, triangle, leaves, fill, stroke);
    }

    fn draw_leaf_label(&mut self, clade: CladeId, label: &TextRun) {
        self.scene.draw_leaf_label(clade, label);
    }

    fn draw_node_value(&mut self, clade: CladeId, label: &TextRun) {
        self.scene.draw_node_value(clade, label);
    }

    fn draw_branch_value(&mut self, clade: CladeId, label: &TextRun) {
        self.scene.draw_branch_value(clade, label);
    }

    fn draw_clade_label(
        &mut self,
        clade: CladeId,
        bracket: [Point; 2],
        stroke: Stroke,
        label: &TextRun,
    ) {
        self.scene.draw_clade_label(clade, bracket, stroke, label);
    }

    fn draw_horizontal_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        self.scene.draw_horizontal_branch(clade, from, to, stroke);
    }

    fn draw_vertical_branch(&mut self, clade: CladeId, from: Point, to: Point, stroke: Stroke) {
        self.scene.draw_vertical_branch(clade, from, to, stroke);
    }

    fn draw_branch_decoration(
        &mut self,
        clade: CladeId,
        index: usize,
        center: Point,
        decoration: &BranchDecorationStyle,
    ) {
        self.scene
            .draw_branch_decoration(clade, index, center, decoration);
    }

    fn on_clade_drawn(&mut self, clade: CladeId) {
        self.scene.on_clade_drawn(clade);
    }

    fn draw_scalebar(&mut self, scale_bar: &ScaleBar) {
        self.scene.draw_scalebar(scale_bar);
    }

    fn finish_document(&mut self) -> Result<(), RenderError> {
        self.scene.finish_document()?;
        let scene = self.scene.scene().ok_or(RenderError::NotStarted("raster"))?;
        let pixmap = self.renderer.render(scene)?;
        let png = pixmap
            .encode_png()
            .map_err(|err| RenderError::Raster(format!("PNG encoding failed: {err}")))?;
        debug!(
            "rasterized {}x{} px into {} PNG bytes",
            pixmap.width(),
            pixmap.height(),
            png.len()
        );
        self.png = Some(png);
        Ok(())
    }
}

struct SkiaSceneRenderer {
    text_font: Option<Font>,
    scale: f32,
}

impl SkiaSceneRenderer {
    fn new(options: &RasterOptions) -> Result<Self, RenderError> {
        let text_font = match &options.font_data {
            Some(bytes) => Some(
                Font::from_bytes(bytes.as_slice(), FontSettings::default())
                    .map_err(|err| RenderError::Raster(format!("invalid font data: {err}")))?,
            ),
            None => {
                let font = load_system_sans_font();
                if font.is_none() {
                    warn!("no system sans-serif font found; raster labels will be skipped");
                }
                font
            }
        };
        Ok(Self {
            text_font,
            scale: options.scale.clamp(0.05, 8.0),
        })
    }

    fn render(&self, scene: &SceneGraph) -> Result<Pixmap, RenderError> {
        let width_px = (scene.size.width * self.scale).round().max(1.0) as u32;
        let height_px = (scene.size.height * self.scale).round().max(1.0) as u32;

        let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
            RenderError::Raster(format!("cannot allocate a {width_px}x{height_px} pixmap"))
        })?;
        pixmap.fill(to_skia_color(scene.background));

        for item in scene.items() {
            render_primitive(
                &mut pixmap,
                &item.primitive,
                self.scale,
                self.text_font.as_ref(),
            );
        }
        Ok(pixmap)
    }
}

fn load_system_sans_font() -> Option<Font> {
    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .ok()?;
    let font = handle.load().ok()?;
    let font_data = font.copy_font_data()?;
    Font::from_bytes(font_data.as_slice(), FontSettings::default()).ok()
}

fn render_primitive(
    pixmap: &mut Pixmap,
    primitive: &ScenePrimitive,
    ppp: f32,
    text_font: Option<&Font>,
) {
    match primitive {
        ScenePrimitive::Rect { rect, fill, stroke } => {
            if let Some(path) = polygon_path(&rect.corners(), ppp, true) {
                fill_and_stroke(pixmap, &path, *fill, *stroke, ppp);
            }
        }
        ScenePrimitive::Circle {
            center,
            radius,
            fill,
            stroke,
        } => {
            let mut pb = PathBuilder::new();
            pb.push_circle(center.x * ppp, center.y * ppp, (radius * ppp).max(0.5));
            if let Some(path) = pb.finish() {
                fill_and_stroke(pixmap, &path, *fill, *stroke, ppp);
            }
        }
        ScenePrimitive::Polygon {
            points,
            fill,
            stroke,
        } => {
            if points.len() < 3 {
                return;
            }
            if let Some(path) = polygon_path(points, ppp, true) {
                fill_and_stroke(pixmap, &path, *fill, *stroke, ppp);
            }
        }
        ScenePrimitive::Line { from, to, stroke } => {
            if let Some(path) = polygon_path(&[*from, *to], ppp, false) {
                stroke_path(pixmap, &path, *stroke, ppp);
            }
        }
        ScenePrimitive::Polyline { points, stroke } => {
            if points.len() < 2 {
                return;
            }
            if let Some(path) = polygon_path(points, ppp, false) {
                stroke_path(pixmap, &path, *stroke, ppp);
            }
        }
        ScenePrimitive::Text(run) => {
            let Some(font) = text_font else {
                return;
            };
            render_text(pixmap, font, run, ppp);
        }
    }
}

fn polygon_path(points: &[Point], ppp: f32, close: bool) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x * ppp, first.y * ppp);
    for p in rest {
        pb.line_to(p.x * ppp, p.y * ppp);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

fn fill_and_stroke(
    pixmap: &mut Pixmap,
    path: &Path,
    fill: Option<Color>,
    stroke: Option<Stroke>,
    ppp: f32,
) {
    if let Some(color) = fill {
        let mut paint = Paint::default();
        paint.set_color(to_skia_color(color));
        pixmap.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
    }
    if let Some(stroke) = stroke {
        stroke_path(pixmap, path, stroke, ppp);
    }
}

fn stroke_path(pixmap: &mut Pixmap, path: &Path, style: Stroke, ppp: f32) {
    let mut paint = Paint::default();
    paint.set_color(to_skia_color(style.color));

    let mut stroke = tiny_skia::Stroke::default();
    stroke.width = (style.width * ppp).max(1.0);
    stroke.line_cap = LineCap::Round;

    pixmap.stroke_path(path, &paint, &stroke, Transform::identity(), None);
}

fn to_skia_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

fn render_text(pixmap: &mut Pixmap, font: &Font, run: &TextRun, ppp: f32) {
    if run.text.is_empty() {
        return;
    }

    let px = (run.font_size * ppp).max(6.0);
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings::default());
    layout.append(&[font], &TextStyle::new(&run.text, px, 0));

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for g in layout.glyphs() {
        if g.width == 0 || g.height == 0 {
            continue;
        }
        min_x = min_x.min(g.x);
        min_y = min_y.min(g.y);
        max_x = max_x.max(g.x + g.width as f32);
        max_y = max_y.max(g.y + g.height as f32);
    }
    if !min_x.is_finite() || !min_y.is_finite() {
        return;
    }

    let text_w = (max_x - min_x).max(1.0);
    let text_h = (max_y - min_y).max(1.0);
    let anchor_x = match run.align {
        TextAlign::Start => 0.0,
        TextAlign::Middle => text_w * 0.5,
        TextAlign::End => text_w,
    };
    let origin_x = run.anchor.x * ppp - anchor_x;
    let origin_y = run.anchor.y * ppp - text_h * 0.5;

    let width_px = pixmap.width() as usize;
    let data = pixmap.data_mut();

    for g in layout.glyphs() {
        if g.width == 0 || g.height == 0 {
            continue;
        }
        let (metrics, bitmap) = font.rasterize_config(g.key);
        if metrics.width == 0 || metrics.height == 0 {
            continue;
        }

        let gx = origin_x + g.x - min_x;
        let gy = origin_y + g.y - min_y;
        for y in 0..metrics.height {
            for x in 0..metrics.width {
                let coverage = bitmap[y * metrics.width + x] as f32 / 255.0;
                let src_a = run.color.opacity() * coverage;
                blend_pixel_premultiplied(
                    data,
                    width_px,
                    (gx + x as f32).round() as i32,
                    (gy + y as f32).round() as i32,
                    run.color,
                    src_a,
                );
            }
        }
    }
}

fn blend_pixel_premultiplied(
    data: &mut [u8],
    width: usize,
    x: i32,
    y: i32,
    color: Color,
    src_a: f32,
) {
    if src_a <= 0.0 || x < 0 || y < 0 {
        return;
    }
    let (xu, yu) = (x as usize, y as usize);
    let height = data.len() / (width * 4);
    if xu >= width || yu >= height {
        return;
    }
    let idx = (yu * width + xu) * 4;

    let src = [color.r, color.g, color.b];
    for channel in 0..3 {
        let dst = data[idx + channel] as f32 / 255.0;
        let out = src[channel] as f32 / 255.0 * src_a + dst * (1.0 - src_a);
        data[idx + channel] = (out.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    let dst_a = data[idx + 3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    data[idx + 3] = (out_a.clamp(0.0, 1.0) * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_tree;

    fn png_dimensions(png: &[u8]) -> (u32, u32) {
        let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
        let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
        (width, height)
    }

    #[test]
    fn renders_png_with_default_options() {
        let tree = parse_tree("((A:1,B:2):1,C:3);").unwrap();
        let png = render_png(&tree, &ExportOptions::default()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let (width, height) = png_dimensions(&png);
        assert!(width > 300 && height > 40);
    }

    #[test]
    fn scale_multiplies_pixel_size() {
        let tree = parse_tree("(A:1,B:1);").unwrap();
        let mut options = ExportOptions::default();
        let (w1, h1) = png_dimensions(&render_png(&tree, &options).unwrap());
        options.raster.scale = 2.0;
        let (w2, h2) = png_dimensions(&render_png(&tree, &options).unwrap());
        assert!((w2 as i64 - 2 * w1 as i64).abs() <= 1);
        assert!((h2 as i64 - 2 * h1 as i64).abs() <= 1);
    }

    #[test]
    fn invalid_font_data_is_a_raster_error() {
        let options = RasterOptions {
            font_data: Some(vec![0, 1, 2, 3]),
            ..RasterOptions::default()
        };
        assert!(matches!(
            RasterSink::new(Color::WHITE, &options),
            Err(RenderError::Raster(_))
        ));
    }

    #[test]
    fn branches_are_painted() {
        let tree = parse_tree("(A:1,B:1);").unwrap();
        let mut sink = RasterSink::new(Color::WHITE, &RasterOptions::default()).unwrap();
        draw_tree(&tree, &Default::default(), &mut sink).unwrap();
        let scene = sink.scene.scene().unwrap().clone();
        let pixmap = sink.renderer.render(&scene).unwrap();
        let dark = pixmap
            .pixels()
            .iter()
            .filter(|p| p.red() < 64 && p.alpha() == 255)
            .count();
        assert!(dark > 50);
        assert!(sink.png().is_some());
    }

    #[test]
    fn default_options_draw_label_pixels() {
        if load_system_sans_font().is_none() {
            return;
        }
        let mut labelled = parse_tree("(WWWWWW:1,MMMMMM:1);").unwrap();
        labelled.style.scale_bar.visible = false;
        let mut bare = labelled.clone();
        for id in bare.leaves().collect::<Vec<_>>() {
            bare[id].name = None;
        }

        let ink = |tree: &Tree| {
            let mut sink = RasterSink::new(Color::WHITE, &RasterOptions::default()).unwrap();
            draw_tree(tree, &Default::default(), &mut sink).unwrap();
            let scene = sink.scene.scene().unwrap().clone();
            let pixmap = sink.renderer.render(&scene).unwrap();
            pixmap.pixels().iter().filter(|p| p.red() < 128).count()
        };
        assert!(ink(&labelled) > ink(&bare) + 20);
    }
}
