use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use elink_core::{CoordinateConvention, DisplayGeometry, Palette, RenderPort, Rgb};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use string_cache::DefaultAtom as Atom;
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Rect, Transform,
};
use tracing::{trace, warn};

pub const OUTER_RADIUS: f32 = 10.0;
pub const INNER_RADIUS: f32 = 5.0;
const TEXT_SIZE_PX: f32 = 24.0;

/// Reads a TTF/OTF file for status text.
pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|err| anyhow!("invalid font {}: {err}", path.display()))
}

/// Rasterised status lines keyed by their text.
struct TextCache {
    font: FontVec,
    size_px: f32,
    color: Color,
    map: HashMap<Atom, Option<Arc<Pixmap>>>,
}

impl TextCache {
    fn new(font: FontVec, size_px: f32, color: Rgb) -> Self {
        Self {
            font,
            size_px,
            color: Color::from_rgba8(color[0], color[1], color[2], 255),
            map: HashMap::new(),
        }
    }

    fn line_height(&self) -> f32 {
        let sf = self.font.as_scaled(PxScale::from(self.size_px));
        sf.height() + sf.line_gap()
    }

    // None for lines without any visible glyph
    fn get_or_render(&mut self, atom: Atom) -> Option<Arc<Pixmap>> {
        if let Some(p) = self.map.get(&atom) {
            return p.clone();
        }
        let pm = render_text_pixmap(atom.as_ref(), self.size_px, &self.font, self.color).map(Arc::new);
        self.map.insert(atom, pm.clone());
        pm
    }
}

/// Lays out one line of text and rasterises it into a tight, transparent
/// premultiplied pixmap. Returns `None` when nothing would be visible.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontVec, color: Color) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // baseline at ascent
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }
    if min_x == f32::INFINITY {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    let cu = color.to_color_u8();

    for g in &glyphs {
        let Some(out) = font.outline_glyph(g.clone()) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;
            let Some(bg) = dst.get(i).copied() else {
                return;
            };

            let a_lin = (cov * cu.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a_lin * 255.0) as u8;
            let inv = 1.0 - (sa as f32 / 255.0);
            let over = |s: u8, d: u8| ((s as f32 * a_lin) as u8).saturating_add((d as f32 * inv) as u8);

            // premultiplied source over destination
            if let Some(px) = PremultipliedColorU8::from_rgba(
                over(cu.red(), bg.red()),
                over(cu.green(), bg.green()),
                over(cu.blue(), bg.blue()),
                sa.saturating_add((bg.alpha() as f32 * inv) as u8),
            ) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Software renderer for the setup screens: a uniform background with either
/// a two-ring calibration target or centred status text.
///
/// Drawing goes to an offscreen canvas; [`RenderPort::present`] copies only
/// the regions that changed into the front buffer returned by [`frame`].
///
/// [`frame`]: SkiaRenderer::frame
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    convention: CoordinateConvention,
    palette: Palette,
    text_cache: Option<TextCache>,
    warned_no_font: bool,

    canvas: Pixmap,
    front: Vec<u8>,
    clear_buffer: Vec<u8>,
    // content currently on the canvas, cleared by the next draw
    shown: Vec<Rect>,
    // regions not yet copied to the front buffer
    pending: Vec<Rect>,
    first_frame: bool,
}

impl SkiaRenderer {
    pub fn new(
        width: u32,
        height: u32,
        convention: CoordinateConvention,
        palette: Palette,
        font: Option<FontVec>,
    ) -> Result<Self> {
        let canvas = Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        let clear_buffer = Self::background_buffer(&palette.background, width, height);

        Ok(Self {
            width,
            height,
            convention,
            text_cache: font.map(|f| TextCache::new(f, TEXT_SIZE_PX, palette.text)),
            palette,
            warned_no_font: false,
            canvas,
            front: clear_buffer.clone(),
            clear_buffer,
            shown: Vec::with_capacity(16),
            pending: Vec::with_capacity(16),
            first_frame: true,
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.canvas = Pixmap::new(new_width, new_height)
            .ok_or_else(|| anyhow!("invalid canvas size {new_width}x{new_height}"))?;
        self.width = new_width;
        self.height = new_height;
        self.clear_buffer = Self::background_buffer(&self.palette.background, new_width, new_height);
        self.front = self.clear_buffer.clone();
        self.first_frame = true;
        Ok(())
    }

    /// Presented RGBA8 pixels, row-major, `width * height * 4` bytes.
    pub fn frame(&self) -> &[u8] {
        &self.front
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn background_buffer(rgb: &Rgb, width: u32, height: u32) -> Vec<u8> {
        [rgb[0], rgb[1], rgb[2], 255]
            .into_iter()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    fn full_rect(&self) -> Option<Rect> {
        Rect::from_xywh(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Wipes what the previous draw left on the canvas.
    fn begin_draw(&mut self) {
        if self.first_frame {
            self.first_frame = false;
            self.canvas.data_mut().copy_from_slice(&self.clear_buffer);
            self.shown.clear();
            self.pending.clear();
            let full = self.full_rect();
            self.pending.extend(full);
            return;
        }
        let stale = std::mem::take(&mut self.shown);
        self.clear_dirty(&stale);
        self.pending.extend(stale);
    }

    fn mark(&mut self, rect: Rect) {
        self.shown.push(rect);
        self.pending.push(rect);
    }

    fn pixel_bounds(&self, rect: Rect) -> Option<(usize, usize, usize, usize)> {
        let x0 = rect.x().floor().max(0.0).min(self.width as f32) as usize;
        let y0 = rect.y().floor().max(0.0).min(self.height as f32) as usize;
        let x1 = (rect.x() + rect.width()).ceil().max(0.0).min(self.width as f32) as usize;
        let y1 = (rect.y() + rect.height()).ceil().max(0.0).min(self.height as f32) as usize;
        (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        for rect in dirty {
            let Some((x0, y0, x1, y1)) = self.pixel_bounds(*rect) else {
                continue;
            };
            let row_len = (x1 - x0) * 4;
            let canvas_data = self.canvas.data_mut();
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len].copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&mut self, dirty: Rect) {
        let Some((x0, y0, x1, y1)) = self.pixel_bounds(dirty) else {
            return;
        };
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();
        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            self.front[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }

    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, rgb: Rgb) {
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], 255);
        paint.anti_alias = true;
        self.canvas
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

impl RenderPort for SkiaRenderer {
    fn display_geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(self.width as f64, self.height as f64, self.convention)
    }

    fn draw_target(&mut self, x: f64, y: f64, visible: bool) {
        self.begin_draw();
        if !visible {
            return;
        }
        let (px, py) = self.display_geometry().to_pixels(x, y);
        let (px, py) = (px as f32, py as f32);
        self.fill_circle(px, py, OUTER_RADIUS, self.palette.target_outer);
        self.fill_circle(px, py, INNER_RADIUS, self.palette.target_inner);

        let r = OUTER_RADIUS + 1.0;
        if let Some(rect) = Rect::from_xywh(px - r, py - r, 2.0 * r, 2.0 * r) {
            self.mark(rect);
        }
    }

    fn draw_status_text(&mut self, text: &str) {
        self.begin_draw();
        if text.is_empty() {
            return;
        }
        let Some(cache) = self.text_cache.as_mut() else {
            if !self.warned_no_font {
                warn!("status text dropped, no font loaded");
                self.warned_no_font = true;
            }
            return;
        };

        let line_height = cache.line_height();
        let lines: Vec<Option<Arc<Pixmap>>> = text.lines().map(|line| cache.get_or_render(Atom::from(line))).collect();
        let top = self.height as f32 / 2.0 - line_height * lines.len() as f32 / 2.0;
        let center_x = self.width as f32 / 2.0;

        for (i, pixmap) in lines.iter().enumerate() {
            let Some(pixmap) = pixmap else {
                continue;
            };
            let x = (center_x - pixmap.width() as f32 / 2.0).round();
            let y = (top + i as f32 * line_height).round();
            self.canvas.draw_pixmap(
                x as i32,
                y as i32,
                Pixmap::as_ref(pixmap),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
            if let Some(rect) = Rect::from_xywh(x, y, pixmap.width() as f32, pixmap.height() as f32) {
                self.mark(rect);
            }
        }
    }

    fn present(&mut self) -> Result<()> {
        let mut regions = std::mem::take(&mut self.pending);
        Self::coalesce_dirty(&mut regions);
        trace!(regions = regions.len(), "present");
        for rect in regions.iter().copied() {
            self.copy_dirty_region(rect);
        }
        regions.clear();
        self.pending = regions;
        Ok(())
    }
}
