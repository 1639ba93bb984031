use std::collections::HashMap;

use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, PxScaleFont, ScaleFont};
use anyhow::{anyhow, Result};
use predex_core::{Bounds, Layout, Point, Screen};
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Rect, Stroke, Transform};

/// Straight RGBA colors
const INK: [u8; 4] = [0x00, 0x00, 0x00, 0xff];
const BODY: [u8; 4] = [0x11, 0x11, 0x11, 0xff];
const PROMPT: [u8; 4] = [0x33, 0x33, 0x33, 0xff];
const MUTED: [u8; 4] = [0x88, 0x88, 0x88, 0xff];
const BUTTON_FILL: [u8; 4] = [0xee, 0xee, 0xee, 0xff];
const BUTTON_LINE: [u8; 4] = [0x44, 0x44, 0x44, 0xff];
const BUTTON_TEXT: [u8; 4] = [0x22, 0x22, 0x22, 0xff];

/// Logical pixels; multiplied by the display scale factor
const WRAP_WIDTH: f32 = 1100.0;
const LINE_SPACING: f32 = 1.35;

#[derive(Clone)]
struct CachedGlyph {
    bitmap: Vec<u8>,
    width: u32,
    height: u32,
    bearing_x: i32,
    bearing_y: i32,
}

#[derive(Hash, Eq, PartialEq, Clone, Copy)]
struct GlyphCacheKey {
    glyph_id: u16,
    scale_bits: u32,
}

/// Contents of the response collector window
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    pub prompt: &'a str,
    pub text: &'a str,
    /// Uncommitted IME composition, drawn after the committed text
    pub preedit: &'a str,
    pub confirm_label: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryLayout {
    pub field: Bounds,
    pub confirm: Bounds,
}

/// White-background text renderer for the experiment screens
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    scale: f32,
    font: FontArc,
    glyph_cache: HashMap<GlyphCacheKey, CachedGlyph>,
    canvas: Pixmap,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, scale_factor: f64, font: FontArc) -> Result<Self> {
        let canvas = Pixmap::new(width.max(1), height.max(1))
            .ok_or_else(|| anyhow!("cannot allocate {width}x{height} canvas"))?;
        Ok(Self {
            width,
            height,
            scale: scale_factor as f32,
            font,
            glyph_cache: HashMap::with_capacity(512),
            canvas,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f64) -> Result<()> {
        self.canvas = Pixmap::new(width.max(1), height.max(1))
            .ok_or_else(|| anyhow!("cannot allocate {width}x{height} canvas"))?;
        self.width = width;
        self.height = height;
        if self.scale != scale_factor as f32 {
            self.scale = scale_factor as f32;
            self.glyph_cache.clear();
        }
        Ok(())
    }

    fn px(&self, logical: f32) -> f32 {
        logical * self.scale
    }

    fn center(&self) -> Point {
        Point::new(self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    /// Renders a full-screen page into `frame` (RGBA8, surface size)
    pub fn render_screen(&mut self, screen: &Screen, frame: &mut [u8]) -> Result<Layout> {
        self.canvas.fill(Color::WHITE);
        let c = self.center();

        let layout = match screen {
            Screen::Instructions {
                lines,
                button_label,
            } => {
                self.draw_block(&lines.join("\n"), Point::new(c.x, c.y - self.px(120.0)), 32.0, BODY);
                let button = Bounds::centered(
                    Point::new(c.x, c.y + self.px(220.0)),
                    self.px(240.0),
                    self.px(70.0),
                );
                self.draw_button(button, button_label);
                Layout {
                    button: Some(button),
                }
            }
            Screen::Trial {
                prefix,
                prompt,
                button_label,
            } => {
                self.draw_sentence_and_prompt(prefix, prompt);
                let button = Bounds::centered(
                    Point::new(c.x, c.y + self.px(200.0)),
                    self.px(280.0),
                    self.px(70.0),
                );
                self.draw_button(button, button_label);
                Layout {
                    button: Some(button),
                }
            }
            Screen::Reveal { text, prompt } => {
                self.draw_sentence_and_prompt(text, prompt);
                Layout::default()
            }
            Screen::Entry { prompt, text } => {
                self.draw_block(prompt, Point::new(c.x, c.y - self.px(120.0)), 28.0, PROMPT);
                let field = Bounds::centered(
                    Point::new(c.x, c.y + self.px(40.0)),
                    self.px(600.0),
                    self.px(64.0),
                );
                self.draw_field(field, text, "", 36.0);
                Layout::default()
            }
            Screen::Message { text } => {
                self.draw_block(text, Point::new(c.x, c.y - self.px(60.0)), 36.0, BODY);
                Layout::default()
            }
        };

        self.copy_to(frame)?;
        Ok(layout)
    }

    /// Renders the collector window into `frame`
    pub fn render_entry(&mut self, view: &EntryView<'_>, frame: &mut [u8]) -> Result<EntryLayout> {
        self.canvas.fill(Color::WHITE);
        let margin = self.px(20.0);
        let w = self.width as f32;
        let h = self.height as f32;

        let prompt_size = 18.0;
        let line_height = self.px(prompt_size) * LINE_SPACING;
        let mut baseline = margin + self.px(prompt_size);
        for line in view.prompt.lines() {
            self.draw_text(line, margin, baseline, prompt_size, PROMPT);
            baseline += line_height;
        }

        let field = Bounds::new(margin, baseline, w - 2.0 * margin, self.px(44.0));
        self.draw_field(field, view.text, view.preedit, 22.0);

        let confirm = Bounds::new(
            w - margin - self.px(110.0),
            h - margin - self.px(44.0),
            self.px(110.0),
            self.px(44.0),
        );
        self.draw_button(confirm, view.confirm_label);

        self.copy_to(frame)?;
        Ok(EntryLayout { field, confirm })
    }

    fn copy_to(&self, frame: &mut [u8]) -> Result<()> {
        let data = self.canvas.data();
        if frame.len() != data.len() {
            return Err(anyhow!(
                "frame is {} bytes, canvas is {} bytes",
                frame.len(),
                data.len()
            ));
        }
        frame.copy_from_slice(data);
        Ok(())
    }

    fn draw_sentence_and_prompt(&mut self, sentence: &str, prompt: &str) {
        let c = self.center();
        self.draw_block(sentence, Point::new(c.x, c.y - self.px(120.0)), 40.0, INK);
        self.draw_block(prompt, Point::new(c.x, c.y + self.px(60.0)), 28.0, PROMPT);
    }

    /// Wrapped, horizontally centered lines whose block is centered on `center`
    fn draw_block(&mut self, text: &str, center: Point, size: f32, color: [u8; 4]) {
        let max_width = self.px(WRAP_WIDTH).min(self.width as f32 * 0.9);
        let lines = wrap_words(text, max_width, |s| self.measure_text(s, size));
        let line_height = self.px(size) * LINE_SPACING;
        let top = center.y - line_height * lines.len() as f32 / 2.0;

        for (i, line) in lines.iter().enumerate() {
            let line_center = top + line_height * (i as f32 + 0.5);
            self.draw_text_centered(line, Point::new(center.x, line_center), size, color);
        }
    }

    fn draw_button(&mut self, bounds: Bounds, label: &str) {
        if let Some(rect) = Rect::from_xywh(bounds.x, bounds.y, bounds.width, bounds.height) {
            let mut paint = Paint::default();
            paint.set_color(rgba(BUTTON_FILL));
            self.canvas.fill_rect(rect, &paint, Transform::identity(), None);

            paint.set_color(rgba(BUTTON_LINE));
            paint.anti_alias = true;
            let outline = PathBuilder::from_rect(rect);
            let stroke = Stroke {
                width: self.px(2.0),
                ..Default::default()
            };
            self.canvas
                .stroke_path(&outline, &paint, &stroke, Transform::identity(), None);
        }
        self.draw_text_centered(label, bounds.center(), 28.0_f32.min(bounds.height / self.scale * 0.45), BUTTON_TEXT);
    }

    /// Input box with committed text, underlined composition and a caret
    fn draw_field(&mut self, bounds: Bounds, text: &str, preedit: &str, size: f32) {
        let Some(rect) = Rect::from_xywh(bounds.x, bounds.y, bounds.width, bounds.height) else {
            return;
        };
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(rgba(BUTTON_LINE));
        let stroke = Stroke {
            width: self.px(1.5),
            ..Default::default()
        };
        self.canvas.stroke_path(
            &PathBuilder::from_rect(rect),
            &paint,
            &stroke,
            Transform::identity(),
            None,
        );

        let padding = self.px(10.0);
        let baseline = self.baseline_for_center(bounds.center().y, size);
        let mut pen_x = bounds.x + padding;
        self.draw_text(text, pen_x, baseline, size, INK);
        pen_x += self.measure_text(text, size);

        if !preedit.is_empty() {
            self.draw_text(preedit, pen_x, baseline, size, MUTED);
            let width = self.measure_text(preedit, size);
            self.fill(Bounds::new(pen_x, baseline + self.px(3.0), width, self.px(1.5)), MUTED);
            pen_x += width;
        }

        let caret_height = self.px(size);
        self.fill(
            Bounds::new(pen_x + self.px(1.0), baseline - caret_height * 0.8, self.px(1.5), caret_height),
            INK,
        );
    }

    fn fill(&mut self, bounds: Bounds, color: [u8; 4]) {
        if let Some(rect) = Rect::from_xywh(bounds.x, bounds.y, bounds.width, bounds.height) {
            let mut paint = Paint::default();
            paint.set_color(rgba(color));
            self.canvas.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    fn scaled_font(&self, size: f32) -> PxScaleFont<&FontArc> {
        self.font.as_scaled(PxScale::from(self.px(size)))
    }

    /// Advance width of `text` in surface pixels
    pub fn measure_text(&self, text: &str, size: f32) -> f32 {
        let sf = self.scaled_font(size);
        let mut width = 0.0;
        let mut prev: Option<GlyphId> = None;
        for ch in text.chars() {
            let id = sf.glyph_id(ch);
            if let Some(prev) = prev {
                width += sf.kern(prev, id);
            }
            width += sf.h_advance(id);
            prev = Some(id);
        }
        width
    }

    fn baseline_for_center(&self, center_y: f32, size: f32) -> f32 {
        let sf = self.scaled_font(size);
        center_y + (sf.ascent() + sf.descent()) / 2.0
    }

    fn draw_text_centered(&mut self, text: &str, center: Point, size: f32, color: [u8; 4]) {
        let x = center.x - self.measure_text(text, size) / 2.0;
        let baseline = self.baseline_for_center(center.y, size);
        self.draw_text(text, x, baseline, size, color);
    }

    fn draw_text(&mut self, text: &str, x: f32, baseline_y: f32, size: f32, color: [u8; 4]) {
        if text.is_empty() {
            return;
        }
        let scale = PxScale::from(self.px(size));

        // Layout and collect cache misses
        let (glyphs, misses) = {
            let sf = self.font.as_scaled(scale);
            let mut pen_x = x;
            let mut prev = None;
            let mut glyphs = Vec::with_capacity(text.len());
            let mut misses = Vec::new();

            for ch in text.chars() {
                let id = self.font.glyph_id(ch);
                if let Some(prev_id) = prev {
                    pen_x += sf.kern(prev_id, id);
                }
                let key = GlyphCacheKey {
                    glyph_id: id.0,
                    scale_bits: scale.x.to_bits(),
                };
                if !self.glyph_cache.contains_key(&key) && !misses.iter().any(|(_, k)| *k == key) {
                    misses.push((id, key));
                }
                glyphs.push((point(pen_x, baseline_y), key));
                pen_x += sf.h_advance(id);
                prev = Some(id);
            }
            (glyphs, misses)
        };

        for (id, key) in misses {
            let glyph = Glyph {
                id,
                scale,
                position: point(0.0, 0.0),
            };
            if let Some(cached) = rasterize(&self.font, glyph) {
                self.glyph_cache.insert(key, cached);
            }
        }

        let (w, h) = (self.canvas.width(), self.canvas.height());
        let pixels = self.canvas.pixels_mut();
        for (position, key) in glyphs {
            if let Some(cached) = self.glyph_cache.get(&key) {
                blit_glyph(pixels, w, h, position, cached, color);
            }
        }
    }
}

fn rgba(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn rasterize(font: &FontArc, glyph: Glyph) -> Option<CachedGlyph> {
    let outlined = font.outline_glyph(glyph)?;
    let bounds = outlined.px_bounds();
    let width = bounds.width().ceil() as u32;
    let height = bounds.height().ceil() as u32;
    if width == 0 || height == 0 {
        return None;
    }
    let mut bitmap = vec![0u8; (width * height) as usize];
    outlined.draw(|x, y, coverage| {
        if let Some(px) = bitmap.get_mut((y * width + x) as usize) {
            *px = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
        }
    });
    Some(CachedGlyph {
        bitmap,
        width,
        height,
        bearing_x: bounds.min.x.floor() as i32,
        bearing_y: bounds.min.y.floor() as i32,
    })
}

/// Source-over blend of a coverage mask onto premultiplied pixels
fn blit_glyph(
    pixels: &mut [PremultipliedColorU8],
    w: u32,
    h: u32,
    position: ab_glyph::Point,
    cached: &CachedGlyph,
    color: [u8; 4],
) {
    let glyph_x = position.x as i32 + cached.bearing_x;
    let glyph_y = position.y as i32 + cached.bearing_y;
    let (wi, hi) = (w as i32, h as i32);
    let [cr, cg, cb, ca] = color.map(|c| c as f32 / 255.0);

    for gy in 0..cached.height as i32 {
        let py = glyph_y + gy;
        if py < 0 || py >= hi {
            continue;
        }
        let src_row = (gy as u32 * cached.width) as usize;
        let dst_row = (py as u32 * w) as usize;

        for gx in 0..cached.width as i32 {
            let px = glyph_x + gx;
            if px < 0 || px >= wi {
                continue;
            }
            let coverage = cached.bitmap[src_row + gx as usize];
            if coverage == 0 {
                continue;
            }
            let alpha = ca * coverage as f32 / 255.0;
            let inv = 1.0 - alpha;
            let idx = dst_row + px as usize;
            let dst = pixels[idx];

            let out_a = (alpha * 255.0 + dst.alpha() as f32 * inv).min(255.0) as u8;
            let channel = |src: f32, dst: u8| -> u8 {
                ((src * alpha * 255.0 + dst as f32 * inv).min(255.0) as u8).min(out_a)
            };
            let blended = PremultipliedColorU8::from_rgba(
                channel(cr, dst.red()),
                channel(cg, dst.green()),
                channel(cb, dst.blue()),
                out_a,
            );
            if let Some(blended) = blended {
                pixels[idx] = blended;
            }
        }
    }
}

/// Greedy word wrap at whitespace; explicit newlines start new lines and a
/// single word wider than `max_width` gets a line of its own.
pub fn wrap_words(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if measure(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_owned()));
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> f32 {
        s.chars().count() as f32
    }

    #[test]
    fn short_text_stays_on_one_line() {
        assert_eq!(wrap_words("나는 바나나가", 20.0, chars), vec!["나는 바나나가"]);
    }

    #[test]
    fn wraps_at_eojeol_boundaries() {
        let lines = wrap_words("멀리 배웅하던 길 그자리 서서", 8.0, chars);
        assert_eq!(lines, vec!["멀리 배웅하던", "길 그자리 서서"]);
    }

    #[test]
    fn newlines_and_blank_lines_are_kept() {
        let lines = wrap_words("문장 예측 과제\n\n- 시작", 100.0, chars);
        assert_eq!(lines, vec!["문장 예측 과제", "", "- 시작"]);
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let lines = wrap_words("a bbbbbbbbbb c", 4.0, chars);
        assert_eq!(lines, vec!["a", "bbbbbbbbbb", "c"]);
    }

    #[test]
    fn empty_text_is_one_empty_line() {
        assert_eq!(wrap_words("", 10.0, chars), vec![String::new()]);
    }
}
