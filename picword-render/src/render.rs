//! Software renderer for the two-tile display and the prompt overlay.
//!
//! Everything is drawn into one opaque tiny-skia canvas which is copied to
//! the window's frame buffer. Opaque premultiplied pixels equal straight
//! RGBA, so the copy is a plain memcpy.

use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{ensure, Context, Result};
use image::imageops::FilterType;
use picword_cache::{intern_key, Atom};
use picword_core::{TileStack, TileStyle};
use picword_experiment::{EncodedImage, Prompt, Tile, TileBoard};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::{
    Color, ColorU8, Paint, Pixmap, PixmapPaint, PremultipliedColorU8, Rect, Transform,
};
use tracing::warn;

/// How long a tile takes to slide in or out.
pub const SLIDE_DURATION: Duration = Duration::from_millis(600);

/// Tile background colors by tile color index. Entry 0 is the blank tile.
pub const PALETTE: [[u8; 3]; 16] = [
    [40, 40, 40],
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [250, 190, 212],
    [0, 128, 128],
    [220, 190, 255],
    [170, 110, 40],
    [255, 250, 200],
    [128, 0, 0],
];

const TITLE_PX: f32 = 36.0;
const BODY_PX: f32 = 24.0;

/// Placement of the three images on a canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceLayout {
    width: f32,
    height: f32,
}

impl ChoiceLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    /// Side of the square box each image is fitted into.
    pub fn cell(&self) -> f32 {
        (self.width / 3.0 * 0.8).min(self.height * 0.6).max(1.0)
    }

    pub fn center(&self, choice: usize) -> (f32, f32) {
        (
            self.width * (2 * choice + 1) as f32 / 6.0,
            self.height / 2.0,
        )
    }

    /// The image box containing a window position, if any.
    pub fn choice_at(&self, x: f32, y: f32) -> Option<usize> {
        let half = self.cell() / 2.0;
        (0..3).find(|&choice| {
            let (cx, cy) = self.center(choice);
            (x - cx).abs() <= half && (y - cy).abs() <= half
        })
    }
}

/// Fraction of the slide completed after `elapsed`.
pub fn slide_progress(elapsed: Duration) -> f32 {
    (elapsed.as_secs_f32() / SLIDE_DURATION.as_secs_f32()).clamp(0.0, 1.0)
}

/// Pixel offset of `tile` at `progress` through a swap. Incoming tiles
/// arrive from their direction, outgoing tiles leave towards it.
pub fn tile_offset(tile: &Tile, progress: f32, width: u32, height: u32) -> (f32, f32) {
    let travel = match tile.style {
        TileStyle::In => 1.0 - progress,
        TileStyle::Out => progress,
    };
    let (dx, dy) = tile.direction.offset();
    (dx * travel * width as f32, dy * travel * height as f32)
}

/// Decodes a base64 image and scales it to fit a `side` x `side` box.
pub fn decode_image(src: &EncodedImage, side: u32) -> Result<Pixmap> {
    let bytes = src.decode().context("image is not valid base64")?;
    let decoded = image::load_from_memory(&bytes).context("unsupported image data")?;
    let rgba = decoded.resize(side, side, FilterType::Triangle).to_rgba8();

    let mut pixmap = Pixmap::new(rgba.width(), rgba.height()).context("image has no pixels")?;
    for (dst, px) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = px.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Rasterizes one line of text onto a tight transparent pixmap. `None` when
/// the text has no visible glyphs.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

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

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    let first = outlines.first()?.px_bounds();
    let (mut min_x, mut min_y, mut max_x, mut max_y) =
        (first.min.x, first.min.y, first.max.x, first.max.y);
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    let rgba = color.to_color_u8();
    for out in &outlines {
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

            // Source over destination, both premultiplied.
            let alpha = (cov * rgba.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let inv = 1.0 - alpha;
            let bg = dst[i];
            let blend = |src: u8, under: u8| (src as f32 * alpha + under as f32 * inv) as u8;
            let a = (alpha * 255.0 + bg.alpha() as f32 * inv) as u8;
            let px = PremultipliedColorU8::from_rgba(
                blend(rgba.red(), bg.red()).min(a),
                blend(rgba.green(), bg.green()).min(a),
                blend(rgba.blue(), bg.blue()).min(a),
                a,
            );
            if let Some(px) = px {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

struct TextCache<F> {
    font: F,
    map: HashMap<(Atom, u32), Arc<Pixmap>>,
}

impl<F: Font> TextCache<F> {
    fn new(font: F) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, text: &str, size_px: f32) -> Option<Arc<Pixmap>> {
        let key = (Atom::from(text), size_px as u32);
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(text, size_px, &self.font, Color::WHITE)?);
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }
}

#[derive(Clone)]
enum ImageSlot {
    Empty,
    Ready(Arc<Pixmap>),
    Broken,
}

/// Decoded images by interned word, scaled for the current layout.
struct ImageCache {
    side: u32,
    slots: Vec<ImageSlot>,
}

impl ImageCache {
    fn new(side: u32) -> Self {
        Self {
            side,
            slots: Vec::new(),
        }
    }

    fn get_or_decode(&mut self, name: &Atom, src: &EncodedImage) -> Option<Arc<Pixmap>> {
        let id = intern_key(name);
        if self.slots.len() <= id {
            self.slots.resize(id + 1, ImageSlot::Empty);
        }
        match &self.slots[id] {
            ImageSlot::Ready(pm) => return Some(Arc::clone(pm)),
            ImageSlot::Broken => return None,
            ImageSlot::Empty => {}
        }
        match decode_image(src, self.side) {
            Ok(pm) => {
                let pm = Arc::new(pm);
                self.slots[id] = ImageSlot::Ready(Arc::clone(&pm));
                Some(pm)
            }
            Err(err) => {
                warn!(image = %name, error = %err, "image cannot be drawn");
                self.slots[id] = ImageSlot::Broken;
                None
            }
        }
    }
}

pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
}

pub struct TileRenderer<F = FontVec> {
    width: u32,
    height: u32,
    layout: ChoiceLayout,
    canvas: Pixmap,
    text: Option<TextCache<F>>,
    images: ImageCache,
}

impl<F: Font> TileRenderer<F> {
    /// Without a font, prompts show as an empty panel.
    pub fn new(width: u32, height: u32, font: Option<F>) -> Result<Self> {
        let canvas = Pixmap::new(width.max(1), height.max(1)).context("canvas allocation")?;
        let layout = ChoiceLayout::new(width, height);
        Ok(Self {
            width: canvas.width(),
            height: canvas.height(),
            layout,
            canvas,
            text: font.map(TextCache::new),
            images: ImageCache::new(layout.cell() as u32),
        })
    }

    /// Reallocates the canvas. Cached images are rescaled on next use.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width.max(1), height.max(1)).context("canvas allocation")?;
        self.width = self.canvas.width();
        self.height = self.canvas.height();
        self.layout = ChoiceLayout::new(width, height);
        self.images = ImageCache::new(self.layout.cell() as u32);
        Ok(())
    }

    pub fn layout(&self) -> ChoiceLayout {
        self.layout
    }

    pub fn render_frame(
        &mut self,
        board: &TileBoard,
        prompt: Option<&Prompt>,
        frame_buffer: &mut [u8],
    ) -> Result<FrameStats> {
        let started = Instant::now();
        self.canvas.fill(Color::BLACK);

        // Between swaps only the incoming tile is visible, at rest.
        let (progress, mut visible): (f32, Vec<&Tile>) = if board.transition {
            (
                slide_progress(board.changed_at.elapsed()),
                board.tiles.iter().collect(),
            )
        } else {
            (1.0, vec![board.incoming()])
        };
        visible.sort_by_key(|tile| tile.stack == TileStack::Front);
        for tile in visible {
            let offset = tile_offset(tile, progress, self.width, self.height);
            self.draw_tile(tile, offset);
        }
        if let Some(prompt) = prompt {
            self.draw_prompt(prompt);
        }
        let draw = started.elapsed();

        let copy_started = Instant::now();
        let data = self.canvas.data();
        ensure!(
            frame_buffer.len() == data.len(),
            "frame buffer holds {} bytes, canvas {}",
            frame_buffer.len(),
            data.len()
        );
        frame_buffer.copy_from_slice(data);
        let copy = copy_started.elapsed();

        Ok(FrameStats {
            draw,
            copy,
            total: started.elapsed(),
        })
    }

    fn draw_tile(&mut self, tile: &Tile, (ox, oy): (f32, f32)) {
        let [r, g, b] = PALETTE[usize::from(tile.color) % PALETTE.len()];
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, 255);
        if let Some(rect) = Rect::from_xywh(ox, oy, self.width as f32, self.height as f32) {
            self.canvas
                .fill_rect(rect, &paint, Transform::identity(), None);
        }

        if !tile.active {
            return;
        }
        let (Some(names), Some(sources)) = (&tile.names, &tile.image_src) else {
            return;
        };
        for (choice, (name, src)) in names.iter().zip(sources.iter()).enumerate() {
            let Some(pm) = self.images.get_or_decode(name, src) else {
                continue;
            };
            let (cx, cy) = self.layout.center(choice);
            let x = (cx + ox - pm.width() as f32 / 2.0).round() as i32;
            let y = (cy + oy - pm.height() as f32 / 2.0).round() as i32;
            self.canvas.draw_pixmap(
                x,
                y,
                Pixmap::as_ref(&pm),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }

    fn draw_prompt(&mut self, prompt: &Prompt) {
        let (w, h) = (self.width as f32, self.height as f32);
        let (panel_w, panel_h) = (w * 0.6, h * 0.4);
        let top = (h - panel_h) / 2.0;
        let mut shade = Paint::default();
        shade.set_color_rgba8(0, 0, 0, 210);
        if let Some(rect) = Rect::from_xywh((w - panel_w) / 2.0, top, panel_w, panel_h) {
            self.canvas
                .fill_rect(rect, &shade, Transform::identity(), None);
        }

        let Some(text) = self.text.as_mut() else {
            return;
        };
        let lines = std::iter::once((prompt.title.as_str(), TITLE_PX))
            .chain(prompt.body.lines().map(|line| (line, BODY_PX)));
        let mut y = top + BODY_PX;
        for (line, size) in lines {
            if let Some(pm) = text.get_or_render(line, size) {
                let x = ((w - pm.width() as f32) / 2.0).round() as i32;
                self.canvas.draw_pixmap(
                    x,
                    y.round() as i32,
                    Pixmap::as_ref(&pm),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            y += size * 1.4;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use picword_core::Direction;
    use std::io::Cursor;

    fn png(width: u32, height: u32, rgba: [u8; 4]) -> EncodedImage {
        let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        EncodedImage::encode(&bytes)
    }

    fn pixel(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]
    }

    #[test]
    fn clicks_map_to_image_boxes() {
        let layout = ChoiceLayout::new(300, 200);
        assert_eq!(layout.cell(), 80.0);
        assert_eq!(layout.choice_at(50.0, 100.0), Some(0));
        assert_eq!(layout.choice_at(150.0, 130.0), Some(1));
        assert_eq!(layout.choice_at(289.0, 61.0), Some(2));
        assert_eq!(layout.choice_at(100.0, 100.0), None);
        assert_eq!(layout.choice_at(150.0, 10.0), None);
    }

    #[test]
    fn tiles_slide_along_their_direction() {
        let mut tile = TileBoard::default().tiles[0].clone();
        tile.direction = Direction::Left;
        tile.style = TileStyle::In;
        assert_eq!(tile_offset(&tile, 0.0, 300, 200), (-300.0, 0.0));
        assert_eq!(tile_offset(&tile, 1.0, 300, 200), (0.0, 0.0));

        tile.direction = Direction::Bottom;
        tile.style = TileStyle::Out;
        assert_eq!(tile_offset(&tile, 0.5, 300, 200), (0.0, 100.0));
    }

    #[test]
    fn slide_progress_is_clamped() {
        assert_eq!(slide_progress(Duration::ZERO), 0.0);
        assert!((slide_progress(SLIDE_DURATION / 2) - 0.5).abs() < 1e-6);
        assert_eq!(slide_progress(SLIDE_DURATION * 3), 1.0);
    }

    #[test]
    fn decoded_images_keep_their_aspect() {
        let pm = decode_image(&png(4, 2, [0, 0, 255, 255]), 8).unwrap();
        assert_eq!((pm.width(), pm.height()), (8, 4));
        assert!(decode_image(&EncodedImage::encode(b"not an image"), 8).is_err());
    }

    #[test]
    fn blank_board_fills_with_the_neutral_color() {
        let mut renderer = TileRenderer::<FontVec>::new(300, 200, None).unwrap();
        let mut frame = vec![0u8; 300 * 200 * 4];
        renderer
            .render_frame(&TileBoard::default(), None, &mut frame)
            .unwrap();
        let [r, g, b] = PALETTE[0];
        assert_eq!(pixel(&frame, 300, 150, 100), [r, g, b, 255]);
    }

    #[test]
    fn settled_tile_shows_its_images_on_its_color() {
        let mut board = TileBoard::default();
        let tile = &mut board.tiles[board.incoming];
        tile.color = 3;
        tile.active = true;
        tile.names = Some(["red", "green", "blue"].map(Atom::from));
        tile.image_src = Some(Arc::new([
            png(4, 2, [255, 0, 0, 255]),
            png(4, 2, [0, 255, 0, 255]),
            png(4, 2, [0, 0, 255, 255]),
        ]));

        let mut renderer = TileRenderer::<FontVec>::new(300, 200, None).unwrap();
        let mut frame = vec![0u8; 300 * 200 * 4];
        renderer.render_frame(&board, None, &mut frame).unwrap();

        assert_eq!(pixel(&frame, 300, 50, 100), [255, 0, 0, 255]);
        assert_eq!(pixel(&frame, 300, 150, 100), [0, 255, 0, 255]);
        assert_eq!(pixel(&frame, 300, 250, 100), [0, 0, 255, 255]);
        let [r, g, b] = PALETTE[3];
        assert_eq!(pixel(&frame, 300, 0, 0), [r, g, b, 255]);
    }

    #[test]
    fn prompt_panel_darkens_the_center() {
        let mut renderer = TileRenderer::<FontVec>::new(300, 200, None).unwrap();
        let mut frame = vec![0u8; 300 * 200 * 4];
        renderer
            .render_frame(&TileBoard::default(), Some(&Prompt::ready()), &mut frame)
            .unwrap();
        let [r, ..] = pixel(&frame, 300, 150, 100);
        assert!(r < PALETTE[0][0]);
        assert_eq!(pixel(&frame, 300, 2, 2)[0], PALETTE[0][0]);
    }

    #[test]
    fn mismatched_frame_buffer_is_an_error() {
        let mut renderer = TileRenderer::<FontVec>::new(30, 20, None).unwrap();
        let mut frame = vec![0u8; 10];
        assert!(renderer
            .render_frame(&TileBoard::default(), None, &mut frame)
            .is_err());
    }
}
