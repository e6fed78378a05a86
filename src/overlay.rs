//! Frame annotation: face outlines and the timestamp watermark
//!
//! Text is drawn with a built-in 3x5 bitmap font covering the characters a
//! timestamp needs, scaled by an integer factor.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};

use crate::config::OverlayConfig;
use crate::tracking::FaceBox;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const FACE_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const FACE_BOX_THICKNESS: u32 = 2;

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Rows top to bottom, bit 2 is the leftmost column
fn glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        _ => [0; 5],
    }
}

fn fill_rect(img: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(i64::from(img.width()));
    let y1 = (y + h).min(i64::from(img.height()));
    for py in y0..y1 {
        for px in x0..x1 {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
}

/// Draw `text` with its top-left corner at `(x, y)`; pixels outside the
/// frame are clipped.
pub fn draw_text(img: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
    let scale = i64::from(scale.max(1));
    let mut cursor = i64::from(x);
    for c in text.chars() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(
                        img,
                        cursor + i64::from(col) * scale,
                        i64::from(y) + row as i64 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        cursor += i64::from(GLYPH_ADVANCE) * scale;
    }
}

/// Width and height in pixels `text` occupies at `scale`
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let n = text.chars().count() as u32;
    let width = if n == 0 {
        0
    } else {
        (n * GLYPH_ADVANCE - 1) * scale
    };
    (width, GLYPH_HEIGHT * scale)
}

/// Outline a detected face
pub fn draw_face_box(img: &mut RgbImage, face: &FaceBox, color: Rgb<u8>, thickness: u32) {
    let (x, y) = (i64::from(face.x), i64::from(face.y));
    let (w, h) = (i64::from(face.width), i64::from(face.height));
    let t = i64::from(thickness.max(1));
    if w <= 0 || h <= 0 {
        return;
    }
    fill_rect(img, x, y, w, t, color);
    fill_rect(img, x, y + h - t, w, t, color);
    fill_rect(img, x, y, t, h, color);
    fill_rect(img, x + w - t, y, t, h, color);
}

/// Local-time stamp burned into every outgoing frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub x: u32,
    pub y: u32,
    pub scale: u32,
    pub color: Rgb<u8>,
}

impl Watermark {
    pub fn from_config(config: &OverlayConfig) -> Self {
        Self {
            x: config.position[0],
            y: config.position[1],
            scale: config.scale,
            color: Rgb(config.color),
        }
    }

    pub fn stamp(&self, img: &mut RgbImage, at: DateTime<Local>) {
        let text = at.format(TIMESTAMP_FORMAT).to_string();
        draw_text(img, &text, self.x, self.y, self.scale, self.color);
    }
}
