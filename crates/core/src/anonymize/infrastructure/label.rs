//! Name tag rendering for consented faces.
//!
//! Draws a box outline plus a small filled tag with the person's name,
//! using an embedded 5x7 bitmap font. Names are sanitized lowercase
//! alphanumerics, so the glyph set is deliberately small.

use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

const GLYPH_W: usize = 5;
const GLYPH_H: usize = 7;
const TAG_PADDING: usize = 3;

pub const OUTLINE_COLOR: [u8; 3] = [64, 220, 96];
const TAG_BACKGROUND: [u8; 3] = [24, 24, 24];
const TAG_TEXT: [u8; 3] = [240, 240, 240];

/// Draws the consent marker for one face: outline plus name tag. The tag
/// sits above the box when there is room, below it otherwise, and is
/// clipped to the frame.
pub fn label_face(frame: &mut Frame, bbox: &FaceBox, name: &str, scale: usize) {
    draw_outline(frame, bbox, OUTLINE_COLOR);

    let scale = scale.max(1);
    let tag_w = text_width(name, scale) + 2 * TAG_PADDING;
    let tag_h = GLYPH_H * scale + 2 * TAG_PADDING;

    let tag_x = bbox.x.max(0) as usize;
    let above = bbox.y as i64 - tag_h as i64;
    let tag_y = if above >= 0 {
        above as usize
    } else {
        (bbox.y + bbox.height).max(0) as usize
    };

    fill_rect(frame, tag_x, tag_y, tag_w, tag_h, TAG_BACKGROUND);
    draw_text(
        frame,
        name,
        tag_x + TAG_PADDING,
        tag_y + TAG_PADDING,
        scale,
        TAG_TEXT,
    );
}

pub fn text_width(text: &str, scale: usize) -> usize {
    if text.is_empty() {
        return 0;
    }
    let glyphs = text.chars().count();
    (glyphs * GLYPH_W + glyphs - 1) * scale
}

fn draw_outline(frame: &mut Frame, bbox: &FaceBox, color: [u8; 3]) {
    let Some((x, y, w, h)) = bbox.clamped(frame.width(), frame.height()) else {
        return;
    };
    fill_rect(frame, x, y, w, 1, color);
    fill_rect(frame, x, y + h - 1, w, 1, color);
    fill_rect(frame, x, y, 1, h, color);
    fill_rect(frame, x + w - 1, y, 1, h, color);
}

fn fill_rect(frame: &mut Frame, x: usize, y: usize, w: usize, h: usize, color: [u8; 3]) {
    let fw = frame.width() as usize;
    let fh = frame.height() as usize;
    let channels = frame.channels() as usize;
    let data = frame.data_mut();

    for py in y..(y + h).min(fh) {
        for px in x..(x + w).min(fw) {
            let idx = (py * fw + px) * channels;
            for c in 0..channels.min(3) {
                data[idx + c] = color[c];
            }
        }
    }
}

fn draw_text(frame: &mut Frame, text: &str, x: usize, y: usize, scale: usize, color: [u8; 3]) {
    let mut cursor = x;
    for ch in text.chars() {
        let glyph = glyph_for(ch);
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) != 0 {
                    fill_rect(
                        frame,
                        cursor + col * scale,
                        y + row * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        cursor += (GLYPH_W + 1) * scale;
    }
}

/// 5x7 glyphs, one bitmask row per byte, MSB-side bit is the left column.
/// Unknown characters render as a hollow box.
fn glyph_for(ch: char) -> [u8; GLYPH_H] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        ' ' => [0x00; GLYPH_H],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}
