use std::collections::HashMap;

use once_cell::sync::Lazy;

pub const FONT_HEIGHT: usize = 5;
const FONT_WIDTH: usize = 3;
const SHADOW_OFFSET: usize = 1;
const FILL_CHAR: char = '█';
const OUTLINE_CHAR: char = '░';

type Glyph = [&'static str; FONT_HEIGHT];

const FALLBACK: Glyph = ["   ", "   ", "111", "   ", "   "];

static GLYPHS: Lazy<HashMap<char, Glyph>> = Lazy::new(|| {
    HashMap::from([
        ('0', ["111", "1 1", "1 1", "1 1", "111"]),
        ('1', [" 1 ", "11 ", " 1 ", " 1 ", "111"]),
        ('2', ["111", "  1", "111", "1  ", "111"]),
        ('3', ["111", "  1", " 11", "  1", "111"]),
        ('4', ["1 1", "1 1", "111", "  1", "  1"]),
        ('5', ["111", "1  ", "111", "  1", "111"]),
        ('6', ["111", "1  ", "111", "1 1", "111"]),
        ('7', ["111", "  1", "  1", " 1 ", " 1 "]),
        ('8', ["111", "1 1", "111", "1 1", "111"]),
        ('9', ["111", "1 1", "111", "  1", "111"]),
        (':', ["   ", " 1 ", "   ", " 1 ", "   "]),
        (' ', ["   ", "   ", "   ", "   ", "   "]),
    ])
});

/// Render digits and colons as large block characters with a drop shadow.
/// Unsupported characters render as a dash.
pub fn render(text: &str) -> Vec<String> {
    let content: Vec<char> = text.chars().collect();
    let canvas_height = FONT_HEIGHT + SHADOW_OFFSET;
    if content.is_empty() {
        return vec![String::new(); canvas_height];
    }

    let glyph_width = FONT_WIDTH * 2;
    let spacing = 1;
    let total_width = content.len() * glyph_width
        + content.len().saturating_sub(1) * spacing
        + SHADOW_OFFSET * 2;
    let mut canvas = vec![vec![' '; total_width]; canvas_height];

    for (index, ch) in content.iter().enumerate() {
        let glyph = GLYPHS.get(ch).unwrap_or(&FALLBACK);
        paint_glyph(&mut canvas, glyph, index * (glyph_width + spacing));
    }

    canvas
        .into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect()
}

/// Display width of `render(text)` in terminal cells.
pub fn width(text: &str) -> usize {
    let len = text.chars().count();
    if len == 0 {
        0
    } else {
        len * FONT_WIDTH * 2 + (len - 1) + SHADOW_OFFSET * 2
    }
}

fn paint_glyph(canvas: &mut [Vec<char>], glyph: &Glyph, x_offset: usize) {
    for (row_idx, row) in glyph.iter().enumerate() {
        for (col_idx, symbol) in row.chars().enumerate() {
            if symbol == '1' {
                apply_fill(canvas, row_idx, x_offset + col_idx * 2);
            }
        }
    }
}

fn apply_fill(canvas: &mut [Vec<char>], y: usize, x: usize) {
    let shadow_x = x + SHADOW_OFFSET * 2;
    place(canvas, y + SHADOW_OFFSET, shadow_x, OUTLINE_CHAR);
    place(canvas, y + SHADOW_OFFSET, shadow_x + 1, OUTLINE_CHAR);

    place(canvas, y, x, FILL_CHAR);
    place(canvas, y, x + 1, FILL_CHAR);
}

fn place(canvas: &mut [Vec<char>], y: usize, x: usize, ch: char) {
    if y >= canvas.len() || x >= canvas[y].len() {
        return;
    }
    let cell = &mut canvas[y][x];
    if *cell == ' ' || (*cell == OUTLINE_CHAR && ch == FILL_CHAR) {
        *cell = ch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_clock_digits() {
        let lines = render("01:05");
        assert_eq!(lines.len(), FONT_HEIGHT + SHADOW_OFFSET);
        assert!(lines[0].starts_with("██████"));
        assert!(lines.iter().all(|line| line.chars().count() <= width("01:05")));
    }

    #[test]
    fn unknown_characters_fall_back_to_dash() {
        let lines = render("x");
        assert_eq!(lines[2].trim(), "██████");
        assert!(lines[0].is_empty());
    }
}
