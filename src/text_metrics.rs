use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

/// Width of an average glyph relative to the font size when no face is available.
const FALLBACK_ADVANCE: f32 = 0.56;
const ASCENT: f32 = 0.8;
pub const LINE_HEIGHT: f32 = 1.2;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Start,
    Middle,
    End,
}

impl Anchor {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "middle" => Anchor::Middle,
            "end" => Anchor::End,
            _ => Anchor::Start,
        }
    }
}

/// Font and placement inputs for [`text_bbox`], read off a `<text>` element and its ancestors.
#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
    pub anchor: Anchor,
    pub middle_baseline: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            font_size: 16.0,
            anchor: Anchor::Start,
            middle_baseline: false,
        }
    }
}

pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> f32 {
    if text.is_empty() || font_size <= 0.0 {
        return 0.0;
    }
    let measured = TEXT_MEASURER
        .lock()
        .ok()
        .and_then(|mut guard| guard.measure(text, font_size, font_family));
    measured.unwrap_or_else(|| text.chars().count() as f32 * font_size * FALLBACK_ADVANCE)
}

/// Approximates `getBBox()` for a single-line `<text>` anchored at `(x, y)`.
pub fn text_bbox(text: &str, x: f32, y: f32, style: &TextStyle) -> BBox {
    let width = measure_text_width(text, style.font_size, &style.font_family);
    let height = style.font_size * LINE_HEIGHT;
    let left = match style.anchor {
        Anchor::Start => x,
        Anchor::Middle => x - width / 2.0,
        Anchor::End => x - width,
    };
    let top = if style.middle_baseline {
        y - height / 2.0
    } else {
        y - style.font_size * ASCENT
    };
    BBox {
        x: left,
        y: top,
        width,
        height,
    }
}

/// Size of a block of label lines, the widest line setting the width.
pub fn lines_size(lines: &[String], font_size: f32, font_family: &str) -> (f32, f32) {
    let width = lines
        .iter()
        .map(|line| measure_text_width(line, font_size, font_family))
        .fold(0.0f32, f32::max);
    (width, lines.len() as f32 * font_size * LINE_HEIGHT)
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<FontFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = normalize_family_key(font_family);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(font_family);
            self.cache.insert(key.clone(), face);
        }
        let face = self.cache.get(&key)?.as_ref()?;
        Some(face.measure_width(&text.replace('\t', "    "), font_size))
    }

    fn load_face(&mut self, font_family: &str) -> Option<FontFace> {
        let mut names: Vec<String> = Vec::new();
        let mut generics: Vec<Option<Family<'static>>> = Vec::new();
        for part in font_family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            let generic = match raw.to_ascii_lowercase().as_str() {
                "serif" => Some(Family::Serif),
                "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => {
                    Some(Family::SansSerif)
                }
                "monospace" | "ui-monospace" => Some(Family::Monospace),
                "cursive" => Some(Family::Cursive),
                "fantasy" => Some(Family::Fantasy),
                _ => None,
            };
            if generic.is_none() {
                names.push(raw.to_string());
            }
            generics.push(generic);
        }
        if generics.is_empty() {
            generics.push(Some(Family::SansSerif));
        }

        let mut named = names.iter();
        let families: Vec<Family<'_>> = generics
            .into_iter()
            .filter_map(|generic| match generic {
                Some(family) => Some(family),
                None => named.next().map(|name| Family::Name(name.as_str())),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontFace::parse(data.to_vec(), index))
            .flatten()
    }
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: [u16; 128],
}

impl FontFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        let units_per_em = face.units_per_em().max(1);
        Some(Self {
            data,
            index,
            units_per_em,
            ascii_advances,
        })
    }

    fn measure_width(&self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * FALLBACK_ADVANCE;

        if text.is_ascii() {
            return text
                .bytes()
                .filter(|b| *b != b'\n')
                .map(|b| match self.ascii_advances[b as usize] {
                    0 => fallback,
                    advance => advance as f32 * scale,
                })
                .sum();
        }

        let Ok(face) = Face::parse(&self.data, self.index) else {
            return text.chars().count() as f32 * fallback;
        };
        text.chars()
            .filter(|ch| *ch != '\n')
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .map(|advance| advance as f32 * scale)
                    .unwrap_or(fallback)
            })
            .sum()
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_shifts_box_left() {
        let style = TextStyle {
            anchor: Anchor::Middle,
            ..TextStyle::default()
        };
        let bbox = text_bbox("cpu", 100.0, 50.0, &style);
        assert!(bbox.width > 0.0);
        assert!((bbox.x + bbox.width / 2.0 - 100.0).abs() < 0.01);
        assert!(bbox.y < 50.0);
        assert!((bbox.height - 16.0 * LINE_HEIGHT).abs() < 0.01);
    }

    #[test]
    fn empty_text_has_no_width() {
        assert_eq!(measure_text_width("", 16.0, "sans-serif"), 0.0);
    }

    #[test]
    fn lines_size_uses_widest_line() {
        let lines = vec!["a".to_string(), "a much longer line".to_string()];
        let (width, height) = lines_size(&lines, 10.0, "sans-serif");
        assert!(width >= measure_text_width("a much longer line", 10.0, "sans-serif") - 0.01);
        assert!((height - 2.0 * 10.0 * LINE_HEIGHT).abs() < 0.01);
    }
}
