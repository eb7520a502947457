use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::warn;
use ttf_parser::{name_id, Face};

use super::BlockKind;
use crate::settings::Settings;

/// Per-substring pixel measurement backed by a parsed outline font, with a
/// fixed-metric estimate when no usable font file is available.
#[derive(Clone)]
pub struct FontMetrics {
    data: Option<Arc<Vec<u8>>>,
    units_per_em: u16,
    space_advance: u16,
    face_index: u32,
    family: Option<String>,
}

impl FontMetrics {
    pub fn from_path(path: &Path) -> Result<FontMetrics> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        FontMetrics::from_data(data)
            .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
    }

    pub fn from_data(data: Vec<u8>) -> Result<FontMetrics> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for index in 0..count {
            if let Ok(face) = Face::parse(&data, index) {
                let family = extract_family_name(&face);
                let units_per_em = face.units_per_em().max(1);
                let space_advance = face
                    .glyph_index(' ')
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(units_per_em / 2);
                return Ok(FontMetrics {
                    data: Some(Arc::new(data)),
                    units_per_em,
                    space_advance,
                    face_index: index,
                    family,
                });
            }
        }
        Err(anyhow!("failed to parse font data"))
    }

    /// Fixed-metric fallback, used when the preferred font cannot be loaded.
    pub fn fallback() -> FontMetrics {
        FontMetrics {
            data: None,
            units_per_em: 1000,
            space_advance: 250,
            face_index: 0,
            family: None,
        }
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn font_data(&self) -> Option<&[u8]> {
        self.data.as_deref().map(|data| data.as_slice())
    }

    /// Pixel width of `text` at the given point size.
    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        if let Some(data) = self.data.as_deref() {
            if let Ok(face) = Face::parse(data, self.face_index) {
                let mut advance = 0u32;
                for ch in text.chars() {
                    if ch == '\n' {
                        continue;
                    }
                    if ch == ' ' {
                        advance = advance.saturating_add(self.space_advance as u32);
                        continue;
                    }
                    if let Some(glyph) = face.glyph_index(ch) {
                        let glyph_advance =
                            face.glyph_hor_advance(glyph).unwrap_or(self.space_advance);
                        advance = advance.saturating_add(glyph_advance as u32);
                    } else {
                        advance = advance.saturating_add(self.space_advance as u32);
                    }
                }
                let units = self.units_per_em.max(1) as f32;
                return advance as f32 * (font_size / units);
            }
        }
        estimate_text_width_units(text) * font_size
    }

    /// Vertical extent of a single text line at the given point size, from
    /// the face's ascender/descender. The fallback treats the extent as the
    /// point size itself.
    pub fn vertical_extent(&self, font_size: f32) -> f32 {
        if let Some(data) = self.data.as_deref() {
            if let Ok(face) = Face::parse(data, self.face_index) {
                let units = self.units_per_em.max(1) as f32;
                let extent = face.ascender() as f32 - face.descender() as f32;
                return extent * (font_size / units);
            }
        }
        font_size
    }
}

/// Font resource for one render: shared metrics plus the per-kind size
/// table (headings grow the body size by 10/5/2).
pub struct FontStore {
    metrics: FontMetrics,
    body_size: f32,
    family: Option<String>,
}

impl FontStore {
    pub fn load(settings: &Settings) -> FontStore {
        let metrics = match settings.font_path.as_deref() {
            Some(path) => match FontMetrics::from_path(Path::new(path)) {
                Ok(metrics) => metrics,
                Err(err) => {
                    warn!("font unavailable ({err}); falling back to fixed metrics");
                    FontMetrics::fallback()
                }
            },
            None => FontMetrics::fallback(),
        };
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| settings.font_family.clone());
        FontStore {
            metrics,
            body_size: settings.font_size,
            family,
        }
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn size_for(&self, kind: BlockKind) -> f32 {
        match kind {
            BlockKind::Paragraph | BlockKind::ListItem => self.body_size,
            BlockKind::Heading1 => self.body_size + 10.0,
            BlockKind::Heading2 => self.body_size + 5.0,
            BlockKind::Heading3 => self.body_size + 2.0,
        }
    }

    /// Representative character advance used as the wrap budget divisor:
    /// the full-width glyph `一` at the line kind's size.
    pub fn avg_char_width(&self, kind: BlockKind) -> f32 {
        let width = self.metrics.measure("一", self.size_for(kind));
        if width > 0.0 {
            width
        } else {
            self.size_for(kind)
        }
    }

    /// Point size one segment is drawn and measured at. Bold spans keep the
    /// body size even inside headings.
    pub fn segment_size(&self, kind: BlockKind, bold: bool) -> f32 {
        if bold {
            self.body_size
        } else {
            self.size_for(kind)
        }
    }

    /// Pixel width of one segment at its [`segment_size`](Self::segment_size).
    pub fn measure_segment(&self, text: &str, kind: BlockKind, bold: bool) -> f32 {
        self.metrics.measure(text, self.segment_size(kind, bold))
    }
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
