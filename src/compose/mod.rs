//! Composite-image layout engine: marked-up text + source photo in, one
//! well-proportioned PNG out.

mod font;
mod layout;
mod parse;
mod render;

pub use font::{FontMetrics, FontStore};
pub use layout::{resolve_layout, LayoutPlan};
pub use parse::{measure_text_height, parse_document};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid layout input: {0}")]
    InvalidLayoutInput(String),

    #[error("photo not found or unreadable: {0}")]
    ImageNotFound(PathBuf),

    #[error("composition failed: {0}")]
    Composition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Block classification of one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    ListItem,
}

/// One run of same-styled text within a wrapped line.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub bold: bool,
}

/// One wrapped, style-annotated line ready for measurement or drawing.
///
/// A blank source line becomes a segment-less `StyledLine` whose `advance`
/// is exactly one line spacing. `bullet` is set only on the first wrapped
/// chunk of a list item; continuation chunks keep the indent but draw no
/// glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledLine {
    pub segments: Vec<Segment>,
    pub kind: BlockKind,
    pub indent: f32,
    pub bullet: bool,
    /// Vertical advance in pixels: `font_size(kind) + line_spacing`, or one
    /// line spacing for a blank line.
    pub advance: f32,
}

impl StyledLine {
    pub(crate) fn blank(line_spacing: f32) -> Self {
        Self {
            segments: Vec::new(),
            kind: BlockKind::Paragraph,
            indent: 0.0,
            bullet: false,
            advance: line_spacing,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Wrapped text at a specific wrap width. Recomputed whenever the width
/// changes; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub lines: Vec<StyledLine>,
    /// Sum of line advances; computable with no drawing surface.
    pub text_height: f32,
}

/// Inputs for one composite render.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    pub photo_path: &'a Path,
    pub text: &'a str,
    /// Personalizes the title banner; `None` falls back to the bannerless
    /// variant even when the band is enabled in settings.
    pub name: Option<&'a str>,
    /// Must already exist; the engine does not create it.
    pub output_dir: &'a Path,
}

/// Lays out and renders one composite image, writing it under a fresh
/// `composite_<uuid>.png` name in the output directory. Returns the
/// filename.
pub fn composite(request: &CompositeRequest<'_>, settings: &Settings) -> Result<String, ComposeError> {
    let photo = load_photo(request.photo_path)?;

    let fonts = FontStore::load(settings);
    let include_title = settings.include_title_band && request.name.is_some();

    let (plan, document) = resolve_layout(
        photo.width(),
        photo.height(),
        request.text,
        include_title,
        &fonts,
        settings,
    )?;
    debug!(
        canvas_width = plan.canvas_width,
        canvas_height = plan.canvas_height,
        text_block_width = plan.text_block_width as f64,
        "layout resolved"
    );

    let title_text = if include_title {
        request
            .name
            .map(|name| settings.title_template.replace("{name}", name))
    } else {
        None
    };

    let png = render::render_composite(
        &photo,
        &plan,
        &document,
        &fonts,
        settings,
        title_text.as_deref(),
    )?;

    let filename = format!("composite_{}.png", Uuid::new_v4());
    let output_path = request.output_dir.join(&filename);
    fs::write(&output_path, png)?;

    Ok(filename)
}

fn load_photo(path: &Path) -> Result<image::RgbaImage, ComposeError> {
    if !path.exists() {
        return Err(ComposeError::ImageNotFound(path.to_path_buf()));
    }
    let photo = image::open(path).map_err(|_| ComposeError::ImageNotFound(path.to_path_buf()))?;
    Ok(photo.to_rgba8())
}
