use tracing::debug;

use super::font::FontStore;
use super::parse;
use super::{ComposeError, ParsedDocument};
use crate::settings::Settings;

/// Resolved geometry for one composite render.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub photo_width: u32,
    pub photo_height: u32,
    pub text_block_width: f32,
    pub text_height: f32,
    pub title_font_size: f32,
    pub title_height: f32,
    /// Title plus its top/bottom margins; 0 for the bannerless variant.
    pub title_band_height: f32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

const TITLE_FONT_FLOOR: f32 = 10.0;

/// Resolves the circular width/height dependency between the text column
/// and the photo by fixed-point iteration.
///
/// The text sits beside the photo; the photo's displayed size follows the
/// text height, and the text column width follows the photo width. Seeded
/// with the source photo width, each pass re-measures the text and derives
/// the next column width as `image_width * 1.2 - image_text_gap`. The
/// stock budget is a fixed 3 passes with no convergence check; setting
/// `convergence_tolerance` switches to an early-exit loop capped at
/// `max_passes`. A final measurement pass at the settled width produces
/// the values actually used for rendering.
///
/// Pure and deterministic: identical inputs yield identical plans.
pub fn resolve_layout(
    source_width: u32,
    source_height: u32,
    text: &str,
    include_title: bool,
    fonts: &FontStore,
    settings: &Settings,
) -> Result<(LayoutPlan, ParsedDocument), ComposeError> {
    let mut text_block_width = (source_width as f32).max(1.0);

    let pass_budget = if settings.convergence_tolerance.is_some() {
        settings.max_passes
    } else {
        settings.passes
    };

    for pass in 0..pass_budget {
        let text_height = parse::measure_text_height(text, text_block_width, fonts, settings)?;
        let (image_width, image_height) =
            derive_image_size(source_width, source_height, text_height, settings);
        let next_width = (image_width * 1.2 - settings.image_text_gap).floor().max(1.0);
        debug!(
            pass,
            text_height = text_height as f64,
            image_width = image_width as f64,
            image_height = image_height as f64,
            next_width = next_width as f64,
            "layout pass"
        );
        if let Some(tolerance) = settings.convergence_tolerance {
            if (next_width - text_block_width).abs() <= tolerance {
                text_block_width = next_width;
                break;
            }
        }
        text_block_width = next_width;
    }

    // Final measurement at the settled width; these are the values rendered.
    let document = parse::parse_document(text, text_block_width, fonts, settings)?;
    let text_height = document.text_height;
    let (image_width, image_height) =
        derive_image_size(source_width, source_height, text_height, settings);
    let photo_width = image_width.floor() as u32;
    let photo_height = image_height.floor() as u32;

    let (title_font_size, title_height, title_band_height) = if include_title {
        size_title(image_height, fonts, settings)
    } else {
        (0.0, 0.0, 0.0)
    };

    let canvas_width = (photo_width as f32
        + text_block_width
        + settings.image_text_gap
        + settings.padding * 2.0)
        .floor() as u32;
    let canvas_height =
        (photo_height as f32 + title_band_height + settings.padding).floor() as u32;

    let plan = LayoutPlan {
        photo_width,
        photo_height,
        text_block_width,
        text_height,
        title_font_size,
        title_height,
        title_band_height,
        canvas_width,
        canvas_height,
    };
    Ok((plan, document))
}

fn derive_image_size(
    source_width: u32,
    source_height: u32,
    text_height: f32,
    settings: &Settings,
) -> (f32, f32) {
    let image_height = text_height + settings.padding * 2.0;
    // degenerate source: skip aspect scaling rather than divide by zero
    let image_width = if source_height > 0 {
        (source_width as f32 * (image_height / source_height as f32)).floor()
    } else {
        source_width as f32
    };
    (image_width, image_height)
}

/// Picks the largest title font size, from `body + 20` downward in steps
/// of 2, whose banner (title plus margins) fits within 20% of the image
/// height plus one padding unit. At the floor the overflow is accepted.
fn size_title(image_height: f32, fonts: &FontStore, settings: &Settings) -> (f32, f32, f32) {
    let budget = image_height * 0.2 + settings.padding;
    let mut font_size = settings.font_size + 20.0;
    loop {
        let title_height = fonts.metrics().vertical_extent(font_size);
        let band_height =
            settings.title_top_margin + title_height + settings.title_bottom_margin;
        if band_height <= budget || font_size <= TITLE_FONT_FLOOR {
            return (font_size, title_height, band_height);
        }
        font_size = (font_size - 2.0).max(TITLE_FONT_FLOOR);
    }
}
