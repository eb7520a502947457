use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbaImage;
use resvg::render;
use tiny_skia::Pixmap;
use usvg::{fontdb, Options, Tree};

use super::font::FontStore;
use super::layout::LayoutPlan;
use super::{ComposeError, ParsedDocument};
use crate::settings::Settings;

/// Rasterizes one resolved layout into PNG bytes.
///
/// The canvas is assembled as a deterministic SVG document and rendered
/// through usvg/resvg; the photo is resized with Lanczos3 (alpha
/// preserved) and embedded as a base64 data URI so the rasterizer scales
/// nothing itself.
pub(crate) fn render_composite(
    photo: &RgbaImage,
    plan: &LayoutPlan,
    document: &ParsedDocument,
    fonts: &FontStore,
    settings: &Settings,
    title: Option<&str>,
) -> Result<Vec<u8>, ComposeError> {
    if plan.photo_width == 0 || plan.photo_height == 0 {
        return Err(ComposeError::Composition(format!(
            "non-positive photo dimensions {}x{}",
            plan.photo_width, plan.photo_height
        )));
    }
    if plan.canvas_width == 0 || plan.canvas_height == 0 {
        return Err(ComposeError::Composition(format!(
            "non-positive canvas dimensions {}x{}",
            plan.canvas_width, plan.canvas_height
        )));
    }

    let resized = image::imageops::resize(
        photo,
        plan.photo_width,
        plan.photo_height,
        image::imageops::FilterType::Lanczos3,
    );
    let mut photo_png = Vec::new();
    image::DynamicImage::ImageRgba8(resized)
        .write_to(&mut Cursor::new(&mut photo_png), image::ImageFormat::Png)
        .map_err(|err| ComposeError::Composition(format!("failed to encode photo: {err}")))?;

    let svg = build_svg(&photo_png, plan, document, fonts, settings, title);
    rasterize(&svg, plan, fonts)
}

fn build_svg(
    photo_png: &[u8],
    plan: &LayoutPlan,
    document: &ParsedDocument,
    fonts: &FontStore,
    settings: &Settings,
    title: Option<&str>,
) -> String {
    let width = plan.canvas_width;
    let height = plan.canvas_height;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(photo_png));

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{fill}"/>"#,
        w = width,
        h = height,
        fill = &settings.background_color
    ));

    if let Some(title) = title {
        let title_width = fonts.metrics().measure(title, plan.title_font_size);
        let title_x = (width as f32 - title_width) / 2.0;
        let title_y = settings.title_top_margin + plan.title_height;
        push_text(
            &mut svg,
            title,
            title_x,
            title_y,
            plan.title_font_size,
            &settings.bold_text_color,
            fonts.family(),
            false,
        );
    }

    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="{x}" y="{y}" width="{w}" height="{h}"/>"#,
        uri = data_uri,
        x = settings.padding,
        y = plan.title_band_height,
        w = plan.photo_width,
        h = plan.photo_height
    ));

    let text_start_x = settings.padding + plan.photo_width as f32 + settings.image_text_gap;
    let text_start_y = plan.title_band_height + settings.padding;
    let mut y = text_start_y;

    for line in &document.lines {
        if line.is_blank() {
            y += line.advance;
            continue;
        }
        let font_size = fonts.size_for(line.kind);

        if line.bullet {
            svg.push_str(&format!(
                r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{fill}"/>"#,
                cx = text_start_x + line.indent / 2.0,
                cy = y + font_size / 2.0,
                r = settings.bullet_radius,
                fill = &settings.text_color
            ));
        }

        let mut x = text_start_x + line.indent;
        let baseline = y + font_size;
        for segment in &line.segments {
            let color = if segment.bold {
                &settings.bold_text_color
            } else {
                &settings.text_color
            };
            push_text(
                &mut svg,
                &segment.text,
                x,
                baseline,
                fonts.segment_size(line.kind, segment.bold),
                color,
                fonts.family(),
                segment.bold,
            );
            x += fonts.measure_segment(&segment.text, line.kind, segment.bold);
        }
        y += line.advance;
    }

    svg.push_str("</svg>");
    svg
}

#[allow(clippy::too_many_arguments)]
fn push_text(
    svg: &mut String,
    text: &str,
    x: f32,
    y: f32,
    font_size: f32,
    color: &str,
    family: Option<&str>,
    bold: bool,
) {
    let weight = if bold { r#" font-weight="bold""# } else { "" };
    match family {
        Some(family) => svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}"{weight} xml:space="preserve">{text}</text>"#,
            x = x,
            y = y,
            size = font_size,
            color = color,
            family = escape_xml(family),
            weight = weight,
            text = escape_xml(text)
        )),
        None => svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}"{weight} xml:space="preserve">{text}</text>"#,
            x = x,
            y = y,
            size = font_size,
            color = color,
            weight = weight,
            text = escape_xml(text)
        )),
    }
}

fn rasterize(svg: &str, plan: &LayoutPlan, fonts: &FontStore) -> Result<Vec<u8>, ComposeError> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = fonts.metrics().font_data() {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options)
        .map_err(|err| ComposeError::Composition(format!("failed to parse canvas: {err}")))?;

    let mut pixmap = Pixmap::new(plan.canvas_width, plan.canvas_height).ok_or_else(|| {
        ComposeError::Composition(format!(
            "failed to allocate {}x{} drawing surface",
            plan.canvas_width, plan.canvas_height
        ))
    })?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);

    let canvas = RgbaImage::from_raw(
        plan.canvas_width,
        plan.canvas_height,
        pixmap.data().to_vec(),
    )
    .ok_or_else(|| ComposeError::Composition("failed to build canvas buffer".to_string()))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|err| ComposeError::Composition(format!("failed to encode canvas: {err}")))?;
    Ok(png)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{parse_document, resolve_layout};

    fn fonts() -> FontStore {
        FontStore::load(&Settings::default())
    }

    // fixed wide column so short inputs stay on one line
    fn svg_at_width(text: &str, width: f32) -> String {
        let settings = Settings::default();
        let fonts = fonts();
        let document = parse_document(text, width, &fonts, &settings).expect("parse");
        let plan = LayoutPlan {
            photo_width: 100,
            photo_height: 100,
            text_block_width: width,
            text_height: document.text_height,
            title_font_size: 0.0,
            title_height: 0.0,
            title_band_height: 0.0,
            canvas_width: 800,
            canvas_height: 300,
        };
        build_svg(b"png", &plan, &document, &fonts, &settings, None)
    }

    fn svg_for(text: &str, include_title: bool) -> (String, LayoutPlan) {
        let settings = Settings::default();
        let fonts = fonts();
        let (plan, document) =
            resolve_layout(400, 600, text, include_title, &fonts, &settings).expect("resolve");
        let title = include_title.then_some("小明，加油！");
        let svg = build_svg(b"png", &plan, &document, &fonts, &settings, title);
        (svg, plan)
    }

    #[test]
    fn svg_is_deterministic() {
        let (first, _) = svg_for("# Title\nHello", true);
        let (second, _) = svg_for("# Title\nHello", true);
        assert_eq!(first, second);
    }

    #[test]
    fn background_covers_full_canvas() {
        let (svg, plan) = svg_for("Hello", false);
        let expected = format!(
            r##"<rect x="0" y="0" width="{}" height="{}" fill="#f5f5f5"/>"##,
            plan.canvas_width, plan.canvas_height
        );
        assert!(svg.contains(&expected));
    }

    #[test]
    fn list_item_bullet_sits_between_column_base_and_text() {
        let settings = Settings::default();
        let (svg, plan) = svg_for("- done", false);
        let base_x = settings.padding + plan.photo_width as f32 + settings.image_text_gap;
        let bullet_cx = base_x + settings.list_indent / 2.0;
        let text_x = base_x + settings.list_indent;
        assert!(svg.contains(&format!(r#"<circle cx="{bullet_cx}""#)));
        assert!(svg.contains(&format!(r#"<text x="{text_x}""#)));
        assert!(base_x < bullet_cx && bullet_cx < text_x);
    }

    #[test]
    fn bold_segments_use_bold_color_and_weight() {
        let svg = svg_at_width("a**b**c", 600.0);
        assert!(svg.contains(r##"fill="#000000" font-weight="bold""##));
        assert!(svg.contains(r##"fill="#323232""##));
        assert!(svg.contains(">b</text>"));
    }

    #[test]
    fn bold_inside_heading_keeps_body_size_for_draw_and_advance() {
        // the drawn size must match the size the x cursor advances by,
        // or the next segment lands on top of the bold run
        let svg = svg_at_width("# 一**二**三", 600.0);
        assert!(svg.contains(r##"font-size="30" fill="#000000" font-weight="bold""##));
        assert!(svg.contains(r##"font-size="40" fill="#323232""##));
    }

    #[test]
    fn title_band_offsets_photo_and_text() {
        let (svg, plan) = svg_for("Hello", true);
        assert!(plan.title_band_height > 0.0);
        assert!(svg.contains(&format!(r#"y="{}" width="{}""#, plan.title_band_height, plan.photo_width)));
    }

    #[test]
    fn bannerless_variant_pastes_photo_at_top() {
        let (svg, plan) = svg_for("Hello", false);
        assert!(svg.contains(&format!(r#"y="0" width="{}""#, plan.photo_width)));
    }

    #[test]
    fn xml_special_characters_are_escaped() {
        let svg = svg_at_width("a<b&c", 600.0);
        assert!(svg.contains("a&lt;b&amp;c"));
    }

    #[test]
    fn render_rejects_zero_photo_dimensions() {
        let settings = Settings::default();
        let fonts = fonts();
        let (mut plan, document) =
            resolve_layout(400, 600, "Hello", false, &fonts, &settings).expect("resolve");
        plan.photo_width = 0;
        let photo = RgbaImage::new(4, 4);
        let err = render_composite(&photo, &plan, &document, &fonts, &settings, None).unwrap_err();
        assert!(matches!(err, ComposeError::Composition(_)));
    }

    #[test]
    fn measured_height_equals_rendered_line_advances() {
        // the renderer advances y by exactly the advances the dry run summed
        let settings = Settings::default();
        let fonts = fonts();
        let (plan, document) = resolve_layout(
            400,
            600,
            "# 标题\n正文\n\n* 条目",
            false,
            &fonts,
            &settings,
        )
        .expect("resolve");
        let rendered: f32 = document.lines.iter().map(|line| line.advance).sum();
        assert_eq!(rendered, document.text_height);
        assert_eq!(plan.text_height, document.text_height);
    }
}
