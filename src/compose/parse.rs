use super::font::FontStore;
use super::{BlockKind, ComposeError, ParsedDocument, Segment, StyledLine};
use crate::settings::Settings;

/// Parses and wraps a marked-up text block at `max_width` pixels.
///
/// Line-oriented: each physical line is trimmed and classified on its own
/// (longest marker prefix first), then broken into chunks of at most
/// `chars_per_line` characters, where the budget divides the available
/// width by the advance of a representative full-width glyph. Whitespace
/// inside a line is preserved, never collapsed.
pub fn parse_document(
    text: &str,
    max_width: f32,
    fonts: &FontStore,
    settings: &Settings,
) -> Result<ParsedDocument, ComposeError> {
    if max_width <= 0.0 {
        return Err(ComposeError::InvalidLayoutInput(format!(
            "wrap width must be positive, got {max_width}"
        )));
    }

    if text.is_empty() {
        return Ok(ParsedDocument {
            lines: Vec::new(),
            text_height: 0.0,
        });
    }

    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            lines.push(StyledLine::blank(settings.line_spacing));
            continue;
        }

        let (kind, content) = classify_line(trimmed);
        let indent = if kind == BlockKind::ListItem {
            settings.list_indent
        } else {
            0.0
        };

        let font_size = fonts.size_for(kind);
        let avg_char_width = fonts.avg_char_width(kind);
        let chars_per_line = (((max_width - indent) / avg_char_width).floor() as i64).max(1) as usize;

        for (i, chunk) in chunk_chars(content, chars_per_line).into_iter().enumerate() {
            lines.push(StyledLine {
                segments: split_bold(&chunk),
                kind,
                indent,
                bullet: kind == BlockKind::ListItem && i == 0,
                advance: font_size + settings.line_spacing,
            });
        }
    }

    let text_height = lines.iter().map(|line| line.advance).sum();
    Ok(ParsedDocument { lines, text_height })
}

/// Dry-run measurement: the height the document needs at `max_width`,
/// without touching any drawing surface.
pub fn measure_text_height(
    text: &str,
    max_width: f32,
    fonts: &FontStore,
    settings: &Settings,
) -> Result<f32, ComposeError> {
    Ok(parse_document(text, max_width, fonts, settings)?.text_height)
}

/// Longest-prefix-first marker matching; `###` must never classify as `#`.
fn classify_line(line: &str) -> (BlockKind, &str) {
    if let Some(rest) = line.strip_prefix("### ") {
        (BlockKind::Heading3, rest)
    } else if let Some(rest) = line.strip_prefix("## ") {
        (BlockKind::Heading2, rest)
    } else if let Some(rest) = line.strip_prefix("# ") {
        (BlockKind::Heading1, rest)
    } else if let Some(rest) = line.strip_prefix("* ").or_else(|| line.strip_prefix("- ")) {
        (BlockKind::ListItem, rest)
    } else {
        (BlockKind::Paragraph, line)
    }
}

/// Breaks `text` into chunks of at most `chars_per_line` characters. The
/// `**` delimiters still count toward the budget; whitespace is kept as-is.
fn chunk_chars(text: &str, chars_per_line: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chars_per_line.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Naive `**` toggle within one wrapped chunk: alternate parts are bold,
/// starting from non-bold. An odd delimiter count leaves the trailing
/// segment in whatever state it toggled to; the toggle never carries over
/// to the next chunk.
fn split_bold(chunk: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut bold = false;
    for part in chunk.split("**") {
        if !part.is_empty() {
            segments.push(Segment {
                text: part.to_string(),
                bold,
            });
        }
        bold = !bold;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fonts() -> FontStore {
        FontStore::load(&Settings::default())
    }

    fn parse(text: &str, max_width: f32) -> ParsedDocument {
        parse_document(text, max_width, &fonts(), &Settings::default()).expect("parse")
    }

    #[test]
    fn empty_text_has_zero_lines_and_zero_height() {
        let document = parse("", 600.0);
        assert!(document.lines.is_empty());
        assert_eq!(document.text_height, 0.0);
    }

    #[test]
    fn whitespace_only_line_still_advances() {
        let document = parse("   ", 600.0);
        assert_eq!(document.lines.len(), 1);
        assert!(document.lines[0].is_blank());
        assert_eq!(document.text_height, 15.0);
    }

    #[test]
    fn plain_paragraph_is_default_kind() {
        let document = parse("你好世界", 600.0);
        assert_eq!(document.lines.len(), 1);
        assert_eq!(document.lines[0].kind, BlockKind::Paragraph);
        assert_eq!(document.lines[0].indent, 0.0);
        assert_eq!(document.lines[0].advance, 45.0);
    }

    #[test]
    fn heading_markers_longest_prefix_first() {
        let document = parse("### H3", 600.0);
        assert_eq!(document.lines[0].kind, BlockKind::Heading3);
        let document = parse("## H2", 600.0);
        assert_eq!(document.lines[0].kind, BlockKind::Heading2);
        let document = parse("# H1", 600.0);
        assert_eq!(document.lines[0].kind, BlockKind::Heading1);
    }

    #[test]
    fn h3_is_never_classified_as_h1() {
        let document = parse("### 标题", 600.0);
        assert_ne!(document.lines[0].kind, BlockKind::Heading1);
        assert_eq!(document.lines[0].kind, BlockKind::Heading3);
        // the marker itself is stripped
        assert_eq!(document.lines[0].segments[0].text, "标题");
    }

    #[test]
    fn list_item_gets_indent_and_bullet() {
        let document = parse("- done", 600.0);
        let line = &document.lines[0];
        assert_eq!(line.kind, BlockKind::ListItem);
        assert_eq!(line.indent, 30.0);
        assert!(line.bullet);
        assert_eq!(line.segments[0].text, "done");
    }

    #[test]
    fn star_marker_is_also_a_list_item() {
        let document = parse("* item", 600.0);
        assert_eq!(document.lines[0].kind, BlockKind::ListItem);
    }

    #[test]
    fn list_continuation_chunks_suppress_bullet() {
        // width for exactly 4 full-width chars after the indent
        let settings = Settings::default();
        let fonts = fonts();
        let avg = fonts.avg_char_width(BlockKind::ListItem);
        let width = settings.list_indent + avg * 4.0 + 0.5;
        let document = parse_document("- 一二三四五六七", width, &fonts, &settings).expect("parse");
        assert!(document.lines.len() >= 2);
        assert!(document.lines[0].bullet);
        assert!(!document.lines[1].bullet);
        assert_eq!(document.lines[1].indent, settings.list_indent);
        assert_eq!(document.lines[1].kind, BlockKind::ListItem);
    }

    #[test]
    fn wrapped_chunks_never_exceed_char_budget() {
        let settings = Settings::default();
        let fonts = fonts();
        let avg = fonts.avg_char_width(BlockKind::Paragraph);
        let width = avg * 7.0 + 0.5;
        let text = "一二三四五六七八九十一二三四五六七八九十";
        let document = parse_document(text, width, &fonts, &settings).expect("parse");
        for line in &document.lines {
            let chars: usize = line.segments.iter().map(|s| s.text.chars().count()).sum();
            assert!(chars <= 7, "chunk of {chars} chars exceeds budget 7");
        }
    }

    #[test]
    fn whitespace_runs_are_preserved() {
        let document = parse("a  b", 600.0);
        assert_eq!(document.lines[0].segments[0].text, "a  b");
    }

    #[test]
    fn bold_toggle_parity_even() {
        let document = parse("a**b**c", 600.0);
        let segments = &document.lines[0].segments;
        assert_eq!(
            segments,
            &vec![
                Segment { text: "a".into(), bold: false },
                Segment { text: "b".into(), bold: true },
                Segment { text: "c".into(), bold: false },
            ]
        );
    }

    #[test]
    fn bold_toggle_parity_odd_leaves_last_segment_bold() {
        let document = parse("a**b", 600.0);
        let segments = &document.lines[0].segments;
        assert_eq!(
            segments,
            &vec![
                Segment { text: "a".into(), bold: false },
                Segment { text: "b".into(), bold: true },
            ]
        );
    }

    #[test]
    fn blank_lines_advance_by_line_spacing() {
        let document = parse("a\n\nb", 600.0);
        assert_eq!(document.lines.len(), 3);
        assert!(document.lines[1].is_blank());
        assert_eq!(document.text_height, 45.0 + 15.0 + 45.0);
    }

    #[test]
    fn heading_lines_are_taller_than_paragraphs() {
        let document = parse("# 大\n平", 600.0);
        assert_eq!(document.lines[0].advance, 40.0 + 15.0);
        assert_eq!(document.lines[1].advance, 30.0 + 15.0);
    }

    #[test]
    fn bare_marker_trims_to_plain_text() {
        // "# " trims to "#" before classification, so no heading survives
        let document = parse("# ", 600.0);
        assert_eq!(document.lines.len(), 1);
        assert_eq!(document.lines[0].kind, BlockKind::Paragraph);
        assert_eq!(document.lines[0].segments[0].text, "#");
    }

    #[test]
    fn non_positive_width_is_invalid_input() {
        let err = parse_document("hi", 0.0, &fonts(), &Settings::default()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidLayoutInput(_)));
        let err = parse_document("hi", -5.0, &fonts(), &Settings::default()).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidLayoutInput(_)));
    }

    #[test]
    fn narrow_width_still_fits_one_char_per_line() {
        let document = parse("一二三", 1.0);
        assert_eq!(document.lines.len(), 3);
    }

    #[test]
    fn measure_matches_parse_height() {
        let fonts = fonts();
        let settings = Settings::default();
        let text = "# 标题\n正文内容\n* 条目";
        let height = measure_text_height(text, 500.0, &fonts, &settings).expect("measure");
        let document = parse_document(text, 500.0, &fonts, &settings).expect("parse");
        assert_eq!(height, document.text_height);
    }
}
