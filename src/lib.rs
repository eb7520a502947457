use std::path::Path;

use anyhow::{anyhow, Context, Result};

pub mod compose;
pub mod logging;
pub mod settings;

pub use compose::{
    composite, measure_text_height, parse_document, resolve_layout, BlockKind, ComposeError,
    CompositeRequest, FontMetrics, FontStore, LayoutPlan, ParsedDocument, Segment, StyledLine,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub photo: String,
    pub name: Option<String>,
    pub output_dir: Option<String>,
    pub no_title: bool,
    pub settings_path: Option<String>,
}

/// Composites `input` (the marked-up plan text) with the photo named in
/// `config` and returns the produced filename.
pub fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;

    if config.no_title {
        settings.include_title_band = false;
    }
    if let Some(dir) = config.output_dir {
        settings.output_directory = dir;
    }

    let input = input.unwrap_or_default();
    let text = input.trim();
    if text.is_empty() {
        return Err(anyhow!("no text to compose (stdin is empty)"));
    }

    let output_dir = Path::new(&settings.output_directory);
    if !output_dir.is_dir() {
        return Err(anyhow!(
            "output directory does not exist: {}",
            output_dir.display()
        ));
    }

    let request = CompositeRequest {
        photo_path: Path::new(&config.photo),
        text,
        name: config.name.as_deref(),
        output_dir,
    };
    composite(&request, &settings).with_context(|| "failed to compose image")
}
