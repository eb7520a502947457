use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub text_color: String,
    pub bold_text_color: String,
    pub background_color: String,
    pub font_size: f32,
    pub padding: f32,
    pub line_spacing: f32,
    pub image_text_gap: f32,
    pub list_indent: f32,
    pub bullet_radius: f32,
    pub title_top_margin: f32,
    pub title_bottom_margin: f32,
    pub include_title_band: bool,
    pub passes: u32,
    pub convergence_tolerance: Option<f32>,
    pub max_passes: u32,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub title_template: String,
    pub output_directory: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            text_color: "#323232".to_string(),
            bold_text_color: "#000000".to_string(),
            background_color: "#f5f5f5".to_string(),
            font_size: 30.0,
            padding: 40.0,
            line_spacing: 15.0,
            image_text_gap: 30.0,
            list_indent: 30.0,
            bullet_radius: 4.0,
            title_top_margin: 60.0,
            title_bottom_margin: 40.0,
            include_title_band: true,
            passes: 3,
            convergence_tolerance: None,
            max_passes: 8,
            font_path: None,
            font_family: None,
            title_template: "{name}，你的梦想一定可以实现，加油吧！".to_string(),
            output_directory: "uploads".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    theme: Option<ThemeSettings>,
    layout: Option<LayoutSettings>,
    font: Option<FontSettings>,
    title: Option<TitleSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ThemeSettings {
    text_color: Option<String>,
    bold_text_color: Option<String>,
    background_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    font_size: Option<f32>,
    padding: Option<f32>,
    line_spacing: Option<f32>,
    image_text_gap: Option<f32>,
    list_indent: Option<f32>,
    bullet_radius: Option<f32>,
    title_top_margin: Option<f32>,
    title_bottom_margin: Option<f32>,
    include_title_band: Option<bool>,
    passes: Option<u32>,
    convergence_tolerance: Option<f32>,
    max_passes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    path: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TitleSettings {
    template: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    directory: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(theme) = incoming.theme {
            if let Some(color) = theme.text_color {
                if !color.trim().is_empty() {
                    self.text_color = color;
                }
            }
            if let Some(color) = theme.bold_text_color {
                if !color.trim().is_empty() {
                    self.bold_text_color = color;
                }
            }
            if let Some(color) = theme.background_color {
                if !color.trim().is_empty() {
                    self.background_color = color;
                }
            }
        }
        if let Some(layout) = incoming.layout {
            if let Some(size) = layout.font_size {
                if size > 0.0 {
                    self.font_size = size;
                }
            }
            if let Some(padding) = layout.padding {
                if padding >= 0.0 {
                    self.padding = padding;
                }
            }
            if let Some(spacing) = layout.line_spacing {
                if spacing >= 0.0 {
                    self.line_spacing = spacing;
                }
            }
            if let Some(gap) = layout.image_text_gap {
                if gap >= 0.0 {
                    self.image_text_gap = gap;
                }
            }
            if let Some(indent) = layout.list_indent {
                if indent >= 0.0 {
                    self.list_indent = indent;
                }
            }
            if let Some(radius) = layout.bullet_radius {
                if radius > 0.0 {
                    self.bullet_radius = radius;
                }
            }
            if let Some(margin) = layout.title_top_margin {
                if margin >= 0.0 {
                    self.title_top_margin = margin;
                }
            }
            if let Some(margin) = layout.title_bottom_margin {
                if margin >= 0.0 {
                    self.title_bottom_margin = margin;
                }
            }
            if let Some(include) = layout.include_title_band {
                self.include_title_band = include;
            }
            if let Some(passes) = layout.passes {
                if passes > 0 {
                    self.passes = passes;
                }
            }
            if let Some(tolerance) = layout.convergence_tolerance {
                if tolerance > 0.0 {
                    self.convergence_tolerance = Some(tolerance);
                }
            }
            if let Some(cap) = layout.max_passes {
                if cap > 0 {
                    self.max_passes = cap;
                }
            }
        }
        if let Some(font) = incoming.font {
            if let Some(path) = font.path {
                if !path.trim().is_empty() {
                    self.font_path = Some(path);
                }
            }
            if let Some(family) = font.family {
                if !family.trim().is_empty() {
                    self.font_family = Some(family);
                }
            }
        }
        if let Some(title) = incoming.title {
            if let Some(template) = title.template {
                if !template.trim().is_empty() {
                    self.title_template = template;
                }
            }
        }
        if let Some(output) = incoming.output {
            if let Some(directory) = output.directory {
                if !directory.trim().is_empty() {
                    self.output_directory = directory;
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".dreamcanvas"))
        }
    })
}
