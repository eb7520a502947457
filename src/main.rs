use std::io::{self, IsTerminal, Read};

use anyhow::{anyhow, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "dreamcanvas",
    version,
    about = "Compose a photo and a marked-up action plan into one shareable image"
)]
struct Cli {
    /// Source photo file (png/jpeg, may carry transparency)
    #[arg(short = 'p', long = "photo")]
    photo: String,

    /// File containing the marked-up text; stdin when omitted
    #[arg(short = 't', long = "text")]
    text: Option<String>,

    /// Name rendered into the title banner
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Directory the composite is written to (must already exist)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<String>,

    /// Omit the title banner
    #[arg(long = "no-title")]
    no_title: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dreamcanvas::logging::init(cli.verbose)?;

    let input = match &cli.text {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => {
            if io::stdin().is_terminal() {
                return Err(anyhow!("no text provided (pass --text or pipe stdin)"));
            }
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
    };

    let config = dreamcanvas::Config {
        photo: cli.photo,
        name: cli.name,
        output_dir: cli.output_dir,
        no_title: cli.no_title,
        settings_path: cli.read_settings,
    };

    let filename = dreamcanvas::run(config, input)?;
    println!("{filename}");
    Ok(())
}
