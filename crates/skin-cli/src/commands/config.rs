//! skin config command - print or save a parameter file.

use std::path::Path;

use anyhow::{Context, Result};

use crate::{Cli, Preset, output};

/// Render a preset as TOML or JSON.
fn render(preset: Preset, json: bool) -> Result<String> {
    let params = preset.params();
    let text = if json { params.to_json()? } else { params.to_toml()? };
    Ok(text)
}

pub fn run(preset: Preset, json: bool, output_path: Option<&Path>, cli: &Cli) -> Result<()> {
    let text = render(preset, json)?;

    match output_path {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
            output::success(
                &format!("Parameters saved to {}", path.display()),
                cli.format,
                cli.quiet,
            );
        }
        // The file body is the result; print it regardless of --format.
        None => {
            if !cli.quiet {
                println!("{}", text.trim_end());
            }
        }
    }

    Ok(())
}
