use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use exif_forge::config::Config;
use exif_forge::engine::Engine;
use exif_forge::metadata::{MetaValue, MetadataTree};
use exif_forge::pipeline::{self, Action, ProcessResult};

#[derive(Parser, Debug)]
#[command(
    name = "exif-forge",
    version,
    about = "Lossless image metadata editor: show, clear, apply presets and strip AI-generation markers"
)]
#[command(group(
    ArgGroup::new("action")
        .args(["show", "scan", "clear", "preset", "apply", "strip_aigc"])
        .multiple(false)
))]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Display all metadata, grouped (default action)
    #[arg(long)]
    show: bool,

    /// Report whether each image looks AI-generated
    #[arg(long)]
    scan: bool,

    /// Remove all EXIF, PNG text and XMP metadata
    #[arg(long)]
    clear: bool,

    /// Replace metadata with the named preset from the presets directory
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Replace metadata with a metadata tree read from a JSON file
    #[arg(long, value_name = "FILE")]
    apply: Option<PathBuf>,

    /// Remove only AI-generation markers, keeping camera metadata
    #[arg(long = "strip-aigc")]
    strip_aigc: bool,

    /// With --preset/--apply: write the result as JPEG
    #[arg(long = "convert-jpg")]
    convert_jpg: bool,

    /// Write processed files here instead of over the originals
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Load config
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref dir) = cli.output_dir {
        config.output.output_dir = Some(dir.clone());
    }

    let action = if cli.scan {
        Action::Scan
    } else if cli.clear {
        Action::Clear
    } else if cli.strip_aigc {
        Action::StripAigc
    } else if let Some(ref name) = cli.preset {
        Action::Apply {
            tree: config.load_preset(name)?,
            convert: cli.convert_jpg,
        }
    } else if let Some(ref file) = cli.apply {
        let contents = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let tree: MetadataTree = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse metadata tree in {}", file.display()))?;
        Action::Apply {
            tree,
            convert: cli.convert_jpg,
        }
    } else {
        Action::Show
    };
    if cli.convert_jpg && !matches!(action, Action::Apply { .. }) {
        anyhow::bail!("--convert-jpg only applies to --preset or --apply.");
    }

    // Collect images
    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    log::info!("Found {} image(s) to process", images.len());
    if let Some(ref dir) = config.output.output_dir {
        log::info!("Writing results to {}", dir.display());
    }

    let engine = Engine::new(&config);

    // Process each image
    let mut results = Vec::new();
    let total = images.len();

    for (i, image_path) in images.iter().enumerate() {
        log::debug!("[{}/{}] Processing: {}", i + 1, total, image_path.display());

        let result = pipeline::process_image(image_path, &action, &engine, &config);

        if let Some(ref err) = result.error {
            log::error!("{}: {err}", image_path.display());
        } else if !cli.json {
            print_result(&result);
        }

        results.push(result);
    }

    // JSON output
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

fn print_result(result: &ProcessResult) {
    if let Some(ref tree) = result.metadata {
        print_metadata(result, tree);
    } else if let Some(ref verdict) = result.verdict {
        if verdict.is_aigc {
            println!(
                "{YELLOW}AIGC{RESET}  {}  {DIM}`{}` in {}{RESET}",
                result.path.display(),
                verdict.matched.as_deref().unwrap_or_default(),
                verdict.source.as_deref().unwrap_or_default()
            );
        } else {
            println!("{GREEN}clean{RESET} {}", result.path.display());
        }
    } else {
        if let (Some(output), Some(strategy)) = (&result.output, &result.strategy) {
            log::info!("  {} ({strategy})", output.display());
        }
        if !result.removed.is_empty() {
            log::info!("  Removed: {}", result.removed.join(", "));
        }
        if !result.skipped_fields.is_empty() {
            let skipped: Vec<String> = result
                .skipped_fields
                .iter()
                .map(|s| format!("{}.{}", s.group, s.name))
                .collect();
            log::info!("  Skipped: {}", skipped.join(", "));
        }
        if let Some(ref backup) = result.backup {
            log::debug!("  Backup: {}", backup.display());
        }
    }
}

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print every metadata group of a file, one section per group.
fn print_metadata(result: &ProcessResult, tree: &MetadataTree) {
    println!();
    println!("{BOLD}File:{RESET} {}", result.path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if tree.is_empty() {
        println!("  {DIM}(no metadata found){RESET}");
        println!();
        return;
    }

    for (group, fields) in tree.groups() {
        println!("  {BOLD}{group}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (name, value) in fields {
            print_row(name, &display_value(value));
        }
        println!();
    }
}

fn display_value(value: &MetaValue) -> String {
    match value {
        MetaValue::Text(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Print a single row in the metadata display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn actions_are_exclusive() {
        assert!(Cli::try_parse_from(["exif-forge", "--clear", "--strip-aigc", "a.jpg"]).is_err());
        let cli = Cli::try_parse_from(["exif-forge", "--preset", "sony_a7m4", "--convert-jpg", "a.png"]).unwrap();
        assert_eq!(cli.preset.as_deref(), Some("sony_a7m4"));
        assert!(cli.convert_jpg);
    }

    #[test]
    fn wrap_text_breaks_on_words() {
        assert_eq!(wrap_text("a bb ccc", 4), vec!["a bb", "ccc"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }
}
