use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use image::ImageFormat;

use crate::config::Config;
use crate::engine::{Engine, Outcome, SkippedField};
use crate::error;
use crate::metadata::MetadataTree;
use crate::scanner::ProvenanceVerdict;
use crate::strategy::Strategy;

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &[
    // Lossless segment patching
    "jpg", "jpeg",
    // Lossless re-encode with metadata grafted back
    "png", "webp",
    // Re-encode only; no metadata carried
    "tif", "tiff", "bmp", "gif",
];

/// Container format of an image file.
///
/// The format decides how metadata can be rewritten (see [`crate::strategy`]).
/// Detection by extension is used when collecting files; the engine itself
/// always sniffs the content with [`ImageKind::sniff`].
///
/// # Example
///
/// ```rust
/// use exif_forge::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("photo.JPG")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("photo.heic")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
    Tiff,
    Bmp,
    Gif,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detect the container from its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes).ok().and_then(Self::from_format)
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
            Self::Tiff => ImageFormat::Tiff,
            Self::Bmp => ImageFormat::Bmp,
            Self::Gif => ImageFormat::Gif,
        }
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
        }
    }

    /// Whether an EXIF block can be attached to this container.
    pub fn carries_exif(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::WebP)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
        })
    }
}

/// What to do with each collected file.
#[derive(Debug, Clone)]
pub enum Action {
    /// Print the metadata tree.
    Show,
    /// Classify the file as AI-generated or not.
    Scan,
    /// Remove all metadata.
    Clear,
    /// Replace the metadata with a preset or user tree; `convert` outputs JPEG.
    Apply { tree: MetadataTree, convert: bool },
    /// Remove only the provenance markers.
    StripAigc,
}

/// The result of processing a single image.
///
/// # Example
///
/// ```rust,no_run
/// use exif_forge::config::Config;
/// use exif_forge::engine::Engine;
/// use exif_forge::pipeline::{process_image, Action};
/// use std::path::Path;
///
/// let config = Config::default();
/// let engine = Engine::new(&config);
/// let result = process_image(Path::new("render.png"), &Action::StripAigc, &engine, &config);
///
/// if result.error.is_none() {
///     println!("Removed: {:?}", result.removed);
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// Where the rewritten file went, for writing actions.
    pub output: Option<PathBuf>,
    /// Metadata as read, for `Show`.
    pub metadata: Option<MetadataTree>,
    /// Verdict, for `Scan`.
    pub verdict: Option<ProvenanceVerdict>,
    pub strategy: Option<Strategy>,
    pub skipped_fields: Vec<SkippedField>,
    pub removed: Vec<String>,
    pub backup: Option<PathBuf>,
    pub error: Option<String>,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output: None,
            metadata: None,
            verdict: None,
            strategy: None,
            skipped_fields: Vec::new(),
            removed: Vec::new(),
            backup: None,
            error: None,
        }
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files with supported image extensions
/// are included.
///
/// # Example
///
/// ```rust,no_run
/// use exif_forge::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("render.png"),    // single file
///     PathBuf::from("./outputs/"),    // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Create a backup of the original file.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Where the processed version of `input` goes: next to it, or under
/// `output.output_dir` with the same file name.
pub fn output_path(input: &Path, config: &Config) -> PathBuf {
    match (&config.output.output_dir, input.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => input.to_path_buf(),
    }
}

/// Run one action on one file.
///
/// Errors never escape: they are recorded in [`ProcessResult::error`] so a
/// batch can carry on. When the output replaces the input and
/// `output.backup_originals` is set, a `.bak` copy is made first.
pub fn process_image(path: &Path, action: &Action, engine: &Engine, config: &Config) -> ProcessResult {
    let mut result = ProcessResult::new(path);

    match action {
        Action::Show => match engine.read_metadata(path) {
            Ok(tree) => result.metadata = Some(tree),
            Err(e) => result.error = Some(format!("Failed to read file: {e}")),
        },
        Action::Scan => match engine.scan_provenance(path) {
            Ok(verdict) => result.verdict = Some(verdict),
            Err(e) => result.error = Some(format!("Failed to read file: {e}")),
        },
        Action::Clear => rewrite(&mut result, config, false, |out| engine.clear(path, out)),
        Action::Apply { tree, convert } => rewrite(&mut result, config, *convert, |out| {
            engine.modify(path, out, tree, *convert)
        }),
        Action::StripAigc => {
            rewrite(&mut result, config, false, |out| engine.strip_provenance(path, out))
        }
    }

    result
}

/// Back up the input when the output replaces it, then run `op` against the
/// output path and record its outcome.
fn rewrite(
    result: &mut ProcessResult,
    config: &Config,
    to_jpeg: bool,
    op: impl FnOnce(&Path) -> error::Result<Outcome>,
) {
    let path = result.path.clone();
    let output = output_path(&path, config);
    let in_place = output == path || (to_jpeg && output.with_extension("jpg") == path);
    if in_place && config.output.backup_originals {
        match backup_file(&path) {
            Ok(backup) => result.backup = Some(backup),
            Err(e) => {
                result.error = Some(format!("{e:#}"));
                return;
            }
        }
    }

    match op(&output) {
        Ok(outcome) => {
            result.output = Some(outcome.output);
            result.strategy = Some(outcome.strategy);
            result.skipped_fields = outcome.skipped_fields;
            result.removed = outcome.removed;
        }
        Err(e) => result.error = Some(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png;
    use crate::test_support::{jpeg_fixture, png_fixture};
    use std::fs;
    use tempfile::TempDir;

    // ── ImageKind::from_path ──────────────────────────────────────────

    #[test]
    fn image_kind_jpeg() {
        assert_eq!(ImageKind::from_path(Path::new("photo.jpg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("photo.jpeg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("PHOTO.JPG")), Some(ImageKind::Jpeg));
    }

    #[test]
    fn image_kind_others() {
        assert_eq!(ImageKind::from_path(Path::new("image.PNG")), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_path(Path::new("image.webp")), Some(ImageKind::WebP));
        assert_eq!(ImageKind::from_path(Path::new("scan.tif")), Some(ImageKind::Tiff));
        assert_eq!(ImageKind::from_path(Path::new("scan.tiff")), Some(ImageKind::Tiff));
        assert_eq!(ImageKind::from_path(Path::new("a.bmp")), Some(ImageKind::Bmp));
        assert_eq!(ImageKind::from_path(Path::new("a.gif")), Some(ImageKind::Gif));
    }

    #[test]
    fn image_kind_unsupported() {
        assert_eq!(ImageKind::from_path(Path::new("photo.heic")), None);
        assert_eq!(ImageKind::from_path(Path::new("doc.pdf")), None);
        assert_eq!(ImageKind::from_path(Path::new("noext")), None);
    }

    // ── ImageKind::sniff ─────────────────────────────────────────────

    #[test]
    fn sniff_ignores_extension() {
        assert_eq!(ImageKind::sniff(&jpeg_fixture()), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(&png_fixture()), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(b"plain text"), None);
    }

    #[test]
    fn format_mapping_is_consistent() {
        for kind in [
            ImageKind::Jpeg,
            ImageKind::Png,
            ImageKind::WebP,
            ImageKind::Tiff,
            ImageKind::Bmp,
            ImageKind::Gif,
        ] {
            assert_eq!(ImageKind::from_format(kind.image_format()), Some(kind));
            let name = format!("x.{}", kind.extension());
            assert_eq!(ImageKind::from_path(Path::new(&name)), Some(kind));
        }
        assert_eq!(ImageKind::from_format(ImageFormat::Avif), None);
    }

    // ── is_supported_image ───────────────────────────────────────────

    #[test]
    fn supported_image_extensions() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.tif")));
        assert!(is_supported_image(Path::new("photo.gif")));
    }

    #[test]
    fn unsupported_image_extensions() {
        assert!(!is_supported_image(Path::new("photo.heic")));
        assert!(!is_supported_image(Path::new("video.mp4")));
        assert!(!is_supported_image(Path::new("readme.txt")));
        assert!(!is_supported_image(Path::new("noext")));
    }

    // ── collect_images ───────────────────────────────────────────────

    #[test]
    fn collect_images_single_file() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("test.jpg");
        fs::write(&jpg, b"fake").unwrap();

        let images = collect_images(&[jpg.clone()]);
        assert_eq!(images, vec![jpg]);
    }

    #[test]
    fn collect_images_skips_unsupported() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("readme.txt");
        fs::write(&txt, b"hello").unwrap();

        assert!(collect_images(&[txt]).is_empty());
    }

    #[test]
    fn collect_images_directory_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        fs::write(dir.path().join("a.jpg"), b"fake").unwrap();
        fs::write(sub.join("b.png"), b"fake").unwrap();
        fs::write(sub.join("c.txt"), b"fake").unwrap();

        let images = collect_images(&[dir.path().to_path_buf()]);
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn collect_images_nonexistent_path() {
        assert!(collect_images(&[PathBuf::from("/nonexistent/path")]).is_empty());
    }

    // ── backup_file / output_path ────────────────────────────────────

    #[test]
    fn backup_keeps_first_copy() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("a.jpg");
        fs::write(&jpg, b"first").unwrap();

        let backup = backup_file(&jpg).unwrap();
        assert_eq!(backup, dir.path().join("a.jpg.bak"));
        fs::write(&jpg, b"second").unwrap();
        backup_file(&jpg).unwrap();
        assert_eq!(fs::read(&backup).unwrap(), b"first");
    }

    #[test]
    fn output_path_honours_output_dir() {
        let mut config = Config::default();
        let input = Path::new("/photos/a.png");
        assert_eq!(output_path(input, &config), input);

        config.output.output_dir = Some(PathBuf::from("/out"));
        assert_eq!(output_path(input, &config), PathBuf::from("/out/a.png"));
    }

    // ── process_image ────────────────────────────────────────────────

    #[test]
    fn scan_then_strip_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("render.png");
        let bytes = png::graft(
            &png_fixture(),
            &[png::text_chunk("parameters", "Steps: 20, Model: sdxl")],
        )
        .unwrap();
        fs::write(&path, &bytes).unwrap();

        let config = Config::default();
        let engine = Engine::new(&config);

        let scan = process_image(&path, &Action::Scan, &engine, &config);
        let verdict = scan.verdict.unwrap();
        assert!(verdict.is_aigc);
        assert_eq!(verdict.matched.as_deref(), Some("sdxl"));

        let strip = process_image(&path, &Action::StripAigc, &engine, &config);
        assert!(strip.error.is_none(), "{:?}", strip.error);
        assert_eq!(strip.removed, vec!["PNG parameters".to_string()]);
        assert_eq!(strip.backup, Some(dir.path().join("render.png.bak")));
        assert_eq!(fs::read(dir.path().join("render.png.bak")).unwrap(), bytes);

        let rescan = process_image(&path, &Action::Scan, &engine, &config);
        assert!(!rescan.verdict.unwrap().is_aigc);
    }

    #[test]
    fn clear_into_output_dir_leaves_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, jpeg_fixture()).unwrap();

        let mut config = Config::default();
        config.output.output_dir = Some(dir.path().join("out"));
        let engine = Engine::new(&config);

        let result = process_image(&path, &Action::Clear, &engine, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.output, Some(dir.path().join("out").join("a.jpg")));
        assert!(result.backup.is_none());
        assert!(!dir.path().join("a.jpg.bak").exists());
    }

    #[test]
    fn read_only_actions_never_back_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, jpeg_fixture()).unwrap();

        let config = Config::default();
        let engine = Engine::new(&config);
        for action in [Action::Show, Action::Scan] {
            let result = process_image(&path, &action, &engine, &config);
            assert!(result.error.is_none(), "{:?}", result.error);
            assert!(result.backup.is_none());
            assert!(result.output.is_none());
        }
        assert!(!dir.path().join("a.jpg.bak").exists());
    }

    #[test]
    fn apply_in_place_backs_up_then_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        let original = jpeg_fixture();
        fs::write(&path, &original).unwrap();

        let config = Config::default();
        let engine = Engine::new(&config);
        let tree: MetadataTree = serde_json::from_str(r#"{"0th": {"Make": "SONY"}}"#).unwrap();
        let action = Action::Apply { tree, convert: true };

        let result = process_image(&path, &action, &engine, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.output, Some(path.clone()));
        assert_eq!(fs::read(dir.path().join("a.jpg.bak")).unwrap(), original);
    }

    #[test]
    fn failure_is_recorded_not_raised() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();

        let mut config = Config::default();
        config.output.backup_originals = false;
        let engine = Engine::new(&config);

        let result = process_image(&path, &Action::Clear, &engine, &config);
        assert!(result.error.is_some());
        assert_eq!(fs::read(&path).unwrap(), b"not really a jpeg");
    }
}
