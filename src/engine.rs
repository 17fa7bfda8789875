//! The rewrite orchestrator: clear, modify and strip-provenance.
//!
//! Every operation follows the same shape:
//!
//! 1. read the input into memory and sniff its container
//! 2. plan the target metadata (EXIF blob, PNG text chunks, XMP removal)
//! 3. apply the chosen [`Strategy`], stepping down the fallback ladder on codec errors
//! 4. verify the result and write it atomically next to the destination
//!
//! The input file is never touched unless it is also the output, and then only
//! by the final rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::exif::{self, EncodedField, ExifCodec, TiffCodec, tags};
use crate::image_codec::{ImageCodec, RasterCodec};
use crate::metadata::{Group, MetaValue, MetadataTree};
use crate::pipeline::ImageKind;
use crate::png::{self, RawChunk, TextChunk};
use crate::scanner::{ProvenanceScanner, ProvenanceVerdict};
use crate::strategy::{self, Operation, Strategy};
use crate::{jpeg, xmp};

/// Entry in [`Outcome::removed`] when the whole EXIF block was lost because
/// the output could not carry it.
pub const EXIF_DROPPED: &str = "EXIF (all; container cannot carry it)";

/// Knobs the engine takes from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// JPEG quality used when converting to JPEG.
    pub convert_quality: u8,
    /// PNG text keys removed by strip-provenance.
    pub png_strip_keys: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            convert_quality: config.output.convert_quality,
            png_strip_keys: config.provenance.png_strip_keys,
        }
    }
}

/// A field from a write request that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedField {
    pub group: String,
    pub name: String,
    pub reason: String,
}

impl SkippedField {
    fn new(group: Group, name: &str, reason: impl ToString) -> Self {
        Self {
            group: group.name().to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What an operation produced.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub output: PathBuf,
    pub strategy: Strategy,
    pub skipped_fields: Vec<SkippedField>,
    /// Fields and blocks removed by strip-provenance, e.g. `Exif.UserComment`.
    pub removed: Vec<String>,
}

enum ExifPlan {
    Keep,
    Remove,
    Replace(Vec<u8>),
}

struct Source {
    path: PathBuf,
    bytes: Vec<u8>,
    kind: ImageKind,
    exif: Option<Vec<u8>>,
}

struct Plan {
    op: Operation,
    convert: bool,
    exif: ExifPlan,
    /// Text chunks for a PNG output.
    text: Vec<RawChunk>,
    /// Colour chunks carried across a PNG re-encode.
    carried: Vec<RawChunk>,
    strip_xmp: bool,
    skipped: Vec<SkippedField>,
    removed: Vec<String>,
}

impl Plan {
    fn new(op: Operation) -> Self {
        Self {
            op,
            convert: false,
            exif: ExifPlan::Keep,
            text: Vec::new(),
            carried: Vec::new(),
            strip_xmp: false,
            skipped: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Stateless metadata engine.
pub struct Engine {
    exif: Box<dyn ExifCodec>,
    image: Box<dyn ImageCodec>,
    scanner: ProvenanceScanner,
    settings: EngineSettings,
}

impl Engine {
    /// Engine with the shipped codecs, configured from `config`.
    pub fn new(config: &Config) -> Self {
        Self::with_codecs(
            Box::new(TiffCodec::new()),
            Box::new(RasterCodec),
            ProvenanceScanner::new(config.provenance.keywords.iter().cloned()),
            EngineSettings {
                convert_quality: config.output.convert_quality,
                png_strip_keys: config.provenance.png_strip_keys.clone(),
            },
        )
    }

    pub fn with_codecs(
        exif: Box<dyn ExifCodec>,
        image: Box<dyn ImageCodec>,
        scanner: ProvenanceScanner,
        settings: EngineSettings,
    ) -> Self {
        Self {
            exif,
            image,
            scanner,
            settings,
        }
    }

    /// Read the metadata tree of a file. Only I/O errors are reported; anything
    /// undecodable is simply absent from the tree.
    pub fn read_metadata(&self, path: &Path) -> Result<MetadataTree> {
        let bytes = fs::read(path)?;
        Ok(self.read_metadata_bytes(&bytes))
    }

    pub fn read_metadata_bytes(&self, bytes: &[u8]) -> MetadataTree {
        exif::read_metadata(self.exif.as_ref(), bytes)
    }

    /// Read a file's metadata and classify it.
    pub fn scan_provenance(&self, path: &Path) -> Result<ProvenanceVerdict> {
        let tree = self.read_metadata(path)?;
        Ok(self.scanner.scan(&tree))
    }

    pub fn scanner(&self) -> &ProvenanceScanner {
        &self.scanner
    }

    /// Remove all EXIF, text chunks and XMP.
    pub fn clear(&self, input: &Path, output: &Path) -> Result<Outcome> {
        let src = self.load(input)?;
        let mut plan = Plan::new(Operation::Clear);
        plan.exif = ExifPlan::Remove;
        plan.strip_xmp = true;
        if src.kind == ImageKind::Png {
            plan.carried = png::carried_chunks(&src.bytes).unwrap_or_default();
        }
        self.run(&src, plan, output)
    }

    /// Replace the file's metadata with `target`.
    ///
    /// IFD groups are encoded into a fresh EXIF blob; `PNG Info` becomes text
    /// chunks when the output is PNG. With `convert` the output is JPEG and
    /// gets a `.jpg` extension.
    pub fn modify(
        &self,
        input: &Path,
        output: &Path,
        target: &MetadataTree,
        convert: bool,
    ) -> Result<Outcome> {
        let src = self.load(input)?;
        let mut plan = Plan::new(Operation::Modify);
        plan.convert = convert;

        let (fields, skipped) = encodable_fields(target);
        plan.skipped = skipped;
        plan.exif = if fields.is_empty() {
            ExifPlan::Remove
        } else {
            let blob = self.exif.encode(&fields).map_err(|e| processing(&src.path, e))?;
            ExifPlan::Replace(blob)
        };

        if target.group(Group::Xmp).is_some() {
            plan.skipped
                .push(SkippedField::new(Group::Xmp, "*", "XMP writing is not supported"));
        }

        let png_output = !convert && src.kind == ImageKind::Png;
        if png_output {
            let info = target.group(Group::PngInfo);
            let existing = png::text_chunks(&src.bytes).unwrap_or_default();
            let replaced = |keyword: &str| info.is_some_and(|f| f.contains_key(keyword));
            plan.text = existing
                .into_iter()
                .filter(|c| !replaced(&c.keyword))
                .map(|c| c.raw)
                .collect();
            let opaque = png::opaque_text_chunks(&src.bytes).unwrap_or_default();
            plan.text.extend(
                opaque
                    .into_iter()
                    .filter(|c| c.keyword().is_none_or(|k| !replaced(&k))),
            );
            for (key, value) in info.into_iter().flatten() {
                plan.text.push(png::text_chunk(key, &text_of(value)));
            }
            plan.carried = png::carried_chunks(&src.bytes).unwrap_or_default();
        } else if let Some(info) = target.group(Group::PngInfo) {
            for key in info.keys() {
                plan.skipped
                    .push(SkippedField::new(Group::PngInfo, key, "output is not PNG"));
            }
        }

        for skip in &plan.skipped {
            log::warn!("Skipping {}.{}: {}", skip.group, skip.name, skip.reason);
        }

        let output = if convert {
            output.with_extension("jpg")
        } else {
            output.to_path_buf()
        };
        self.run(&src, plan, &output)
    }

    /// Remove only the fields that indicate AI generation.
    ///
    /// `Exif.UserComment` always goes; `0th.ImageDescription` and `0th.Software`
    /// go when their own text matches. The configured PNG keys and a matching
    /// PNG XMP chunk are removed, and JPEG loses every XMP segment. The rest of
    /// the EXIF block keeps its exact values.
    pub fn strip_provenance(&self, input: &Path, output: &Path) -> Result<Outcome> {
        let src = self.load(input)?;
        let mut plan = Plan::new(Operation::StripProvenance);

        if let Some(blob) = &src.exif {
            match self.exif.decode(blob) {
                Ok(tree) => {
                    let drop = self.provenance_tags(&tree);
                    if !drop.is_empty() {
                        let stripped = self
                            .exif
                            .retain(blob, &drop)
                            .map_err(|e| processing(&src.path, e))?;
                        for (group, id) in &drop {
                            if let Some(desc) = tags::by_id(*group, *id) {
                                plan.removed.push(format!("{group}.{}", desc.name));
                            }
                        }
                        plan.exif = ExifPlan::Replace(stripped);
                    }
                }
                Err(e) => log::warn!(
                    "Undecodable EXIF in {}; leaving it as is: {e}",
                    src.path.display()
                ),
            }
        }

        if src.kind == ImageKind::Png {
            let chunks = png::text_chunks(&src.bytes).unwrap_or_default();
            let (dropped, kept): (Vec<TextChunk>, Vec<TextChunk>) =
                chunks.into_iter().partition(|c| self.strip_png_chunk(c));
            plan.removed
                .extend(dropped.iter().map(|c| format!("PNG {}", c.keyword)));
            plan.text = kept.into_iter().map(|c| c.raw).collect();
            for chunk in png::opaque_text_chunks(&src.bytes).unwrap_or_default() {
                match chunk.keyword().filter(|k| self.settings.png_strip_keys.contains(k)) {
                    Some(keyword) => plan.removed.push(format!("PNG {keyword}")),
                    None => plan.text.push(chunk),
                }
            }
            plan.carried = png::carried_chunks(&src.bytes).unwrap_or_default();
        }

        if src.kind == ImageKind::Jpeg {
            let segments = jpeg::segments(&src.bytes)?;
            let xmp_count = segments
                .iter()
                .filter(|s| jpeg::is_xmp_segment(s.marker, s.payload))
                .count();
            if xmp_count > 0 {
                plan.strip_xmp = true;
                plan.removed.push(format!("XMP ({xmp_count} segment(s))"));
            }
        }

        if plan.removed.is_empty() {
            log::info!("{}: no provenance markers to strip", src.path.display());
            self.write(output, &src.bytes)?;
            return Ok(Outcome {
                output: output.to_path_buf(),
                strategy: Strategy::LosslessPatch,
                skipped_fields: Vec::new(),
                removed: Vec::new(),
            });
        }
        self.run(&src, plan, output)
    }

    fn provenance_tags(&self, tree: &MetadataTree) -> Vec<(Group, u16)> {
        let mut drop = Vec::new();
        if tree.get(Group::Exif, "UserComment").is_some() {
            drop.push((Group::Exif, tags::TAG_USER_COMMENT));
        }
        for (name, id) in [
            ("ImageDescription", tags::TAG_IMAGE_DESCRIPTION),
            ("Software", tags::TAG_SOFTWARE),
        ] {
            let hit = tree
                .get_text(Group::Zeroth, name)
                .and_then(|t| self.scanner.find_keyword(t));
            if let Some(keyword) = hit {
                log::debug!("0th.{name} matches `{keyword}`");
                drop.push((Group::Zeroth, id));
            }
        }
        drop
    }

    fn strip_png_chunk(&self, chunk: &TextChunk) -> bool {
        if chunk.is_xmp() {
            let mut tree = MetadataTree::new();
            tree.set_group(Group::Xmp, xmp::parse(chunk.text.as_bytes()));
            return self.scanner.scan(&tree).is_aigc;
        }
        self.settings
            .png_strip_keys
            .iter()
            .any(|k| k == &chunk.keyword)
    }

    fn load(&self, input: &Path) -> Result<Source> {
        let bytes = fs::read(input)?;
        let kind = ImageKind::sniff(&bytes).ok_or_else(|| EngineError::Processing {
            path: input.to_path_buf(),
            reason: "unsupported or unrecognised image format".to_string(),
        })?;
        let exif = match self.exif.extract(kind, &bytes) {
            Ok(blob) => blob,
            Err(e) => {
                log::debug!("No usable EXIF in {}: {e}", input.display());
                None
            }
        };
        Ok(Source {
            path: input.to_path_buf(),
            bytes,
            kind,
            exif,
        })
    }

    fn run(&self, src: &Source, plan: Plan, output: &Path) -> Result<Outcome> {
        let mut strategy = strategy::select(src.kind, plan.op, plan.convert);
        let mut failures = Vec::new();

        loop {
            log::info!(
                "{}: {} ({} → {strategy})",
                src.path.display(),
                plan.op,
                src.kind
            );
            let attempt = self.apply(strategy, src, &plan).and_then(|(bytes, target)| {
                self.verify(&bytes, target, &plan).map(|()| (bytes, target))
            });

            match attempt {
                Ok((bytes, target)) => {
                    self.write(output, &bytes)?;
                    log::info!("Wrote {}", output.display());
                    let mut removed = plan.removed;
                    let exif_lost = strategy == Strategy::ReencodeStripped || !target.carries_exif();
                    if plan.op == Operation::StripProvenance && src.exif.is_some() && exif_lost {
                        removed.push(EXIF_DROPPED.to_string());
                    }
                    return Ok(Outcome {
                        output: output.to_path_buf(),
                        strategy,
                        skipped_fields: plan.skipped,
                        removed,
                    });
                }
                Err(e @ (EngineError::MalformedContainer(_) | EngineError::Io(_))) => return Err(e),
                Err(e) => {
                    failures.push(format!("{strategy}: {e}"));
                    match strategy.fallback(plan.op) {
                        Some(next) => {
                            log::warn!(
                                "{strategy} failed for {}: {e}; falling back to {next}",
                                src.path.display()
                            );
                            strategy = next;
                        }
                        None => {
                            return Err(EngineError::Processing {
                                path: src.path.clone(),
                                reason: failures.join("; "),
                            });
                        }
                    }
                }
            }
        }
    }

    fn apply(&self, strategy: Strategy, src: &Source, plan: &Plan) -> Result<(Vec<u8>, ImageKind)> {
        match strategy {
            Strategy::LosslessPatch => {
                if src.kind != ImageKind::Jpeg {
                    return Err(EngineError::codec(format!("{} cannot be patched in place", src.kind)));
                }
                // Walking the segments also validates the stream.
                let mut out = if plan.strip_xmp {
                    jpeg::strip_xmp(&src.bytes)?.0
                } else {
                    jpeg::strip_segments(&src.bytes, |_, _| false)?
                };
                match &plan.exif {
                    ExifPlan::Keep => {}
                    ExifPlan::Remove => {
                        if src.exif.is_some() {
                            out = self.exif.remove(ImageKind::Jpeg, &out)?;
                        }
                    }
                    ExifPlan::Replace(blob) => out = self.exif.insert(ImageKind::Jpeg, &out, blob)?,
                }
                Ok((out, ImageKind::Jpeg))
            }
            Strategy::LosslessReencode => {
                if !matches!(src.kind, ImageKind::Png | ImageKind::WebP) {
                    return Err(EngineError::codec(format!(
                        "{} has no lossless re-encode",
                        src.kind
                    )));
                }
                let decoded = self.image.open(&src.bytes)?;
                let out = self.image.save(&decoded, src.kind, 100)?;
                Ok((self.attach(out, src, plan, src.kind)?, src.kind))
            }
            Strategy::ReencodeWithMetadata => {
                let (target, quality) = if plan.convert {
                    (ImageKind::Jpeg, self.settings.convert_quality)
                } else {
                    (src.kind, 100)
                };
                let decoded = self.image.open(&src.bytes)?;
                let out = self.image.save(&decoded, target, quality)?;
                Ok((self.attach(out, src, plan, target)?, target))
            }
            Strategy::ReencodeStripped => {
                let (target, quality) = if plan.convert {
                    (ImageKind::Jpeg, self.settings.convert_quality)
                } else {
                    (src.kind, 100)
                };
                if plan.op != Operation::Clear {
                    log::warn!(
                        "{target} output cannot carry metadata; writing {} without it",
                        src.path.display()
                    );
                }
                let decoded = self.image.open(&src.bytes)?;
                Ok((self.image.save(&decoded, target, quality)?, target))
            }
        }
    }

    /// Graft the planned metadata onto freshly encoded pixels.
    fn attach(&self, mut out: Vec<u8>, src: &Source, plan: &Plan, target: ImageKind) -> Result<Vec<u8>> {
        let blob = match &plan.exif {
            ExifPlan::Keep => src.exif.as_deref(),
            ExifPlan::Remove => None,
            ExifPlan::Replace(blob) => Some(blob.as_slice()),
        };
        if let Some(blob) = blob {
            if target.carries_exif() {
                out = self.exif.insert(target, &out, blob)?;
            } else {
                log::warn!("{target} output cannot carry EXIF; dropping it");
            }
        }
        if target == ImageKind::Png {
            let chunks: Vec<RawChunk> = plan.carried.iter().chain(&plan.text).cloned().collect();
            out = png::graft(&out, &chunks)?;
        }
        Ok(out)
    }

    fn verify(&self, bytes: &[u8], target: ImageKind, plan: &Plan) -> Result<()> {
        let sniffed = ImageKind::sniff(bytes);
        if sniffed != Some(target) {
            return Err(EngineError::codec(format!(
                "output is not a valid {target} (sniffed {sniffed:?})"
            )));
        }
        if plan.strip_xmp && target == ImageKind::Jpeg {
            let leftover = jpeg::segments(bytes)?
                .iter()
                .any(|s| jpeg::is_xmp_segment(s.marker, s.payload));
            if leftover {
                return Err(EngineError::codec("XMP segment survived stripping"));
            }
        }
        Ok(())
    }

    /// Write through a temporary file in the destination directory.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn processing(path: &Path, err: EngineError) -> EngineError {
    EngineError::Processing {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Resolve and coerce every IFD field of a write request. Failures become
/// skipped fields.
fn encodable_fields(target: &MetadataTree) -> (Vec<EncodedField>, Vec<SkippedField>) {
    let mut fields = Vec::new();
    let mut skipped = Vec::new();
    for group in Group::IFDS {
        let Some(entries) = target.group(group) else {
            continue;
        };
        for (name, value) in entries {
            let coerced = exif::lookup(group, name)
                .and_then(|tag| exif::coerce::coerce(tag, value).map(|v| (tag, v)));
            match coerced {
                Ok((tag, value)) => {
                    log::debug!("{group}.{name} → 0x{:04X} {:?}", tag.id, tag.kind);
                    fields.push(EncodedField { group, tag, value });
                }
                Err(e) => skipped.push(SkippedField::new(group, name, e)),
            }
        }
    }
    (fields, skipped)
}

/// PNG text for a request value: strings verbatim, anything else as JSON.
fn text_of(value: &MetaValue) -> String {
    match value {
        MetaValue::Text(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
