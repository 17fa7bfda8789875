//! Per-format choice between in-place metadata edits and pixel re-encodes,
//! plus the fallback ladder between them.

use std::fmt;

use serde::Serialize;

use crate::pipeline::ImageKind;

/// What the engine is asked to do with a file's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Clear,
    Modify,
    StripProvenance,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Clear => "clear",
            Operation::Modify => "modify",
            Operation::StripProvenance => "strip-provenance",
        })
    }
}

/// How the output container is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Edit metadata segments in place; image data is copied byte-for-byte.
    LosslessPatch,
    /// Decode pixels and re-encode with a lossless codec, grafting metadata back.
    LosslessReencode,
    /// Re-encode (JPEG when converting) and attach the planned metadata.
    ReencodeWithMetadata,
    /// Re-encode at maximum quality in the source format, without metadata.
    ReencodeStripped,
}

impl Strategy {
    /// The tier to try after this one failed with a codec error.
    pub fn fallback(self, op: Operation) -> Option<Strategy> {
        match (self, op) {
            (Strategy::LosslessPatch | Strategy::LosslessReencode, Operation::Clear) => {
                Some(Strategy::ReencodeStripped)
            }
            (Strategy::LosslessPatch | Strategy::LosslessReencode, _) => {
                Some(Strategy::ReencodeWithMetadata)
            }
            (Strategy::ReencodeWithMetadata, Operation::Clear) => Some(Strategy::ReencodeStripped),
            (Strategy::ReencodeWithMetadata, _) | (Strategy::ReencodeStripped, _) => None,
        }
    }

    /// Whether the strategy decodes and re-encodes pixels.
    pub fn reencodes(self) -> bool {
        self != Strategy::LosslessPatch
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::LosslessPatch => "lossless patch",
            Strategy::LosslessReencode => "lossless re-encode",
            Strategy::ReencodeWithMetadata => "re-encode with metadata",
            Strategy::ReencodeStripped => "re-encode stripped",
        })
    }
}

/// Pick the first strategy for `kind`.
pub fn select(kind: ImageKind, op: Operation, convert: bool) -> Strategy {
    if convert {
        return match op {
            Operation::Clear => Strategy::ReencodeStripped,
            _ => Strategy::ReencodeWithMetadata,
        };
    }
    match kind {
        ImageKind::Jpeg => Strategy::LosslessPatch,
        ImageKind::Png | ImageKind::WebP => Strategy::LosslessReencode,
        ImageKind::Tiff | ImageKind::Bmp | ImageKind::Gif => Strategy::ReencodeStripped,
    }
}

/// `select` followed by every fallback tier, in order.
pub fn ladder(kind: ImageKind, op: Operation, convert: bool) -> Vec<Strategy> {
    std::iter::successors(Some(select(kind, op, convert)), |s| s.fallback(op)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_per_kind() {
        for op in [Operation::Clear, Operation::Modify, Operation::StripProvenance] {
            assert_eq!(select(ImageKind::Jpeg, op, false), Strategy::LosslessPatch);
            assert_eq!(select(ImageKind::Png, op, false), Strategy::LosslessReencode);
            assert_eq!(select(ImageKind::WebP, op, false), Strategy::LosslessReencode);
            assert_eq!(select(ImageKind::Bmp, op, false), Strategy::ReencodeStripped);
        }
        assert_eq!(
            select(ImageKind::Png, Operation::Modify, true),
            Strategy::ReencodeWithMetadata
        );
    }

    #[test]
    fn ladders() {
        use Strategy::*;
        assert_eq!(
            ladder(ImageKind::Jpeg, Operation::Clear, false),
            [LosslessPatch, ReencodeStripped]
        );
        assert_eq!(
            ladder(ImageKind::Png, Operation::Modify, false),
            [LosslessReencode, ReencodeWithMetadata]
        );
        assert_eq!(
            ladder(ImageKind::Jpeg, Operation::StripProvenance, false),
            [LosslessPatch, ReencodeWithMetadata]
        );
        assert_eq!(ladder(ImageKind::Gif, Operation::Modify, false), [ReencodeStripped]);
        assert_eq!(ReencodeWithMetadata.fallback(Operation::Clear), Some(ReencodeStripped));
    }
}
