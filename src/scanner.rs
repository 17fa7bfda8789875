//! Keyword heuristics for AI-generated content (AIGC) in a metadata tree.

use serde::Serialize;

use crate::metadata::{Group, MetadataTree};

/// Built-in AIGC keyword table. Matching is a case-insensitive substring test,
/// so entries are kept specific enough not to hit ordinary camera metadata.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "midjourney",
    "stable diffusion",
    "stablediffusion",
    "sdxl",
    "dall-e",
    "dall·e",
    "dalle",
    "novelai",
    "comfyui",
    "automatic1111",
    "invokeai",
    "fooocus",
    "leonardo.ai",
    "adobe firefly",
    "flux.1",
    "ai generated",
    "ai-generated",
    "generated by ai",
    "made with ai",
    "aigc",
    "AI生成",
    "人工智能生成",
    "由AI生成",
    "AI绘画",
    "AI作画",
];

/// Result of a provenance scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceVerdict {
    pub is_aigc: bool,
    /// The keyword table entry that matched.
    pub matched: Option<String>,
    /// Where it matched, e.g. `UserComment`, `PNG parameters`, `XMP x:xmpmeta/...`.
    pub source: Option<String>,
}

impl ProvenanceVerdict {
    fn hit(keyword: &str, source: String) -> Self {
        Self {
            is_aigc: true,
            matched: Some(keyword.to_string()),
            source: Some(source),
        }
    }
}

/// Keyword classifier over a [`MetadataTree`].
#[derive(Debug, Clone)]
pub struct ProvenanceScanner {
    /// (table entry, lowercased form)
    keywords: Vec<(String, String)>,
}

impl Default for ProvenanceScanner {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl ProvenanceScanner {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .map(|k| {
                let lower = k.to_lowercase();
                (k, lower)
            })
            .collect();
        Self { keywords }
    }

    /// First table entry contained in `text`, compared case-insensitively.
    pub fn find_keyword(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, lower)| haystack.contains(lower.as_str()))
            .map(|(entry, _)| entry.as_str())
    }

    /// Scan the tree in tier order; the first hit wins.
    ///
    /// 1. `Exif.UserComment`
    /// 2. `0th.ImageDescription`
    /// 3. `0th.Software`
    /// 4. `PNG Info` (`parameters` first, then the other keys)
    /// 5. `XMP`, depth-first
    pub fn scan(&self, tree: &MetadataTree) -> ProvenanceVerdict {
        let tiers = [
            (Group::Exif, "UserComment"),
            (Group::Zeroth, "ImageDescription"),
            (Group::Zeroth, "Software"),
        ];
        for (group, name) in tiers {
            if let Some(keyword) = tree.get_text(group, name).and_then(|t| self.find_keyword(t)) {
                return ProvenanceVerdict::hit(keyword, name.to_string());
            }
        }

        if let Some(fields) = tree.group(Group::PngInfo) {
            let params = fields.get_key_value("parameters");
            let rest = fields.iter().filter(|(k, _)| k.as_str() != "parameters");
            for (key, value) in params.into_iter().chain(rest) {
                let mut path = Vec::new();
                let hit = value.find_text(&mut path, &mut |_, text| self.find_keyword(text));
                if let Some(keyword) = hit {
                    return ProvenanceVerdict::hit(keyword, format!("PNG {key}"));
                }
            }
        }

        if let Some(fields) = tree.group(Group::Xmp) {
            for (key, value) in fields {
                let mut path = vec![key.clone()];
                let hit = value.find_text(&mut path, &mut |p, text| {
                    self.find_keyword(text).map(|k| (k, p.join("/")))
                });
                if let Some((keyword, at)) = hit {
                    return ProvenanceVerdict::hit(keyword, format!("XMP {at}"));
                }
            }
        }

        ProvenanceVerdict::default()
    }
}
