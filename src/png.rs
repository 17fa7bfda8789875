//! PNG ancillary chunks: text metadata (`tEXt` / `zTXt` / `iTXt`) and the
//! colour chunks carried across a pixel re-encode.

use std::io::Read;

use flate2::read::ZlibDecoder;
use img_parts::Bytes;
use img_parts::png::{Png, PngChunk};

use crate::error::{EngineError, Result};
use crate::xmp::PNG_XMP_KEYWORD;

pub const TEXT: [u8; 4] = *b"tEXt";
pub const ZTXT: [u8; 4] = *b"zTXt";
pub const ITXT: [u8; 4] = *b"iTXt";
const IHDR: [u8; 4] = *b"IHDR";

/// Chunks that describe the image rather than encode it. They survive a
/// re-encode unchanged.
const CARRIED: [[u8; 4]; 6] = [*b"iCCP", *b"sRGB", *b"gAMA", *b"cHRM", *b"pHYs", *b"tIME"];

/// A raw chunk, kept byte-for-byte so it can be grafted back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub kind: [u8; 4],
    pub data: Vec<u8>,
}

impl RawChunk {
    /// The Latin-1 keyword of a text chunk, readable even when the body is not.
    pub fn keyword(&self) -> Option<String> {
        if !is_text_kind(self.kind) {
            return None;
        }
        split_nul(&self.data).map(|(keyword, _)| latin1_string(keyword))
    }
}

/// A decoded text chunk together with its raw form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub keyword: String,
    pub text: String,
    pub raw: RawChunk,
}

impl TextChunk {
    pub fn is_xmp(&self) -> bool {
        self.keyword == PNG_XMP_KEYWORD
    }
}

pub fn is_text_kind(kind: [u8; 4]) -> bool {
    kind == TEXT || kind == ZTXT || kind == ITXT
}

fn parse(bytes: &[u8]) -> Result<Png> {
    Png::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| EngineError::codec(format!("failed to parse PNG: {e}")))
}

fn raw_text_chunks(png: &Png) -> impl Iterator<Item = RawChunk> + '_ {
    png.chunks()
        .iter()
        .filter(|c| is_text_kind(c.kind()))
        .map(|c| RawChunk {
            kind: c.kind(),
            data: c.contents().to_vec(),
        })
}

/// Every decodable text chunk, in file order. Chunks that fail to decode are
/// left to [`opaque_text_chunks`].
pub fn text_chunks(bytes: &[u8]) -> Result<Vec<TextChunk>> {
    let png = parse(bytes)?;
    Ok(raw_text_chunks(&png).filter_map(|raw| decode_text(&raw)).collect())
}

/// Text chunks whose body cannot be decoded (bad zlib stream, unknown
/// compression method, invalid UTF-8), kept raw so a re-encode can carry them.
pub fn opaque_text_chunks(bytes: &[u8]) -> Result<Vec<RawChunk>> {
    let png = parse(bytes)?;
    Ok(raw_text_chunks(&png)
        .filter(|raw| {
            let opaque = decode_text(raw).is_none();
            if opaque {
                log::debug!(
                    "Carrying undecodable {} chunk {:?} as is",
                    String::from_utf8_lossy(&raw.kind),
                    raw.keyword()
                );
            }
            opaque
        })
        .collect())
}

/// Colour and timestamp chunks worth keeping across a re-encode.
pub fn carried_chunks(bytes: &[u8]) -> Result<Vec<RawChunk>> {
    let png = parse(bytes)?;
    Ok(png
        .chunks()
        .iter()
        .filter(|c| CARRIED.contains(&c.kind()))
        .map(|c| RawChunk {
            kind: c.kind(),
            data: c.contents().to_vec(),
        })
        .collect())
}

/// Insert `chunks` right after IHDR, in order. A non-text chunk whose kind the
/// target already has is skipped.
pub fn graft(bytes: &[u8], chunks: &[RawChunk]) -> Result<Vec<u8>> {
    if chunks.is_empty() {
        return Ok(bytes.to_vec());
    }
    let mut png = parse(bytes)?;
    let existing: Vec<[u8; 4]> = png.chunks().iter().map(|c| c.kind()).collect();
    let at = existing
        .iter()
        .position(|k| *k == IHDR)
        .map_or(0, |i| i + 1);

    let fresh = chunks
        .iter()
        .filter(|c| is_text_kind(c.kind) || !existing.contains(&c.kind))
        .map(|c| PngChunk::new(c.kind, Bytes::copy_from_slice(&c.data)));
    for (i, chunk) in fresh.enumerate() {
        png.chunks_mut().insert(at + i, chunk);
    }
    Ok(png.encoder().bytes().to_vec())
}

/// Build a text chunk: `tEXt` when the text is Latin-1, `iTXt` otherwise.
pub fn text_chunk(keyword: &str, text: &str) -> RawChunk {
    let latin1: Option<Vec<u8>> = text.chars().map(|c| u8::try_from(c).ok()).collect();
    let mut data = latin1_bytes(keyword);
    data.push(0);
    match latin1 {
        Some(bytes) if keyword != PNG_XMP_KEYWORD => {
            data.extend_from_slice(&bytes);
            RawChunk { kind: TEXT, data }
        }
        _ => {
            // compression flag, method, empty language tag, empty translated keyword
            data.extend_from_slice(&[0, 0, 0, 0]);
            data.extend_from_slice(text.as_bytes());
            RawChunk { kind: ITXT, data }
        }
    }
}

fn latin1_bytes(s: &str) -> Vec<u8> {
    s.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).ok()?;
    Some(out)
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let i = data.iter().position(|b| *b == 0)?;
    Some((&data[..i], &data[i + 1..]))
}

fn decode_text(raw: &RawChunk) -> Option<TextChunk> {
    let (keyword, rest) = split_nul(&raw.data)?;
    let keyword = latin1_string(keyword);
    let text = match raw.kind {
        TEXT => latin1_string(rest),
        ZTXT => {
            let (&method, compressed) = rest.split_first()?;
            if method != 0 {
                return None;
            }
            latin1_string(&inflate(compressed)?)
        }
        ITXT => {
            let [flag, method, rest @ ..] = rest else {
                return None;
            };
            let (_language, rest) = split_nul(rest)?;
            let (_translated, body) = split_nul(rest)?;
            let body = match (*flag, *method) {
                (0, _) => body.to_vec(),
                (1, 0) => inflate(body)?,
                _ => return None,
            };
            String::from_utf8(body).ok()?
        }
        _ => return None,
    };
    Some(TextChunk {
        keyword,
        text,
        raw: raw.clone(),
    })
}
