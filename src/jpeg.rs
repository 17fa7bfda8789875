//! Marker-level JPEG surgery.
//!
//! Walks the marker segments that precede the first SOS and drops the ones a
//! predicate selects. Everything from SOS onward (entropy-coded data, later
//! scans, EOI, trailing bytes) is copied verbatim.

use crate::error::{EngineError, Result};

/// Standard XMP packet signature (APP1 payload prefix).
pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
/// Extended XMP continuation signature.
pub const XMP_EXTENSION_SIGNATURE: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP1: u8 = 0xE1;

/// One length-prefixed marker segment before SOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegSegment<'a> {
    pub marker: u8,
    pub payload: &'a [u8],
}

fn malformed(msg: impl Into<String>) -> EngineError {
    EngineError::MalformedContainer(msg.into())
}

fn is_standalone(marker: u8) -> bool {
    marker == 0x01 || (0xD0..=0xD7).contains(&marker)
}

/// Walk the header. `visit` sees each marker together with the raw bytes it
/// occupies (fill bytes, marker, length, payload); standalone markers come
/// through as `None`. Returns the offset of the SOS marker's fill run.
fn walk<'a>(
    bytes: &'a [u8],
    mut visit: impl FnMut(Option<JpegSegment<'a>>, &'a [u8]),
) -> Result<usize> {
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != SOI {
        return Err(malformed("missing SOI marker"));
    }

    let mut pos = 2;
    loop {
        let start = pos;
        if pos >= bytes.len() {
            return Err(malformed("end of data before SOS"));
        }
        if bytes[pos] != 0xFF {
            return Err(malformed(format!(
                "expected marker at offset {pos}, found 0x{:02X}",
                bytes[pos]
            )));
        }
        // Fill bytes: any run of 0xFF before the marker code.
        while pos < bytes.len() && bytes[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = bytes.get(pos) else {
            return Err(malformed("end of data before SOS"));
        };
        pos += 1;

        match marker {
            SOS => return Ok(start),
            EOI => return Err(malformed("EOI before SOS")),
            0x00 => return Err(malformed(format!("invalid marker 0x00 at offset {}", pos - 1))),
            m if is_standalone(m) => visit(None, &bytes[start..pos]),
            _ => {
                let Some(len_bytes) = bytes.get(pos..pos + 2) else {
                    return Err(malformed("truncated segment length"));
                };
                let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
                if len < 2 || pos + len > bytes.len() {
                    return Err(malformed(format!(
                        "segment 0x{marker:02X} length {len} overruns the stream"
                    )));
                }
                let end = pos + len;
                let segment = JpegSegment {
                    marker,
                    payload: &bytes[pos + 2..end],
                };
                visit(Some(segment), &bytes[start..end]);
                pos = end;
            }
        }
    }
}

/// Remove every pre-SOS segment for which `pred(marker, payload)` is true.
///
/// A removed segment takes its marker, length, payload and preceding fill bytes
/// with it. Fails with [`EngineError::MalformedContainer`] on a missing SOI,
/// EOI before SOS, a truncated or overlong length, or end of data before SOS.
pub fn strip_segments(bytes: &[u8], mut pred: impl FnMut(u8, &[u8]) -> bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..2.min(bytes.len())]);

    let sos = walk(bytes, |segment, raw| match segment {
        Some(s) if pred(s.marker, s.payload) => {
            log::debug!("Dropping JPEG segment 0x{:02X} ({} bytes)", s.marker, raw.len());
        }
        _ => out.extend_from_slice(raw),
    })?;
    out.extend_from_slice(&bytes[sos..]);
    Ok(out)
}

/// All length-prefixed segments before SOS, in stream order.
pub fn segments(bytes: &[u8]) -> Result<Vec<JpegSegment<'_>>> {
    let mut found = Vec::new();
    walk(bytes, |segment, _| found.extend(segment))?;
    Ok(found)
}

/// APP1 carrying a standard or extended XMP packet.
pub fn is_xmp_segment(marker: u8, payload: &[u8]) -> bool {
    marker == APP1
        && (payload.starts_with(XMP_SIGNATURE) || payload.starts_with(XMP_EXTENSION_SIGNATURE))
}

/// Remove every XMP APP1 segment. Returns the new stream and how many were removed.
pub fn strip_xmp(bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut removed = 0;
    let out = strip_segments(bytes, |marker, payload| {
        let hit = is_xmp_segment(marker, payload);
        removed += usize::from(hit);
        hit
    })?;
    Ok((out, removed))
}

/// The standard XMP packet (without signature), if present.
pub fn xmp_packet(bytes: &[u8]) -> Result<Option<&[u8]>> {
    Ok(segments(bytes)?
        .into_iter()
        .find(|s| s.marker == APP1 && s.payload.starts_with(XMP_SIGNATURE))
        .map(|s| &s.payload[XMP_SIGNATURE.len()..]))
}
