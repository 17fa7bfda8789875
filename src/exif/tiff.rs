use std::io::Cursor;

use exif::experimental::Writer;
use exif::{Context, Field, In, Rational, Reader, SRational, Tag, Value};

use crate::error::{EngineError, Result};
use crate::metadata::{Group, MetaValue, MetadataTree};
use crate::pipeline::ImageKind;

use super::coerce::{self, CoercedValue};
use super::tags::{self, TagDescriptor, TagType};
use super::{ExifCodec, writer};

/// One IFD field ready to be serialized.
#[derive(Debug, Clone)]
pub struct EncodedField {
    pub group: Group,
    pub tag: &'static TagDescriptor,
    pub value: CoercedValue,
}

/// EXIF codec backed by `kamadak-exif` for the TIFF structure and `img-parts`
/// for placement inside JPEG / PNG / WebP containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffCodec;

impl TiffCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ExifCodec for TiffCodec {
    fn decode(&self, blob: &[u8]) -> Result<MetadataTree> {
        let exif = read_tolerant(blob)?;

        let mut tree = MetadataTree::new();
        for field in exif.fields() {
            let Some(group) = group_of(field) else {
                continue;
            };
            // Unknown ids are dropped silently, as are pointer/offset tags.
            let Some(desc) = tags::by_id(group, field.tag.number()) else {
                continue;
            };
            if let Some(value) = decode_value(desc, &field.value) {
                tree.insert(group, desc.name, value);
            }
        }
        tree.prune();
        Ok(tree)
    }

    fn encode(&self, fields: &[EncodedField]) -> Result<Vec<u8>> {
        let mut sorted: Vec<&EncodedField> = fields.iter().collect();
        sorted.sort_by_key(|f| (f.group, f.tag.id));

        let mut built = Vec::with_capacity(sorted.len());
        for f in sorted {
            let Some((context, ifd)) = placement(f.group) else {
                return Err(EngineError::codec(format!(
                    "group {} cannot be stored in EXIF",
                    f.group
                )));
            };
            built.push(Field {
                tag: Tag(context, f.tag.id),
                ifd_num: ifd,
                value: to_value(f.tag, &f.value)?,
            });
        }

        let mut writer = Writer::new();
        for field in &built {
            writer.push_field(field);
        }
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut out, false).map_err(EngineError::codec)?;
        Ok(out.into_inner())
    }

    fn retain(&self, blob: &[u8], drop: &[(Group, u16)]) -> Result<Vec<u8>> {
        let exif = read_tolerant(blob)?;

        let kept: Vec<&Field> = exif
            .fields()
            .filter(|f| f.ifd_num.index() <= 1 && !is_layout_tag(&f.tag))
            .filter(|f| match group_of(f) {
                Some(group) => !drop.contains(&(group, f.tag.number())),
                None => true,
            })
            .collect();

        let mut writer = Writer::new();
        for field in &kept {
            writer.push_field(field);
        }
        if let Some(jpeg) = thumbnail(&exif) {
            writer.set_jpeg(jpeg, In::THUMBNAIL);
        }
        let mut out = Cursor::new(Vec::new());
        writer
            .write(&mut out, exif.little_endian())
            .map_err(EngineError::codec)?;
        Ok(out.into_inner())
    }

    fn extract(&self, kind: ImageKind, container: &[u8]) -> Result<Option<Vec<u8>>> {
        writer::extract(kind, container)
    }

    fn insert(&self, kind: ImageKind, container: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
        writer::insert(kind, container, blob)
    }

    fn remove(&self, kind: ImageKind, container: &[u8]) -> Result<Vec<u8>> {
        writer::remove(kind, container)
    }
}

/// Parse a TIFF blob, keeping every field reachable before the first broken
/// link. Only an unreadable header is an error.
fn read_tolerant(blob: &[u8]) -> Result<exif::Exif> {
    Reader::new()
        .continue_on_error(true)
        .read_raw(blob.to_vec())
        .or_else(|e| {
            e.distill_partial_result(|errors| {
                for err in errors {
                    log::debug!("Ignoring damaged EXIF entry: {err}");
                }
            })
        })
        .map_err(EngineError::codec)
}

fn group_of(field: &Field) -> Option<Group> {
    match (field.tag.context(), field.ifd_num.index()) {
        (Context::Tiff, 0) => Some(Group::Zeroth),
        (Context::Tiff, 1) => Some(Group::First),
        (Context::Exif, _) => Some(Group::Exif),
        (Context::Gps, _) => Some(Group::Gps),
        _ => None,
    }
}

fn placement(group: Group) -> Option<(Context, In)> {
    match group {
        Group::Zeroth => Some((Context::Tiff, In::PRIMARY)),
        Group::First => Some((Context::Tiff, In::THUMBNAIL)),
        Group::Exif => Some((Context::Exif, In::PRIMARY)),
        Group::Gps => Some((Context::Gps, In::PRIMARY)),
        Group::PngInfo | Group::Xmp => None,
    }
}

/// Tags describing TIFF layout. The writer regenerates them.
fn is_layout_tag(tag: &Tag) -> bool {
    matches!(
        (tag.context(), tag.number()),
        (
            Context::Tiff,
            0x0111 | 0x0117 | 0x0144 | 0x0145 | 0x0201 | 0x0202 | 0x8769 | 0x8825
        ) | (Context::Exif, 0xA005)
    )
}

/// The embedded JPEG thumbnail, if IFD1 points at one inside the blob.
fn thumbnail(exif: &exif::Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let jpeg = exif.buf().get(offset..offset.checked_add(len)?);
    if jpeg.is_none() {
        log::debug!("Thumbnail offset {offset}+{len} is outside the EXIF blob; dropping it");
    }
    jpeg
}

fn decode_value(desc: &TagDescriptor, value: &Value) -> Option<MetaValue> {
    let decoded = match value {
        Value::Byte(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::SByte(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::Short(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::SShort(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::Long(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::SLong(v) => coerce::scalar_or_list(v.iter().map(|x| i64::from(*x))),
        Value::Rational(v) => {
            coerce::rationals(v.iter().map(|r| (i64::from(r.num), i64::from(r.denom))))
        }
        Value::SRational(v) => {
            coerce::rationals(v.iter().map(|r| (i64::from(r.num), i64::from(r.denom))))
        }
        Value::Float(v) => {
            coerce::scalar_or_list(v.iter().map(|x| MetaValue::Float(f64::from(*x))))
        }
        Value::Double(v) => coerce::scalar_or_list(v.iter().map(|x| MetaValue::Float(*x))),
        Value::Ascii(strings) => {
            coerce::scalar_or_list(strings.iter().map(|s| coerce::decode_bytes(desc, s)))
        }
        Value::Undefined(bytes, _) => coerce::decode_bytes(desc, bytes),
        _ => return None,
    };
    Some(decoded)
}

fn to_value(desc: &TagDescriptor, value: &CoercedValue) -> Result<Value> {
    let mismatch = || {
        EngineError::codec(format!(
            "value of `{}` does not fit {:?}",
            desc.name, desc.kind
        ))
    };
    let value = match (desc.kind, value) {
        (TagType::Ascii, CoercedValue::Bytes(b)) => {
            let end = b.iter().rposition(|c| *c != 0).map_or(0, |i| i + 1);
            Value::Ascii(vec![b[..end].to_vec()])
        }
        (TagType::Undefined, CoercedValue::Bytes(b)) => Value::Undefined(b.clone(), 0),
        (TagType::Rational, CoercedValue::Rationals(pairs)) => {
            Value::Rational(unsigned_rationals(pairs, desc)?)
        }
        (TagType::SRational, CoercedValue::Rationals(pairs)) => {
            Value::SRational(signed_rationals(pairs, desc)?)
        }
        (TagType::Rational, CoercedValue::Scalar(MetaValue::Int(n))) => {
            Value::Rational(unsigned_rationals(&[(*n, 1)], desc)?)
        }
        (TagType::SRational, CoercedValue::Scalar(MetaValue::Int(n))) => {
            Value::SRational(signed_rationals(&[(*n, 1)], desc)?)
        }
        (TagType::Byte, CoercedValue::Scalar(v)) => Value::Byte(narrow_all(v, desc)?),
        (TagType::SByte, CoercedValue::Scalar(v)) => Value::SByte(narrow_all(v, desc)?),
        (TagType::Short, CoercedValue::Scalar(v)) => Value::Short(narrow_all(v, desc)?),
        (TagType::SShort, CoercedValue::Scalar(v)) => Value::SShort(narrow_all(v, desc)?),
        (TagType::Long, CoercedValue::Scalar(v)) => Value::Long(narrow_all(v, desc)?),
        (TagType::SLong, CoercedValue::Scalar(v)) => Value::SLong(narrow_all(v, desc)?),
        (TagType::Float, CoercedValue::Scalar(v)) => {
            Value::Float(floats(v).ok_or_else(mismatch)?.into_iter().map(|f| f as f32).collect())
        }
        (TagType::Double, CoercedValue::Scalar(v)) => {
            Value::Double(floats(v).ok_or_else(mismatch)?)
        }
        _ => return Err(mismatch()),
    };
    Ok(value)
}

fn unsigned_rationals(pairs: &[(i64, i64)], desc: &TagDescriptor) -> Result<Vec<Rational>> {
    pairs
        .iter()
        .map(|&(n, d)| {
            Ok(Rational {
                num: narrow(n, desc)?,
                denom: narrow(d, desc)?,
            })
        })
        .collect()
}

fn signed_rationals(pairs: &[(i64, i64)], desc: &TagDescriptor) -> Result<Vec<SRational>> {
    pairs
        .iter()
        .map(|&(n, d)| {
            Ok(SRational {
                num: narrow(n, desc)?,
                denom: narrow(d, desc)?,
            })
        })
        .collect()
}

fn narrow<T: TryFrom<i64>>(n: i64, desc: &TagDescriptor) -> Result<T> {
    T::try_from(n).map_err(|_| {
        EngineError::codec(format!(
            "{n} is out of range for `{}` ({:?})",
            desc.name, desc.kind
        ))
    })
}

fn narrow_all<T: TryFrom<i64>>(value: &MetaValue, desc: &TagDescriptor) -> Result<Vec<T>> {
    let ints: Vec<i64> = match value {
        MetaValue::Int(i) => vec![*i],
        MetaValue::List(items) if !items.is_empty() => items
            .iter()
            .map(MetaValue::as_int)
            .collect::<Option<_>>()
            .ok_or_else(|| {
                EngineError::codec(format!("`{}` expects integers", desc.name))
            })?,
        _ => {
            return Err(EngineError::codec(format!(
                "`{}` expects an integer or a list of integers",
                desc.name
            )));
        }
    };
    ints.into_iter().map(|n| narrow(n, desc)).collect()
}

fn floats(value: &MetaValue) -> Option<Vec<f64>> {
    let one = |v: &MetaValue| match v {
        MetaValue::Float(f) => Some(*f),
        MetaValue::Int(i) => Some(*i as f64),
        _ => None,
    };
    match value {
        MetaValue::List(items) if !items.is_empty() => items.iter().map(one).collect(),
        other => one(other).map(|f| vec![f]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::tags::lookup;

    fn field(group: Group, name: &str, value: MetaValue) -> EncodedField {
        let tag = lookup(group, name).unwrap();
        EncodedField {
            group,
            tag,
            value: coerce::coerce(tag, &value).unwrap(),
        }
    }

    fn pair(n: i64, d: i64) -> MetaValue {
        MetaValue::List(vec![MetaValue::Int(n), MetaValue::Int(d)])
    }

    fn sample() -> Vec<EncodedField> {
        vec![
            field(Group::Zeroth, "Make", "SONY".into()),
            field(Group::Zeroth, "Software", "ComfyUI".into()),
            field(Group::Zeroth, "Orientation", MetaValue::Int(1)),
            field(Group::Zeroth, "XResolution", pair(72, 1)),
            field(Group::Exif, "UserComment", "Steps: 20".into()),
            field(Group::Exif, "ISOSpeedRatings", MetaValue::Int(100)),
            field(
                Group::Gps,
                "GPSLatitude",
                MetaValue::List(vec![pair(35, 1), pair(41, 1), pair(2250, 100)]),
            ),
            field(Group::Gps, "GPSLatitudeRef", "N".into()),
        ]
    }

    // ── encode / decode ──────────────────────────────────────────────

    #[test]
    fn encode_then_decode_restores_fields() {
        let codec = TiffCodec::new();
        let blob = codec.encode(&sample()).unwrap();
        assert_eq!(&blob[..2], b"MM");

        let tree = codec.decode(&blob).unwrap();
        assert_eq!(tree.get_text(Group::Zeroth, "Make"), Some("SONY"));
        assert_eq!(tree.get(Group::Zeroth, "Orientation"), Some(&MetaValue::Int(1)));
        assert_eq!(tree.get(Group::Zeroth, "XResolution"), Some(&pair(72, 1)));
        assert_eq!(tree.get_text(Group::Exif, "UserComment"), Some("Steps: 20"));
        assert_eq!(
            tree.get(Group::Gps, "GPSLatitude"),
            Some(&MetaValue::List(vec![pair(35, 1), pair(41, 1), pair(2250, 100)]))
        );
        // Pointer tags never surface in the readable tree.
        assert!(tree.get(Group::Zeroth, "ExifIFDPointer").is_none());
    }

    #[test]
    fn encode_is_deterministic() {
        let codec = TiffCodec::new();
        let mut reversed = sample();
        reversed.reverse();
        assert_eq!(codec.encode(&sample()).unwrap(), codec.encode(&reversed).unwrap());
    }

    #[test]
    fn encode_rejects_out_of_range() {
        let codec = TiffCodec::new();
        let bad = field(Group::Zeroth, "Orientation", MetaValue::Int(70_000));
        assert!(matches!(codec.encode(&[bad]), Err(EngineError::Codec(_))));

        let negative = field(Group::Zeroth, "XResolution", pair(-1, 1));
        assert!(matches!(codec.encode(&[negative]), Err(EngineError::Codec(_))));

        let text = field(Group::Zeroth, "Orientation", "up".into());
        assert!(matches!(codec.encode(&[text]), Err(EngineError::Codec(_))));
    }

    #[test]
    fn decode_garbage_is_codec_error() {
        let codec = TiffCodec::new();
        assert!(matches!(codec.decode(b"not a tiff"), Err(EngineError::Codec(_))));
    }

    /// Point IFD0's next-IFD link of a big-endian blob far past its end.
    fn break_next_ifd(blob: &mut [u8]) {
        let ifd0 = u32::from_be_bytes(blob[4..8].try_into().unwrap()) as usize;
        let count = u16::from_be_bytes([blob[ifd0], blob[ifd0 + 1]]) as usize;
        let link = ifd0 + 2 + count * 12;
        blob[link..link + 4].copy_from_slice(&0x00FF_FF00u32.to_be_bytes());
    }

    #[test]
    fn decode_survives_dangling_ifd_link() {
        let codec = TiffCodec::new();
        let mut blob = codec.encode(&sample()).unwrap();
        break_next_ifd(&mut blob);

        let tree = codec.decode(&blob).unwrap();
        assert_eq!(tree.get_text(Group::Zeroth, "Make"), Some("SONY"));
        assert_eq!(tree.get_text(Group::Exif, "UserComment"), Some("Steps: 20"));
        assert_eq!(tree.get_text(Group::Gps, "GPSLatitudeRef"), Some("N"));
    }

    // ── retain ───────────────────────────────────────────────────────

    #[test]
    fn retain_repairs_dangling_ifd_link() {
        let codec = TiffCodec::new();
        let mut blob = codec.encode(&sample()).unwrap();
        break_next_ifd(&mut blob);

        let stripped = codec
            .retain(&blob, &[(Group::Exif, tags::TAG_USER_COMMENT)])
            .unwrap();
        let after = codec.decode(&stripped).unwrap();
        assert!(after.get(Group::Exif, "UserComment").is_none());
        assert_eq!(after.get_text(Group::Zeroth, "Software"), Some("ComfyUI"));
        // The rewritten blob parses cleanly in strict mode.
        assert!(Reader::new().read_raw(stripped).is_ok());
    }

    #[test]
    fn retain_drops_only_selected_tags() {
        let codec = TiffCodec::new();
        let blob = codec.encode(&sample()).unwrap();
        let stripped = codec
            .retain(&blob, &[(Group::Exif, tags::TAG_USER_COMMENT), (Group::Zeroth, tags::TAG_SOFTWARE)])
            .unwrap();

        let before = codec.decode(&blob).unwrap();
        let after = codec.decode(&stripped).unwrap();
        assert!(after.get(Group::Exif, "UserComment").is_none());
        assert!(after.get(Group::Zeroth, "Software").is_none());

        let mut expected = before.clone();
        expected.remove(Group::Exif, "UserComment");
        expected.remove(Group::Zeroth, "Software");
        expected.prune();
        assert_eq!(after, expected);
    }

    #[test]
    fn retain_with_nothing_to_drop_is_stable() {
        let codec = TiffCodec::new();
        let blob = codec.encode(&sample()).unwrap();
        let once = codec.retain(&blob, &[]).unwrap();
        let twice = codec.retain(&once, &[]).unwrap();
        assert_eq!(once, twice);
    }
}
