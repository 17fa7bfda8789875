use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{EngineError, Result};
use crate::metadata::Group;

/// Declared TIFF field type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
}

/// One entry of the tag registry.
#[derive(Debug, PartialEq, Eq)]
pub struct TagDescriptor {
    pub id: u16,
    pub name: &'static str,
    pub kind: TagType,
}

const fn tag(id: u16, name: &'static str, kind: TagType) -> TagDescriptor {
    TagDescriptor { id, name, kind }
}

use TagType::*;

// IFD0 / IFD1. Pointer and strip/thumbnail offset tags are owned by the codec
// and deliberately absent.
static IMAGE_TAGS: &[TagDescriptor] = &[
    tag(0x000B, "ProcessingSoftware", Ascii),
    tag(0x00FE, "NewSubfileType", Long),
    tag(0x00FF, "SubfileType", Short),
    tag(0x0100, "ImageWidth", Long),
    tag(0x0101, "ImageLength", Long),
    tag(0x0102, "BitsPerSample", Short),
    tag(0x0103, "Compression", Short),
    tag(0x0106, "PhotometricInterpretation", Short),
    tag(0x0107, "Threshholding", Short),
    tag(0x0108, "CellWidth", Short),
    tag(0x0109, "CellLength", Short),
    tag(0x010A, "FillOrder", Short),
    tag(0x010D, "DocumentName", Ascii),
    tag(0x010E, "ImageDescription", Ascii),
    tag(0x010F, "Make", Ascii),
    tag(0x0110, "Model", Ascii),
    tag(0x0112, "Orientation", Short),
    tag(0x0115, "SamplesPerPixel", Short),
    tag(0x0116, "RowsPerStrip", Long),
    tag(0x011A, "XResolution", Rational),
    tag(0x011B, "YResolution", Rational),
    tag(0x011C, "PlanarConfiguration", Short),
    tag(0x0128, "ResolutionUnit", Short),
    tag(0x0129, "PageNumber", Short),
    tag(0x012D, "TransferFunction", Short),
    tag(0x0131, "Software", Ascii),
    tag(0x0132, "DateTime", Ascii),
    tag(0x013B, "Artist", Ascii),
    tag(0x013C, "HostComputer", Ascii),
    tag(0x013D, "Predictor", Short),
    tag(0x013E, "WhitePoint", Rational),
    tag(0x013F, "PrimaryChromaticities", Rational),
    tag(0x0140, "ColorMap", Short),
    tag(0x0141, "HalftoneHints", Short),
    tag(0x014C, "InkSet", Short),
    tag(0x0151, "TargetPrinter", Ascii),
    tag(0x0152, "ExtraSamples", Short),
    tag(0x0153, "SampleFormat", Short),
    tag(0x0211, "YCbCrCoefficients", Rational),
    tag(0x0212, "YCbCrSubSampling", Short),
    tag(0x0213, "YCbCrPositioning", Short),
    tag(0x0214, "ReferenceBlackWhite", Rational),
    tag(0x02BC, "XMLPacket", Byte),
    tag(0x4746, "Rating", Short),
    tag(0x4749, "RatingPercent", Short),
    tag(0x800D, "ImageID", Ascii),
    tag(0x828D, "CFARepeatPatternDim", Short),
    tag(0x828E, "CFAPattern", Byte),
    tag(0x828F, "BatteryLevel", Rational),
    tag(0x8298, "Copyright", Ascii),
    tag(0x829A, "ExposureTime", Rational),
    tag(0x8649, "ImageResources", Byte),
    tag(0x8773, "InterColorProfile", Undefined),
    tag(0x8828, "Interlace", Short),
    tag(0x882A, "TimeZoneOffset", SShort),
    tag(0x882B, "SelfTimerMode", Short),
    tag(0x9003, "DateTimeOriginal", Ascii),
    tag(0x9211, "ImageNumber", Long),
    tag(0x9212, "SecurityClassification", Ascii),
    tag(0x9213, "ImageHistory", Ascii),
    tag(0x9C9B, "XPTitle", Byte),
    tag(0x9C9C, "XPComment", Byte),
    tag(0x9C9D, "XPAuthor", Byte),
    tag(0x9C9E, "XPKeywords", Byte),
    tag(0x9C9F, "XPSubject", Byte),
    tag(0xC4A5, "PrintImageMatching", Undefined),
    tag(0xC612, "DNGVersion", Byte),
    tag(0xC613, "DNGBackwardVersion", Byte),
    tag(0xC614, "UniqueCameraModel", Ascii),
    tag(0xC615, "LocalizedCameraModel", Byte),
    tag(0xC62F, "CameraSerialNumber", Ascii),
    tag(0xC630, "LensInfo", Rational),
    tag(0xC68B, "OriginalRawFileName", Byte),
];

static EXIF_TAGS: &[TagDescriptor] = &[
    tag(0x829A, "ExposureTime", Rational),
    tag(0x829D, "FNumber", Rational),
    tag(0x8822, "ExposureProgram", Short),
    tag(0x8824, "SpectralSensitivity", Ascii),
    tag(0x8827, "ISOSpeedRatings", Short),
    tag(0x8828, "OECF", Undefined),
    tag(0x8830, "SensitivityType", Short),
    tag(0x8831, "StandardOutputSensitivity", Long),
    tag(0x8832, "RecommendedExposureIndex", Long),
    tag(0x8833, "ISOSpeed", Long),
    tag(0x9000, "ExifVersion", Undefined),
    tag(0x9003, "DateTimeOriginal", Ascii),
    tag(0x9004, "DateTimeDigitized", Ascii),
    tag(0x9010, "OffsetTime", Ascii),
    tag(0x9011, "OffsetTimeOriginal", Ascii),
    tag(0x9012, "OffsetTimeDigitized", Ascii),
    tag(0x9101, "ComponentsConfiguration", Undefined),
    tag(0x9102, "CompressedBitsPerPixel", Rational),
    tag(0x9201, "ShutterSpeedValue", SRational),
    tag(0x9202, "ApertureValue", Rational),
    tag(0x9203, "BrightnessValue", SRational),
    tag(0x9204, "ExposureBiasValue", SRational),
    tag(0x9205, "MaxApertureValue", Rational),
    tag(0x9206, "SubjectDistance", Rational),
    tag(0x9207, "MeteringMode", Short),
    tag(0x9208, "LightSource", Short),
    tag(0x9209, "Flash", Short),
    tag(0x920A, "FocalLength", Rational),
    tag(0x9214, "SubjectArea", Short),
    tag(0x927C, "MakerNote", Undefined),
    tag(0x9286, "UserComment", Undefined),
    tag(0x9290, "SubSecTime", Ascii),
    tag(0x9291, "SubSecTimeOriginal", Ascii),
    tag(0x9292, "SubSecTimeDigitized", Ascii),
    tag(0xA000, "FlashpixVersion", Undefined),
    tag(0xA001, "ColorSpace", Short),
    tag(0xA002, "PixelXDimension", Long),
    tag(0xA003, "PixelYDimension", Long),
    tag(0xA004, "RelatedSoundFile", Ascii),
    tag(0xA20B, "FlashEnergy", Rational),
    tag(0xA20C, "SpatialFrequencyResponse", Undefined),
    tag(0xA20E, "FocalPlaneXResolution", Rational),
    tag(0xA20F, "FocalPlaneYResolution", Rational),
    tag(0xA210, "FocalPlaneResolutionUnit", Short),
    tag(0xA214, "SubjectLocation", Short),
    tag(0xA215, "ExposureIndex", Rational),
    tag(0xA217, "SensingMethod", Short),
    tag(0xA300, "FileSource", Undefined),
    tag(0xA301, "SceneType", Undefined),
    tag(0xA302, "CFAPattern", Undefined),
    tag(0xA401, "CustomRendered", Short),
    tag(0xA402, "ExposureMode", Short),
    tag(0xA403, "WhiteBalance", Short),
    tag(0xA404, "DigitalZoomRatio", Rational),
    tag(0xA405, "FocalLengthIn35mmFilm", Short),
    tag(0xA406, "SceneCaptureType", Short),
    tag(0xA407, "GainControl", Short),
    tag(0xA408, "Contrast", Short),
    tag(0xA409, "Saturation", Short),
    tag(0xA40A, "Sharpness", Short),
    tag(0xA40B, "DeviceSettingDescription", Undefined),
    tag(0xA40C, "SubjectDistanceRange", Short),
    tag(0xA420, "ImageUniqueID", Ascii),
    tag(0xA430, "CameraOwnerName", Ascii),
    tag(0xA431, "BodySerialNumber", Ascii),
    tag(0xA432, "LensSpecification", Rational),
    tag(0xA433, "LensMake", Ascii),
    tag(0xA434, "LensModel", Ascii),
    tag(0xA435, "LensSerialNumber", Ascii),
    tag(0xA500, "Gamma", Rational),
];

static GPS_TAGS: &[TagDescriptor] = &[
    tag(0x0000, "GPSVersionID", Byte),
    tag(0x0001, "GPSLatitudeRef", Ascii),
    tag(0x0002, "GPSLatitude", Rational),
    tag(0x0003, "GPSLongitudeRef", Ascii),
    tag(0x0004, "GPSLongitude", Rational),
    tag(0x0005, "GPSAltitudeRef", Byte),
    tag(0x0006, "GPSAltitude", Rational),
    tag(0x0007, "GPSTimeStamp", Rational),
    tag(0x0008, "GPSSatellites", Ascii),
    tag(0x0009, "GPSStatus", Ascii),
    tag(0x000A, "GPSMeasureMode", Ascii),
    tag(0x000B, "GPSDOP", Rational),
    tag(0x000C, "GPSSpeedRef", Ascii),
    tag(0x000D, "GPSSpeed", Rational),
    tag(0x000E, "GPSTrackRef", Ascii),
    tag(0x000F, "GPSTrack", Rational),
    tag(0x0010, "GPSImgDirectionRef", Ascii),
    tag(0x0011, "GPSImgDirection", Rational),
    tag(0x0012, "GPSMapDatum", Ascii),
    tag(0x0013, "GPSDestLatitudeRef", Ascii),
    tag(0x0014, "GPSDestLatitude", Rational),
    tag(0x0015, "GPSDestLongitudeRef", Ascii),
    tag(0x0016, "GPSDestLongitude", Rational),
    tag(0x0017, "GPSDestBearingRef", Ascii),
    tag(0x0018, "GPSDestBearing", Rational),
    tag(0x0019, "GPSDestDistanceRef", Ascii),
    tag(0x001A, "GPSDestDistance", Rational),
    tag(0x001B, "GPSProcessingMethod", Undefined),
    tag(0x001C, "GPSAreaInformation", Undefined),
    tag(0x001D, "GPSDateStamp", Ascii),
    tag(0x001E, "GPSDifferential", Short),
    tag(0x001F, "GPSHPositioningError", Rational),
];

struct Index {
    by_name: HashMap<&'static str, &'static TagDescriptor>,
    by_id: HashMap<u16, &'static TagDescriptor>,
}

impl Index {
    fn build(table: &'static [TagDescriptor]) -> Self {
        Self {
            by_name: table.iter().map(|t| (t.name, t)).collect(),
            by_id: table.iter().map(|t| (t.id, t)).collect(),
        }
    }
}

static IMAGE_INDEX: LazyLock<Index> = LazyLock::new(|| Index::build(IMAGE_TAGS));
static EXIF_INDEX: LazyLock<Index> = LazyLock::new(|| Index::build(EXIF_TAGS));
static GPS_INDEX: LazyLock<Index> = LazyLock::new(|| Index::build(GPS_TAGS));

fn index(group: Group) -> Option<&'static Index> {
    match group {
        Group::Zeroth | Group::First => Some(&IMAGE_INDEX),
        Group::Exif => Some(&EXIF_INDEX),
        Group::Gps => Some(&GPS_INDEX),
        Group::PngInfo | Group::Xmp => None,
    }
}

/// Resolve a tag name within an IFD group.
pub fn lookup(group: Group, name: &str) -> Result<&'static TagDescriptor> {
    index(group)
        .and_then(|idx| idx.by_name.get(name).copied())
        .ok_or_else(|| EngineError::UnknownTagKind {
            group,
            name: name.to_string(),
        })
}

/// Resolve a numeric tag id within an IFD group. Unknown ids yield `None`.
pub fn by_id(group: Group, id: u16) -> Option<&'static TagDescriptor> {
    index(group).and_then(|idx| idx.by_id.get(&id).copied())
}

pub const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub const TAG_SOFTWARE: u16 = 0x0131;
pub const TAG_USER_COMMENT: u16 = 0x9286;
