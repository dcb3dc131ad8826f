// EXIF Parser
// Walks the TIFF structure in a JPEG APP1 segment or PNG eXIf chunk for camera
// make, model, software, exposure and GPS presence. Malformed input yields None.

use crate::models::CameraMetadata;

use super::container::{jpeg_segments, png_chunks, JPEG_APP1};

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const TIFF_MAGIC: u16 = 42;
const IFD_ENTRY_SIZE: usize = 12;
/// Entry counts above this are treated as corruption.
const MAX_IFD_ENTRIES: u16 = 512;

const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_EXPOSURE_TIME: u16 = 0x829A;
const TAG_F_NUMBER: u16 = 0x829D;
const TAG_ISO: u16 = 0x8827;
const TAG_LENS_MODEL: u16 = 0xA434;
const TAG_GPS_LATITUDE: u16 = 0x0002;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;
const TYPE_SLONG: u16 = 9;
const TYPE_SRATIONAL: u16 = 10;

/// Score when no usable camera hardware fields are found.
pub const NO_CAMERA_SCORE: f64 = 0.25;
/// Score when the software tag names a known image generator.
pub const GENERATOR_SOFTWARE_SCORE: f64 = 0.9;
pub const CAMERA_HARDWARE_SCORE: f64 = 0.0;

const GENERATOR_SOFTWARE: &[&str] = &[
    "midjourney",
    "dall-e",
    "dall·e",
    "dalle",
    "stable diffusion",
    "stablediffusion",
    "sdxl",
    "novelai",
    "adobe firefly",
    "imagen",
    "leonardo.ai",
    "comfyui",
    "automatic1111",
    "invokeai",
    "dreamstudio",
    "flux",
    "ideogram",
    "bing image creator",
    "nightcafe",
    "craiyon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    kind: u16,
    count: u32,
    /// Offset of the 4-byte value/offset field within the TIFF block.
    value_pos: usize,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let order = match data.get(..2)? {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return None,
        };
        let tiff = Self { data, order };
        if tiff.u16_at(2)? != TIFF_MAGIC {
            return None;
        }
        Some(tiff)
    }

    fn u16_at(&self, pos: usize) -> Option<u16> {
        let b = self.data.get(pos..pos.checked_add(2)?)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32_at(&self, pos: usize) -> Option<u32> {
        let b = self.data.get(pos..pos.checked_add(4)?)?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    fn first_ifd_offset(&self) -> Option<usize> {
        self.u32_at(4).map(|v| v as usize)
    }

    fn entries(&self, offset: usize) -> Option<Vec<IfdEntry>> {
        let count = self.u16_at(offset)?;
        if count > MAX_IFD_ENTRIES {
            return None;
        }
        let mut entries = Vec::with_capacity(usize::from(count));
        for i in 0..usize::from(count) {
            let pos = offset + 2 + i * IFD_ENTRY_SIZE;
            entries.push(IfdEntry {
                tag: self.u16_at(pos)?,
                kind: self.u16_at(pos + 2)?,
                count: self.u32_at(pos + 4)?,
                value_pos: pos + 8,
            });
        }
        Some(entries)
    }

    /// Byte range holding the entry's values: inline when they fit in four
    /// bytes, otherwise at the offset stored in the entry.
    fn value_bytes(&self, entry: &IfdEntry) -> Option<&'a [u8]> {
        let unit: usize = match entry.kind {
            TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED => 1,
            TYPE_SHORT => 2,
            TYPE_LONG | TYPE_SLONG => 4,
            TYPE_RATIONAL | TYPE_SRATIONAL => 8,
            _ => return None,
        };
        let size = unit.checked_mul(entry.count as usize)?;
        let start = if size <= 4 {
            entry.value_pos
        } else {
            self.u32_at(entry.value_pos)? as usize
        };
        self.data.get(start..start.checked_add(size)?)
    }

    fn ascii(&self, entry: &IfdEntry) -> Option<String> {
        if entry.kind != TYPE_ASCII {
            return None;
        }
        let raw = self.value_bytes(entry)?;
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn rational(&self, entry: &IfdEntry) -> Option<f64> {
        if entry.kind != TYPE_RATIONAL && entry.kind != TYPE_SRATIONAL {
            return None;
        }
        if entry.count == 0 {
            return None;
        }
        // Rationals are eight bytes and never stored inline.
        let start = self.u32_at(entry.value_pos)? as usize;
        let num = self.u32_at(start)?;
        let den = self.u32_at(start + 4)?;
        if den == 0 {
            return None;
        }
        let (num, den) = if entry.kind == TYPE_SRATIONAL {
            (f64::from(num as i32), f64::from(den as i32))
        } else {
            (f64::from(num), f64::from(den))
        };
        Some(num / den)
    }

    fn unsigned(&self, entry: &IfdEntry) -> Option<u32> {
        if entry.count == 0 {
            return None;
        }
        match entry.kind {
            TYPE_SHORT => self.u16_at(entry.value_pos).map(u32::from),
            TYPE_LONG => self.u32_at(entry.value_pos),
            _ => None,
        }
    }
}

/// Parse a TIFF block (the body of an EXIF segment, header already stripped).
pub fn parse_tiff(data: &[u8]) -> Option<CameraMetadata> {
    let tiff = Tiff::parse(data)?;
    let ifd0 = tiff.entries(tiff.first_ifd_offset()?)?;

    let mut meta = CameraMetadata::default();
    let mut exif_offset = None;
    let mut gps_offset = None;
    for entry in &ifd0 {
        match entry.tag {
            TAG_MAKE => meta.make = tiff.ascii(entry),
            TAG_MODEL => meta.model = tiff.ascii(entry),
            TAG_SOFTWARE => meta.software = tiff.ascii(entry),
            TAG_EXIF_IFD => exif_offset = tiff.unsigned(entry),
            TAG_GPS_IFD => gps_offset = tiff.unsigned(entry),
            _ => {}
        }
    }

    // Sub-IFDs are optional; a broken one only loses its own fields.
    if let Some(entries) = exif_offset.and_then(|o| tiff.entries(o as usize)) {
        for entry in &entries {
            match entry.tag {
                TAG_EXPOSURE_TIME => meta.exposure_time = tiff.rational(entry),
                TAG_F_NUMBER => meta.f_number = tiff.rational(entry),
                TAG_ISO => meta.iso = tiff.unsigned(entry),
                TAG_LENS_MODEL => meta.lens_model = tiff.ascii(entry),
                _ => {}
            }
        }
    }
    if let Some(entries) = gps_offset.and_then(|o| tiff.entries(o as usize)) {
        meta.has_gps = entries.iter().any(|e| e.tag == TAG_GPS_LATITUDE && e.count > 0);
    }

    Some(meta)
}

/// Extract camera metadata from JPEG or PNG container bytes.
pub fn parse_camera_metadata(bytes: &[u8]) -> Option<CameraMetadata> {
    if let Some(seg) = jpeg_segments(bytes).find(|s| s.marker == JPEG_APP1 && s.data.starts_with(EXIF_HEADER)) {
        return parse_tiff(&seg.data[EXIF_HEADER.len()..]);
    }
    let chunk = png_chunks(bytes).find(|c| &c.kind == b"eXIf")?;
    // Some writers keep the Exif header inside the chunk.
    let data = chunk.data.strip_prefix(EXIF_HEADER).unwrap_or(chunk.data);
    parse_tiff(data)
}

pub fn is_generator_software(software: &str) -> bool {
    let lower = software.to_lowercase();
    GENERATOR_SOFTWARE.iter().any(|name| lower.contains(name))
}

/// Synthetic-likelihood signal from camera metadata.
pub fn camera_ai_score(meta: Option<&CameraMetadata>) -> f64 {
    let Some(meta) = meta else {
        return NO_CAMERA_SCORE;
    };
    if meta.software.as_deref().is_some_and(is_generator_software) {
        return GENERATOR_SOFTWARE_SCORE;
    }
    if meta.has_camera_hardware() {
        return CAMERA_HARDWARE_SCORE;
    }
    NO_CAMERA_SCORE
}
