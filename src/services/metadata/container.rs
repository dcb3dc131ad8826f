// Container Walkers
// Format sniffing plus zero-copy iteration over JPEG marker segments and PNG chunks.
// Iteration stops quietly at the first structural problem.

use crate::models::ContainerFormat;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const JPEG_APP1: u8 = 0xE1;
pub const JPEG_APP11: u8 = 0xEB;
const JPEG_SOS: u8 = 0xDA;
const JPEG_EOI: u8 = 0xD9;

pub fn sniff_format(bytes: &[u8]) -> ContainerFormat {
    if bytes.len() >= 3 && bytes[..2] == JPEG_SOI && bytes[2] == 0xFF {
        ContainerFormat::Jpeg
    } else if bytes.starts_with(&PNG_SIGNATURE) {
        ContainerFormat::Png
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ContainerFormat::Webp
    } else {
        ContainerFormat::Other
    }
}

pub fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug, Clone, Copy)]
pub struct JpegSegment<'a> {
    pub marker: u8,
    /// Payload after the two length bytes.
    pub data: &'a [u8],
}

pub struct JpegSegments<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

/// Segments up to the start of scan. Yields nothing if `bytes` is not a JPEG.
pub fn jpeg_segments(bytes: &[u8]) -> JpegSegments<'_> {
    let is_jpeg = bytes.len() >= 2 && bytes[..2] == JPEG_SOI;
    JpegSegments {
        bytes,
        pos: 2,
        done: !is_jpeg,
    }
}

impl<'a> Iterator for JpegSegments<'a> {
    type Item = JpegSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let b = self.bytes;
            if self.pos + 1 >= b.len() || b[self.pos] != 0xFF {
                self.done = true;
                return None;
            }
            let marker = b[self.pos + 1];
            // Fill bytes and standalone markers carry no length.
            if marker == 0xFF {
                self.pos += 1;
                continue;
            }
            if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
                self.pos += 2;
                continue;
            }
            if marker == JPEG_SOS || marker == JPEG_EOI {
                self.done = true;
                return None;
            }
            if self.pos + 4 > b.len() {
                self.done = true;
                return None;
            }
            let length = usize::from(u16::from_be_bytes([b[self.pos + 2], b[self.pos + 3]]));
            let end = self.pos + 2 + length;
            if length < 2 || end > b.len() {
                self.done = true;
                return None;
            }
            let data = &b[self.pos + 4..end];
            self.pos = end;
            return Some(JpegSegment { marker, data });
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PngChunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

pub struct PngChunks<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

/// Chunks up to and including IEND. CRCs are skipped, not verified.
pub fn png_chunks(bytes: &[u8]) -> PngChunks<'_> {
    PngChunks {
        bytes,
        pos: PNG_SIGNATURE.len(),
        done: !bytes.starts_with(&PNG_SIGNATURE),
    }
}

impl<'a> Iterator for PngChunks<'a> {
    type Item = PngChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let b = self.bytes;
        if self.pos + 8 > b.len() {
            self.done = true;
            return None;
        }
        let length = u32::from_be_bytes([b[self.pos], b[self.pos + 1], b[self.pos + 2], b[self.pos + 3]]) as usize;
        let kind = [b[self.pos + 4], b[self.pos + 5], b[self.pos + 6], b[self.pos + 7]];
        let data_start = self.pos + 8;
        let Some(data_end) = data_start.checked_add(length).filter(|&e| e <= b.len()) else {
            self.done = true;
            return None;
        };
        self.pos = data_end + 4;
        if &kind == b"IEND" {
            self.done = true;
        }
        Some(PngChunk {
            kind,
            data: &b[data_start..data_end],
        })
    }
}

#[cfg(test)]
pub(crate) mod test_files {
    //! Hand-assembled container fixtures.

    pub fn jpeg_with_segments(segments: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        for (marker, payload) in segments {
            out.push(0xFF);
            out.push(*marker);
            out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0x00, 0xFF, 0xD9]);
        out
    }

    pub fn png_with_chunks(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        for (kind, data) in chunks {
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(*kind);
            out.extend_from_slice(data);
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(b"IEND");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }
}
