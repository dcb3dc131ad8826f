// Provenance Scanner
// Looks for embedded content-credential manifests: JPEG APP11 JUMBF boxes,
// PNG caBX chunks, and as a fallback the manifest URI in the first 64 KiB.
// Presence lowers the synthetic score; absence is neutral.

use crate::models::{ContainerFormat, ProvenancePresence, ProvenanceResult};

use super::container::{contains_subslice, jpeg_segments, png_chunks, sniff_format, JPEG_APP11};

pub const PROVENANCE_PRESENT_ADJUSTMENT: f64 = -0.30;
pub const FALLBACK_SCAN_LIMIT: usize = 64 * 1024;

const JUMBF_BOX: &[u8] = b"jumb";
const MANIFEST_LABEL: &[u8] = b"c2pa";
const PNG_MANIFEST_CHUNK: &[u8; 4] = b"caBX";
const MANIFEST_URIS: &[&[u8]] = &[b"c2pa.org/specifications", b"urn:c2pa:"];

impl ProvenanceResult {
    pub fn present(format: ContainerFormat) -> Self {
        Self {
            presence: ProvenancePresence::Present,
            format: Some(format),
            score_adjustment: PROVENANCE_PRESENT_ADJUSTMENT,
        }
    }

    pub fn absent(format: ContainerFormat) -> Self {
        Self {
            presence: ProvenancePresence::Absent,
            format: Some(format),
            score_adjustment: 0.0,
        }
    }

    /// Bytes unavailable or in a format we cannot walk.
    pub fn unknown() -> Self {
        Self {
            presence: ProvenancePresence::Unknown,
            format: None,
            score_adjustment: 0.0,
        }
    }
}

fn jpeg_has_manifest(bytes: &[u8]) -> bool {
    jpeg_segments(bytes)
        .filter(|s| s.marker == JPEG_APP11)
        .any(|s| contains_subslice(s.data, MANIFEST_LABEL) || contains_subslice(s.data, JUMBF_BOX))
}

fn png_has_manifest(bytes: &[u8]) -> bool {
    png_chunks(bytes).any(|c| &c.kind == PNG_MANIFEST_CHUNK)
}

fn head_mentions_manifest_uri(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(FALLBACK_SCAN_LIMIT)];
    MANIFEST_URIS.iter().any(|uri| contains_subslice(head, uri))
}

pub fn scan_provenance(bytes: &[u8]) -> ProvenanceResult {
    if bytes.is_empty() {
        return ProvenanceResult::unknown();
    }
    let format = sniff_format(bytes);
    let structural = match format {
        ContainerFormat::Jpeg => jpeg_has_manifest(bytes),
        ContainerFormat::Png => png_has_manifest(bytes),
        ContainerFormat::Webp | ContainerFormat::Other => false,
    };
    if structural || head_mentions_manifest_uri(bytes) {
        return ProvenanceResult::present(format);
    }
    match format {
        ContainerFormat::Jpeg | ContainerFormat::Png => ProvenanceResult::absent(format),
        ContainerFormat::Webp | ContainerFormat::Other => ProvenanceResult::unknown(),
    }
}
