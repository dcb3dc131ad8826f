// Metadata Parsers
// Hand-rolled readers for camera metadata and provenance manifests.
// Malformed input never raises: parsers report "absent" or "unknown".

pub mod container;
pub mod exif;
pub mod provenance;

pub use container::sniff_format;
pub use exif::{camera_ai_score, is_generator_software, parse_camera_metadata};
pub use provenance::{scan_provenance, PROVENANCE_PRESENT_ADJUSTMENT};
