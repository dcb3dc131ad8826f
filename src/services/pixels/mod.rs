// Pixel Analysis
// Feature extraction, the photorealism gate and payload encoding

pub mod encode;
pub mod features;
pub mod photorealism;

pub use encode::{decode_data_url, decode_image_bytes, encode_png_data_url};
pub use features::{downsample, extract_features, luminance_plane};
pub use photorealism::{knee, PhotorealismConfig, PhotorealismFilter, PhotorealismKnees};
