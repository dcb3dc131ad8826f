// Pixel Encoding
// PNG/base64 data URLs for remote payloads, and decoding of fetched image bytes

use crate::models::PixelBuffer;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encode the buffer as a PNG data URL; `None` if the encoder rejects it.
pub fn encode_png_data_url(buf: &PixelBuffer) -> Option<String> {
    let img = RgbaImage::from_raw(buf.width as u32, buf.height as u32, buf.data.clone())?;
    let mut out = Cursor::new(Vec::new());
    if let Err(e) = img.write_to(&mut out, ImageFormat::Png) {
        debug!("[ENCODE] png encode failed: {}", e);
        return None;
    }
    let mut encoded = String::with_capacity(PNG_DATA_URL_PREFIX.len() + out.get_ref().len() * 4 / 3 + 4);
    encoded.push_str(PNG_DATA_URL_PREFIX);
    STANDARD.encode_string(out.get_ref(), &mut encoded);
    Some(encoded)
}

/// Decode container bytes (PNG/JPEG) into an RGBA buffer.
pub fn decode_image_bytes(bytes: &[u8]) -> Option<PixelBuffer> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let rgba = img.into_rgba8();
            let (w, h) = (rgba.width() as usize, rgba.height() as usize);
            PixelBuffer::new(w, h, rgba.into_raw())
        }
        Err(e) => {
            debug!("[ENCODE] image decode failed: {}", e);
            None
        }
    }
}

/// Strip the data-URL header, if any, and decode the base64 body.
pub fn decode_data_url(data_url: &str) -> Option<Vec<u8>> {
    let body = match data_url.split_once(";base64,") {
        Some((_, body)) => body,
        None => data_url,
    };
    STANDARD.decode(body.trim()).ok()
}
