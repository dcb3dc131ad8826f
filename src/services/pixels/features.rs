// Pixel Features
// Statistical measures over an RGBA buffer, each a pure function of the pixels.
// Luminance uses Rec.601 weights and stays in the 0..255 range.

use crate::models::{FeatureVector, PixelBuffer};

const HISTOGRAM_BINS: usize = 32;
const VARIANCE_BLOCK: usize = 4;
const NOISE_BLOCK: usize = 8;
const DCT_BLOCK: usize = 8;
/// Coefficients with `u + v` above this index count as high frequency.
const DCT_LOW_FREQ_CUTOFF: usize = 2;
const LAPLACIAN_FLAT_THRESHOLD: f64 = 2.0;
const SMOOTHNESS_GAIN: f64 = 16.0;

#[inline]
fn luminance(px: [u8; 4]) -> f64 {
    0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2])
}

/// Luminance plane, row-major.
pub fn luminance_plane(buf: &PixelBuffer) -> Vec<f64> {
    buf.data
        .chunks_exact(4)
        .map(|px| luminance([px[0], px[1], px[2], px[3]]))
        .collect()
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (n, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64
}

fn block_variances(lum: &[f64], width: usize, height: usize, block: usize) -> Vec<f64> {
    let mut out = Vec::new();
    let mut by = 0;
    while by + block <= height {
        let mut bx = 0;
        while bx + block <= width {
            let values = (by..by + block)
                .flat_map(|y| (bx..bx + block).map(move |x| lum[y * width + x]));
            out.push(variance(values));
            bx += block;
        }
        by += block;
    }
    out
}

/// Shannon entropy in bits of 32-bin channel histograms, averaged over R/G/B.
pub fn channel_entropy_bits(buf: &PixelBuffer) -> f64 {
    let total = buf.pixel_count();
    if total == 0 {
        return 0.0;
    }
    let mut hist = [[0usize; HISTOGRAM_BINS]; 3];
    for px in buf.data.chunks_exact(4) {
        for c in 0..3 {
            hist[c][usize::from(px[c] >> 3)] += 1;
        }
    }
    let mut sum = 0.0;
    for channel in &hist {
        let mut entropy = 0.0;
        for &count in channel.iter().filter(|&&c| c > 0) {
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }
        sum += entropy;
    }
    sum / 3.0
}

/// Entropy normalized to [0, 1] by log2(32).
pub fn channel_entropy(buf: &PixelBuffer) -> f64 {
    channel_entropy_bits(buf) / (HISTOGRAM_BINS as f64).log2()
}

/// Number of distinct 5-5-5 quantized colors.
pub fn unique_color_count(buf: &PixelBuffer) -> usize {
    let mut seen = vec![false; 1 << 15];
    let mut count = 0;
    for px in buf.data.chunks_exact(4) {
        let key = (usize::from(px[0] >> 3) << 10) | (usize::from(px[1] >> 3) << 5) | usize::from(px[2] >> 3);
        if !seen[key] {
            seen[key] = true;
            count += 1;
        }
    }
    count
}

/// Mean gradient magnitude from right and down luminance deltas.
pub fn edge_complexity(buf: &PixelBuffer) -> f64 {
    let (w, h) = (buf.width, buf.height);
    if w < 2 || h < 2 {
        return 0.0;
    }
    let lum = luminance_plane(buf);
    let mut sum = 0.0;
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let c = lum[y * w + x];
            let dx = lum[y * w + x + 1] - c;
            let dy = lum[(y + 1) * w + x] - c;
            sum += (dx * dx + dy * dy).sqrt();
        }
    }
    sum / ((w - 1) * (h - 1)) as f64
}

/// Mean luminance variance over 4×4 blocks.
pub fn block_variance(buf: &PixelBuffer) -> f64 {
    let lum = luminance_plane(buf);
    let blocks = block_variances(&lum, buf.width, buf.height, VARIANCE_BLOCK);
    if blocks.is_empty() {
        return 0.0;
    }
    blocks.iter().sum::<f64>() / blocks.len() as f64
}

/// Population variance of per-pixel HSV saturation.
pub fn saturation_variance(buf: &PixelBuffer) -> f64 {
    variance(buf.data.chunks_exact(4).map(|px| {
        let max = px[0].max(px[1]).max(px[2]);
        let min = px[0].min(px[1]).min(px[2]);
        if max == 0 {
            0.0
        } else {
            f64::from(max - min) / f64::from(max)
        }
    }))
}

/// `1 − 16 × mean(|Δlum|) / 255`, clamped; high values mean a smooth image.
pub fn gradient_smoothness(buf: &PixelBuffer) -> f64 {
    let (w, h) = (buf.width, buf.height);
    let lum = luminance_plane(buf);
    let mut sum = 0.0;
    let mut n = 0usize;
    for y in 0..h {
        for x in 0..w {
            let c = lum[y * w + x];
            if x + 1 < w {
                sum += (lum[y * w + x + 1] - c).abs();
                n += 1;
            }
            if y + 1 < h {
                sum += (lum[(y + 1) * w + x] - c).abs();
                n += 1;
            }
        }
    }
    if n == 0 {
        return 1.0;
    }
    let mean_delta = sum / n as f64 / 255.0;
    (1.0 - SMOOTHNESS_GAIN * mean_delta).clamp(0.0, 1.0)
}

/// Minimum 8×8 block luminance variance. Images smaller than one block use
/// the whole-image variance.
pub fn local_noise_floor(buf: &PixelBuffer) -> f64 {
    let lum = luminance_plane(buf);
    let blocks = block_variances(&lum, buf.width, buf.height, NOISE_BLOCK);
    if blocks.is_empty() {
        return variance(lum.iter().copied());
    }
    blocks.into_iter().fold(f64::INFINITY, f64::min)
}

fn dct_basis() -> [[f64; DCT_BLOCK]; DCT_BLOCK] {
    let mut basis = [[0.0; DCT_BLOCK]; DCT_BLOCK];
    let n = DCT_BLOCK as f64;
    for (u, row) in basis.iter_mut().enumerate() {
        let alpha = if u == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = alpha * (std::f64::consts::PI * (2.0 * x as f64 + 1.0) * u as f64 / (2.0 * n)).cos();
        }
    }
    basis
}

/// Share of AC energy above the low-frequency cutoff, over 8×8 DCT-II blocks.
pub fn high_frequency_energy_ratio(buf: &PixelBuffer) -> f64 {
    let (w, h) = (buf.width, buf.height);
    let lum = luminance_plane(buf);
    let basis = dct_basis();
    let mut ac_total = 0.0;
    let mut high = 0.0;

    let mut block = [[0.0; DCT_BLOCK]; DCT_BLOCK];
    let mut rows = [[0.0; DCT_BLOCK]; DCT_BLOCK];
    let mut by = 0;
    while by + DCT_BLOCK <= h {
        let mut bx = 0;
        while bx + DCT_BLOCK <= w {
            for (y, row) in block.iter_mut().enumerate() {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = lum[(by + y) * w + bx + x] - 128.0;
                }
            }
            // Separable transform: rows first, then columns.
            for y in 0..DCT_BLOCK {
                for u in 0..DCT_BLOCK {
                    rows[y][u] = (0..DCT_BLOCK).map(|x| basis[u][x] * block[y][x]).sum();
                }
            }
            for v in 0..DCT_BLOCK {
                for u in 0..DCT_BLOCK {
                    if u == 0 && v == 0 {
                        continue;
                    }
                    let coeff: f64 = (0..DCT_BLOCK).map(|y| basis[v][y] * rows[y][u]).sum();
                    let energy = coeff * coeff;
                    ac_total += energy;
                    if u + v > DCT_LOW_FREQ_CUTOFF {
                        high += energy;
                    }
                }
            }
            bx += DCT_BLOCK;
        }
        by += DCT_BLOCK;
    }

    if ac_total <= f64::EPSILON {
        0.0
    } else {
        high / ac_total
    }
}

/// Fraction of interior pixels whose 4-neighbour Laplacian is near zero.
pub fn laplacian_sparsity(buf: &PixelBuffer) -> f64 {
    let (w, h) = (buf.width, buf.height);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let lum = luminance_plane(buf);
    let mut flat = 0usize;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let response = 4.0 * lum[i] - lum[i - 1] - lum[i + 1] - lum[i - w] - lum[i + w];
            if response.abs() < LAPLACIAN_FLAT_THRESHOLD {
                flat += 1;
            }
        }
    }
    flat as f64 / ((w - 2) * (h - 2)) as f64
}

/// `1 − (max − min) / mean` of the three per-channel variances, clamped.
pub fn channel_variance_uniformity(buf: &PixelBuffer) -> f64 {
    let vars: Vec<f64> = (0..3)
        .map(|c| variance(buf.data.chunks_exact(4).map(|px| f64::from(px[c]))))
        .collect();
    let mean = vars.iter().sum::<f64>() / 3.0;
    if mean <= f64::EPSILON {
        return 1.0;
    }
    let max = vars.iter().copied().fold(f64::MIN, f64::max);
    let min = vars.iter().copied().fold(f64::MAX, f64::min);
    (1.0 - (max - min) / mean).clamp(0.0, 1.0)
}

pub fn extract_features(buf: &PixelBuffer) -> FeatureVector {
    FeatureVector {
        channel_entropy: channel_entropy(buf),
        unique_colors: unique_color_count(buf),
        edge_complexity: edge_complexity(buf),
        block_variance: block_variance(buf),
        saturation_variance: saturation_variance(buf),
        gradient_smoothness: gradient_smoothness(buf),
        noise_floor: local_noise_floor(buf),
        hf_energy_ratio: high_frequency_energy_ratio(buf),
        laplacian_sparsity: laplacian_sparsity(buf),
        channel_uniformity: channel_variance_uniformity(buf),
    }
}

/// Nearest-neighbour reduction so the longer side is at most `max_dim`.
pub fn downsample(buf: &PixelBuffer, max_dim: usize) -> PixelBuffer {
    let longest = buf.width.max(buf.height);
    if max_dim == 0 || longest <= max_dim {
        return buf.clone();
    }
    let scale = max_dim as f64 / longest as f64;
    let w = ((buf.width as f64 * scale).round() as usize).max(1);
    let h = ((buf.height as f64 * scale).round() as usize).max(1);
    let mut data = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        let sy = (y * buf.height / h).min(buf.height - 1);
        for x in 0..w {
            let sx = (x * buf.width / w).min(buf.width - 1);
            data.extend_from_slice(&buf.rgba(sx, sy));
        }
    }
    PixelBuffer {
        width: w,
        height: h,
        data,
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use crate::models::PixelBuffer;

    pub fn solid(w: usize, h: usize, rgb: [u8; 3]) -> PixelBuffer {
        let data = (0..w * h).flat_map(|_| [rgb[0], rgb[1], rgb[2], 255]).collect();
        PixelBuffer::new(w, h, data).unwrap()
    }

    /// Deterministic xorshift noise, every channel independent.
    pub fn noise(w: usize, h: usize, seed: u32) -> PixelBuffer {
        let mut state = seed.max(1);
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        let data = (0..w * h).flat_map(|_| [next(), next(), next(), 255]).collect::<Vec<u8>>();
        PixelBuffer::new(w, h, data).unwrap()
    }

    /// Horizontal grey ramp from 0 to 255.
    pub fn ramp(w: usize, h: usize) -> PixelBuffer {
        let mut data = Vec::with_capacity(w * h * 4);
        for _ in 0..h {
            for x in 0..w {
                let v = (x * 255 / (w - 1).max(1)) as u8;
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        PixelBuffer::new(w, h, data).unwrap()
    }
}
