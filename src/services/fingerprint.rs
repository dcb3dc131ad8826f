// Content Fingerprint
// Fast non-cryptographic cache keys for URLs, text and encoded pixels

const SEED: u32 = 5381;
pub const TEXT_PREFIX_CHARS: usize = 500;
pub const ENCODED_PIXEL_PREFIX_CHARS: usize = 256;

/// djb2-xor over the UTF-8 bytes of `input`, wrapping at 32 bits.
pub fn fingerprint(input: &str) -> u32 {
    input
        .bytes()
        .fold(SEED, |hash, b| (hash << 5).wrapping_add(hash) ^ u32::from(b))
}

fn prefix(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

pub fn fingerprint_text(text: &str) -> u32 {
    fingerprint(prefix(text, TEXT_PREFIX_CHARS))
}

pub fn fingerprint_encoded_pixels(encoded: &str) -> u32 {
    fingerprint(prefix(encoded, ENCODED_PIXEL_PREFIX_CHARS))
}

pub fn fingerprint_url(url: &str) -> u32 {
    fingerprint(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_seed() {
        assert_eq!(fingerprint(""), 5381);
    }

    #[test]
    fn test_known_value() {
        // ((5381 << 5) + 5381) ^ 'a'
        assert_eq!(fingerprint("a"), (5381u32 * 33) ^ 97);
    }

    #[test]
    fn test_deterministic_and_discriminating() {
        let a = fingerprint_url("https://example.com/a.png");
        let b = fingerprint_url("https://example.com/a.png");
        let c = fingerprint_url("https://example.com/b.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_text_uses_prefix_only() {
        let base = "x".repeat(TEXT_PREFIX_CHARS);
        let one = format!("{}tail one", base);
        let two = format!("{}tail two", base);
        assert_eq!(fingerprint_text(&one), fingerprint_text(&two));
    }

    #[test]
    fn test_prefix_respects_char_boundaries() {
        let text = "é".repeat(600);
        assert_eq!(fingerprint_text(&text), fingerprint(&"é".repeat(500)));
    }
}
