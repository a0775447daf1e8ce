use crate::helpers::ensure;
use crate::Error;

// Spell-safe Base32: the alphabet contains no vowels (so encodings cannot
// form words, rude or otherwise), none of the look-alike glyphs l/I/O/0, and
// not the digit 1, which is reserved as the token field separator.

/// The 32-symbol alphabet in value order. Fixed: changing it breaks every
/// previously issued token.
pub(crate) const ALPHABET: &[u8; 32] = b"23456789bcdfghjkmnpqrstvwxyzDFGH";

const INVALID: i8 = -1;

const DECODE_TABLE: [i8; 128] = build_decode_table();

const fn build_decode_table() -> [i8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < 32 {
        table[ALPHABET[i] as usize] = i as i8;
        i += 1;
    }
    table
}


/// Encodes bytes as spell-safe Base32, MSB first, without padding characters.
#[must_use]
pub(crate) fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &b in bytes {
        acc = (acc << 8) | u32::from(b);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((acc >> bits) & 0x1F) as usize]));
        }
    }
    if bits > 0 {
        // final partial group, low bits zero-filled
        out.push(char::from(ALPHABET[((acc << (5 - bits)) & 0x1F) as usize]));
    }
    out
}


/// Decodes a spell-safe Base32 string produced by [`encode`].
///
/// Decoding is strict: the trailing fill bits of the final character must
/// be zero, so every byte string has exactly one accepted encoding and no
/// two encodings decode to the same bytes.
///
/// # Errors
/// `InvalidArgument` on any character outside the alphabet, on an input
/// length no byte string can encode to, or on non-zero trailing fill bits.
pub(crate) fn decode(encoded: &str) -> Result<Vec<u8>, Error> {
    // encodings of n bytes have length ceil(8n / 5); lengths of 1, 3 or 6
    // characters modulo 8 never occur
    ensure!(
        !matches!(encoded.len() % 8, 1 | 3 | 6),
        format!("no byte string encodes to {} base32 characters", encoded.len()),
    );
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for c in encoded.chars() {
        let entry = if c.is_ascii() { DECODE_TABLE[c as usize] } else { INVALID };
        if entry == INVALID {
            return Err(Error::InvalidArgument(format!(
                "character {c:?} is not in the base32 alphabet"
            )));
        }
        acc = (acc << 5) | entry as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            #[allow(clippy::cast_possible_truncation)]
            out.push((acc >> bits) as u8);
        }
    }
    ensure!(
        acc & ((1 << bits) - 1) == 0,
        "base32 encoding has non-zero trailing fill bits",
    );
    Ok(out)
}
