use crate::helpers::ensure;
use crate::Error;

// A packed unsigned integer stores a value in 1 to 4 bytes. The top two bits
// of the first byte carry (length - 1); the remaining six bits plus any
// following bytes carry the value. Each length starts where the previous one
// ends, so every value has exactly one representation:
//
//   1 byte :            0 ..=         63
//   2 bytes:           64 ..=     16_447
//   3 bytes:       16_448 ..=  4_210_751
//   4 bytes:    4_210_752 ..= 1_077_952_575

/// Largest value representable in a packed unsigned integer.
pub(crate) const MAX_VALUE: u32 = 1_077_952_575;

const OFFSET_2: u32 = 64;
const OFFSET_3: u32 = OFFSET_2 + (1 << 14);
const OFFSET_4: u32 = OFFSET_3 + (1 << 22);


/// Number of bytes of the encoding that starts with `first`.
#[must_use]
pub(crate) fn expected_length(first: u8) -> usize {
    (((first >> 6) & 0x03) + 1) as usize
}


/// Encodes `value` into its unique 1-to-4-byte representation.
///
/// # Errors
/// `InvalidArgument` when `value` exceeds [`MAX_VALUE`].
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode(value: u32) -> Result<Vec<u8>, Error> {
    ensure!(value <= MAX_VALUE, format!("integer {value} is too large to pack"));
    let encoded = match value {
        0..=63 => vec![value as u8],
        64..=16_447 => {
            let v = value - OFFSET_2;
            vec![0x40 | (v >> 8) as u8, v as u8]
        }
        16_448..=4_210_751 => {
            let v = value - OFFSET_3;
            vec![0x80 | (v >> 16) as u8, (v >> 8) as u8, v as u8]
        }
        _ => {
            let v = value - OFFSET_4;
            vec![0xC0 | (v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]
        }
    };
    Ok(encoded)
}


/// Decodes a packed integer from the start of `bytes` and returns it along
/// with the number of bytes consumed. Trailing bytes are permitted.
///
/// # Errors
/// `InvalidArgument` when `bytes` is empty or shorter than the length
/// announced by its first byte.
pub(crate) fn decode_prefix(bytes: &[u8]) -> Result<(u32, usize), Error> {
    ensure!(!bytes.is_empty(), "packed integer must not be empty");
    let length = expected_length(bytes[0]);
    ensure!(
        bytes.len() >= length,
        format!("packed integer needs {length} bytes, got {}", bytes.len()),
    );
    let mut value = u32::from(bytes[0] & 0x3F);
    for &b in &bytes[1..length] {
        value = (value << 8) | u32::from(b);
    }
    let value = match length {
        1 => value,
        2 => value + OFFSET_2,
        3 => value + OFFSET_3,
        _ => value + OFFSET_4,
    };
    Ok((value, length))
}


/// Decodes a buffer that must contain exactly one packed integer.
///
/// # Errors
/// `InvalidArgument` when the buffer is shorter or longer than the length
/// announced by its first byte.
pub(crate) fn decode(bytes: &[u8]) -> Result<u32, Error> {
    let (value, length) = decode_prefix(bytes)?;
    ensure!(
        bytes.len() == length,
        format!("packed integer of {length} bytes followed by {} stray bytes", bytes.len() - length),
    );
    Ok(value)
}


#[cfg(test)]
mod tests {
    use crate::packed_int::{decode, decode_prefix, encode, expected_length, MAX_VALUE};
    use crate::Error;

    #[test]
    fn test_reference_encodings() {
        assert_eq!(encode(0).unwrap(), [0x00]);
        assert_eq!(encode(63).unwrap(), [0x3F]);
        assert_eq!(encode(64).unwrap(), [0x40, 0x00]);
        assert_eq!(encode(16_447).unwrap(), [0x7F, 0xFF]);
        assert_eq!(encode(16_448).unwrap(), [0x80, 0x00, 0x00]);
        assert_eq!(encode(4_210_751).unwrap(), [0xBF, 0xFF, 0xFF]);
        assert_eq!(encode(4_210_752).unwrap(), [0xC0, 0x00, 0x00, 0x00]);
        assert_eq!(encode(1_077_952_575).unwrap(), [0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_round_trip_across_all_length_boundaries() {
        for value in [
            0u32, 1, 62, 63, 64, 65, 300, 16_446, 16_447, 16_448, 16_449, 1_000_000, 4_210_750,
            4_210_751, 4_210_752, 4_210_753, 100_000_000, MAX_VALUE - 1, MAX_VALUE,
        ] {
            let encoded = encode(value).unwrap();
            assert_eq!(decode(&encoded).unwrap(), value, "value {value}");
            assert_eq!(encoded.len(), expected_length(encoded[0]), "value {value}");
        }
    }

    #[test]
    fn test_value_too_large() {
        assert!(matches!(encode(MAX_VALUE + 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(encode(u32::MAX), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_rejects_empty_and_truncated_input() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x40]).is_err());
        assert!(decode(&[0x80, 0x00]).is_err());
        assert!(decode(&[0xC0, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_stray_trailing_bytes() {
        assert!(decode(&[0x3F, 0x00]).is_err());
        assert!(decode(&[0x40, 0x00, 0x12]).is_err());
    }

    #[test]
    fn test_decode_prefix_permits_trailing_bytes() {
        let (value, consumed) = decode_prefix(&[0x40, 0x00, 0x12, 0x34]).unwrap();
        assert_eq!(value, 64);
        assert_eq!(consumed, 2);
    }
}
