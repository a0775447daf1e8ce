use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::helpers::{ensure, random_below};
use crate::packed_int;
use crate::Error;

// Blinded layout:
//
//   [prefix_len] [suffix_len] [packed payload_len] [prefix] [payload] [suffix]
//
// Prefix and suffix are random bytes. Their lengths are chosen as small as
// the minimum total length permits and split pseudorandomly between the two
// sides, which keeps the blinded length a function of the payload length
// alone: every payload below the minimum blinds to exactly `min_total`
// bytes, which is what floors the ciphertext size to two blocks and hides
// short lengths.


/// Wraps `payload` in a blinding envelope of at least `min_total` bytes.
///
/// # Errors
/// `InvalidArgument` when the payload is too long for the length header.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn blind(
    rng: &mut impl CryptoRngCore, payload: &[u8], min_total: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let payload_len = u32::try_from(payload.len())
        .ok()
        .filter(|&n| n <= packed_int::MAX_VALUE)
        .ok_or_else(|| Error::InvalidArgument(format!("{} bytes cannot be blinded", payload.len())))?;
    let packed = packed_int::encode(payload_len)?;
    let header_len = 2 + packed.len();

    let deficit = min_total.saturating_sub(header_len + payload.len());
    debug_assert!(deficit <= usize::from(u8::MAX), "blinding deficit exceeds one length byte");
    let prefix_len = random_below(rng, deficit as u32 + 1) as usize;
    let suffix_len = deficit - prefix_len;

    let mut out = Zeroizing::new(Vec::with_capacity(header_len + deficit + payload.len()));
    out.push(prefix_len as u8);
    out.push(suffix_len as u8);
    out.extend_from_slice(&packed);
    let mut blinder = vec![0u8; deficit];
    rng.fill_bytes(&mut blinder);
    out.extend_from_slice(&blinder[..prefix_len]);
    out.extend_from_slice(payload);
    out.extend_from_slice(&blinder[prefix_len..]);
    Ok(out)
}


/// Recovers the payload from a blinded buffer. Trailing bytes beyond the
/// blinding envelope (block-cipher padding) are ignored.
///
/// # Errors
/// `InvalidArgument` when the header is inconsistent with the buffer size.
pub(crate) fn unblind(blinded: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    ensure!(blinded.len() >= 3, "blinded data is too short");
    let prefix_len = usize::from(blinded[0]);
    let suffix_len = usize::from(blinded[1]);
    let (payload_len, packed_len) = packed_int::decode_prefix(&blinded[2..])?;
    let payload_len = payload_len as usize;
    let payload_start = 2 + packed_len + prefix_len;
    let envelope_len = payload_start
        .checked_add(payload_len)
        .and_then(|n| n.checked_add(suffix_len))
        .ok_or_else(|| Error::InvalidArgument("blinding header overflows".to_string()))?;
    ensure!(
        envelope_len <= blinded.len(),
        "blinding header is inconsistent with the data length",
    );
    Ok(Zeroizing::new(
        blinded[payload_start..payload_start + payload_len].to_vec(),
    ))
}


#[cfg(test)]
mod tests {
    use rand_core::{RngCore, SeedableRng};

    use crate::blinding::{blind, unblind};

    fn rng(seed: u64) -> rand_chacha::ChaCha8Rng {
        rand_chacha::ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_round_trip() {
        let mut rng = rng(123);
        for len in 0..=70usize {
            let mut payload = vec![0u8; len];
            rng.fill_bytes(&mut payload);
            let blinded = blind(&mut rng, &payload, 17).unwrap();
            assert_eq!(&*unblind(&blinded).unwrap(), &payload, "length {len}");
        }
    }

    #[test]
    fn test_blinded_length_is_a_function_of_payload_length_only() {
        // below the minimum every payload blinds to exactly min_total bytes
        for len in 0..=13usize {
            let blinded = blind(&mut rng(len as u64), &vec![0xA5; len], 17).unwrap();
            assert_eq!(blinded.len(), 17, "length {len}");
        }
        // above it the envelope is payload plus header
        for len in 15..=60usize {
            let blinded = blind(&mut rng(len as u64), &vec![0xA5; len], 17).unwrap();
            assert_eq!(blinded.len(), len + 3, "length {len}");
        }
    }

    #[test]
    fn test_unblind_ignores_trailing_padding() {
        let mut rng = rng(5);
        let payload = b"shortish payload";
        let mut blinded = blind(&mut rng, payload, 17).unwrap().to_vec();
        blinded.extend_from_slice(&[0xEE; 16]);
        assert_eq!(&*unblind(&blinded).unwrap(), payload);
    }

    #[test]
    fn test_unblind_rejects_inconsistent_headers() {
        assert!(unblind(&[]).is_err());
        assert!(unblind(&[0, 0]).is_err());
        // claims a 63-byte payload in a 4-byte buffer
        assert!(unblind(&[0, 0, 63, 9]).is_err());
        // claims blinders larger than the buffer
        assert!(unblind(&[200, 200, 1, 9, 9, 9]).is_err());
        // truncated packed length header
        assert!(unblind(&[0, 0, 0x80]).is_err());
    }

    #[test]
    fn test_minimum_length_is_respected_for_empty_payload() {
        let blinded = blind(&mut rng(9), &[], 17).unwrap();
        assert_eq!(blinded.len(), 17);
        assert!(unblind(&blinded).unwrap().is_empty());
    }
}
