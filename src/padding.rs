use rand_core::CryptoRngCore;

use crate::helpers::ensure;
use crate::Error;

// Two padding schemes coexist. New ciphertexts always use random padding,
// whose removal is implicit because the blinding envelope carries the true
// payload length. Arbitrary-tail padding survives only for decrypting the
// two oldest token formats, which predate blinding.


/// Appends random bytes up to the next block boundary; a full block when the
/// buffer is already aligned. At least one byte is always appended.
pub(crate) fn pad_random(rng: &mut impl CryptoRngCore, data: &mut Vec<u8>, block_len: usize) {
    let pad_len = block_len - data.len() % block_len;
    let mut pad = vec![0u8; pad_len];
    rng.fill_bytes(&mut pad);
    data.extend_from_slice(&pad);
}


/// Appends one repeated pad byte up to the next block boundary; a full block
/// when the buffer is already aligned. The pad byte is drawn until it
/// differs from the final payload byte, so removal never eats payload.
/// Only exercised by the legacy-format tests; current tokens carry their
/// length in the blinding envelope instead.
#[cfg(test)]
pub(crate) fn pad_arbitrary_tail(
    rng: &mut impl CryptoRngCore, data: &mut Vec<u8>, block_len: usize,
) {
    let pad_len = block_len - data.len() % block_len;
    let last = data.last().copied();
    let mut draw = [0u8; 1];
    loop {
        rng.fill_bytes(&mut draw);
        if Some(draw[0]) != last {
            break;
        }
    }
    data.resize(data.len() + pad_len, draw[0]);
}


/// Strips every contiguous occurrence of the trailing byte.
///
/// # Errors
/// `InvalidArgument` on an empty buffer.
pub(crate) fn unpad_arbitrary_tail(data: &[u8]) -> Result<&[u8], Error> {
    ensure!(!data.is_empty(), "padded data must not be empty");
    let pad = data[data.len() - 1];
    let end = data.iter().rposition(|&b| b != pad).map_or(0, |p| p + 1);
    Ok(&data[..end])
}
