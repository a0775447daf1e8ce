use subtle::ConstantTimeEq;


/// Length-oblivious constant-time byte-array equality.
///
/// The running time depends only on `min(|a|, |b|)`, never on where the
/// first mismatch sits and never on whether the lengths agree. Unequal
/// lengths compare as unequal after the shared prefix has been scanned.
#[must_use]
pub(crate) fn equals(a: &[u8], b: &[u8]) -> bool {
    let n = a.len().min(b.len());
    let mut acc = 0u8;
    for i in 0..n {
        acc |= a[i] ^ b[i];
    }
    (acc.ct_eq(&0) & a.len().ct_eq(&b.len())).into()
}
