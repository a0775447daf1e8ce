use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

/// Deterministic pseudorandom mask over integer positions.
///
/// Each instance draws a fresh AES-128 key from the secure random source at
/// construction; the mask for a position is taken from the encryption of a
/// block derived from that position. Two generators built back to back thus
/// produce independent masks. Positions are signed so that callers can keep
/// a few negative sentinel positions that can never collide with a buffer
/// index.
pub(crate) struct IndexMask {
    cipher: Aes128,
}

impl IndexMask {
    pub fn new_with_rng(rng: &mut impl CryptoRngCore) -> Self {
        let mut key = [0u8; 16];
        rng.fill_bytes(&mut key);
        let cipher = Aes128::new(&key.into());
        key.zeroize();
        Self { cipher }
    }

    /// 32-bit mask for `position`.
    #[must_use]
    pub fn mask_u32(&self, position: i64) -> u32 {
        let p = position.to_le_bytes();
        let mut block = Block::default();
        block[..8].copy_from_slice(&p);
        block[8..].copy_from_slice(&p);
        self.cipher.encrypt_block(&mut block);
        u32::from_be_bytes([block[0], block[1], block[2], block[3]])
    }

    /// Byte mask for `position`: the low byte of [`Self::mask_u32`].
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn mask_u8(&self, position: i64) -> u8 {
        (self.mask_u32(position) & 0xFF) as u8
    }
}
