use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use rand_core::CryptoRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::compare;
use crate::helpers::{ensure, random_below};
use crate::index_mask::IndexMask;
use crate::Error;

#[cfg(feature = "default-rng")]
use rand_core::OsRng;

// The backing store always grows to the next multiple of this, so the store
// length reveals the payload length only up to a 50-byte bucket.
const STORE_BLOCK_LEN: usize = 50;

// Largest payload a store can hold.
const MAX_PAYLOAD_LEN: usize = (i32::MAX as usize / STORE_BLOCK_LEN) * STORE_BLOCK_LEN;

// Sentinel positions for the masked scalar fields. Negative, so they can
// never collide with a buffer position.
const START_SENTINEL: i64 = -3;
const LENGTH_SENTINEL: i64 = -59;


/// An in-memory byte container that resists casual memory inspection.
///
/// The payload is scattered through a larger random-filled buffer via a
/// secret permutation and XOR-masked with a position-dependent mask, so a
/// memory snapshot of the process does not show the payload as a contiguous
/// (or even recognizable) run of bytes. Even the payload length and its
/// start offset are stored masked.
///
/// This is defense in depth, not a cryptographic barrier: code running
/// inside the process can always reassemble the payload, exactly as
/// [`get_data`](Self::get_data) does.
///
/// [`destroy`](Self::destroy) zeroizes the store and invalidates the
/// container; every later access fails with [`Error::Destroyed`]. Dropping
/// the container destroys it implicitly.
pub struct MaskedBytes {
    data: Vec<u8>,
    index: Vec<u32>,
    mask: Option<IndexMask>,
    masked_start: u32,
    masked_length: u32,
    // lazily recomputed after mutation
    hash: Cell<Option<u64>>,
}

impl MaskedBytes {
    /// Copies `source` into a fresh scatter-masked store, drawing the
    /// permutation, the fill bytes and the mask secret from `rng`.
    ///
    /// # Errors
    /// `InvalidArgument` when the payload exceeds the maximum store size.
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_new_with_rng(rng: &mut impl CryptoRngCore, source: &[u8]) -> Result<Self, Error> {
        ensure!(
            source.len() <= MAX_PAYLOAD_LEN,
            format!("a masked store cannot hold {} bytes", source.len()),
        );
        let store_len = source.len() + (STORE_BLOCK_LEN - source.len() % STORE_BLOCK_LEN);
        let mask = IndexMask::new_with_rng(rng);

        let mut data = vec![0u8; store_len];
        rng.fill_bytes(&mut data);

        // Fisher-Yates permutation of the physical slots
        let mut index: Vec<u32> = (0..store_len as u32).collect();
        for i in (1..store_len).rev() {
            let j = random_below(rng, (i + 1) as u32) as usize;
            index.swap(i, j);
        }

        let start = random_below(rng, (store_len - source.len() + 1) as u32) as usize;
        for (i, &b) in source.iter().enumerate() {
            let physical = index[i + start] as usize;
            data[physical] = b ^ mask.mask_u8(i as i64);
        }
        for (position, slot) in index.iter_mut().enumerate() {
            *slot ^= mask.mask_u32(position as i64);
        }
        let masked_start = (start as u32) ^ mask.mask_u32(START_SENTINEL);
        let masked_length = (source.len() as u32) ^ mask.mask_u32(LENGTH_SENTINEL);

        Ok(Self {
            data,
            index,
            mask: Some(mask),
            masked_start,
            masked_length,
            hash: Cell::new(None),
        })
    }

    /// As [`try_new_with_rng`](Self::try_new_with_rng) with the operating
    /// system random number generator.
    ///
    /// # Errors
    /// `InvalidArgument` when the payload exceeds the maximum store size.
    #[cfg(feature = "default-rng")]
    pub fn try_new(source: &[u8]) -> Result<Self, Error> {
        Self::try_new_with_rng(&mut OsRng, source)
    }

    /// Whether the container still holds its payload. `false` once
    /// [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.mask.is_some()
    }

    /// Payload length in bytes.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy).
    pub fn len(&self) -> Result<usize, Error> {
        let mask = self.mask_ref()?;
        Ok(self.length(mask))
    }

    /// Reads the payload byte at logical index `index`.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy); `InvalidArgument` when
    /// the index is out of bounds.
    pub fn get_at(&self, index: usize) -> Result<u8, Error> {
        let mask = self.mask_ref()?;
        ensure!(index < self.length(mask), format!("index {index} is out of bounds"));
        Ok(self.data[self.physical(mask, index)] ^ mask.mask_u8(index as i64))
    }

    /// Overwrites the payload byte at logical index `index`.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy); `InvalidArgument` when
    /// the index is out of bounds.
    pub fn set_at(&mut self, index: usize, value: u8) -> Result<(), Error> {
        let mask = self.mask_ref()?;
        ensure!(index < self.length(mask), format!("index {index} is out of bounds"));
        let physical = self.physical(mask, index);
        self.data[physical] = value ^ mask.mask_u8(index as i64);
        self.hash.set(None);
        Ok(())
    }

    /// Returns a freshly assembled plaintext copy of the payload. The copy
    /// zeroizes itself when dropped.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy).
    pub fn get_data(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mask = self.mask_ref()?;
        let length = self.length(mask);
        let mut out = Zeroizing::new(vec![0u8; length]);
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data[self.physical(mask, i)] ^ mask.mask_u8(i as i64);
        }
        Ok(out)
    }

    /// Hash of the payload contents, cached until the next mutation.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy).
    pub fn content_hash(&self) -> Result<u64, Error> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash);
        }
        let plain = self.get_data()?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&plain);
        let hash = hasher.finish();
        self.hash.set(Some(hash));
        Ok(hash)
    }

    /// Zeroizes the store and the permutation table, drops the mask
    /// generator and marks the container invalid. Idempotent.
    pub fn destroy(&mut self) {
        if self.mask.take().is_some() {
            self.data.zeroize();
            self.index.zeroize();
            self.masked_start = 0;
            self.masked_length = 0;
            self.hash.set(None);
        }
    }

    fn mask_ref(&self) -> Result<&IndexMask, Error> {
        self.mask.as_ref().ok_or(Error::Destroyed)
    }

    fn start(&self, mask: &IndexMask) -> usize {
        (self.masked_start ^ mask.mask_u32(START_SENTINEL)) as usize
    }

    fn length(&self, mask: &IndexMask) -> usize {
        (self.masked_length ^ mask.mask_u32(LENGTH_SENTINEL)) as usize
    }

    fn physical(&self, mask: &IndexMask, index: usize) -> usize {
        let position = index + self.start(mask);
        (self.index[position] ^ mask.mask_u32(position as i64)) as usize
    }
}

impl Drop for MaskedBytes {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Constant-time payload comparison. The temporary plaintext copies zeroize
/// themselves. A destroyed container compares unequal to everything,
/// including itself, so no `Eq` implementation is provided.
impl PartialEq for MaskedBytes {
    fn eq(&self, other: &Self) -> bool {
        match (self.get_data(), other.get_data()) {
            (Ok(a), Ok(b)) => compare::equals(&a, &b),
            _ => false,
        }
    }
}

// Redacted: never prints the payload, so `MaskedBytes` remains safe to
// include in debug output without leaking the secret it guards.
impl std::fmt::Debug for MaskedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskedBytes").finish_non_exhaustive()
    }
}
