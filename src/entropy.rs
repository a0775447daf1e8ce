/// Shannon-entropy gauge over a stream of bytes.
///
/// Maintains a 256-slot histogram; entropy is computed on demand. Used to
/// gate key derivation on the information content of the source bytes, so
/// that a low-variation key file (or an accidentally truncated one) is
/// rejected before any key material is derived from it.
#[derive(Clone)]
pub(crate) struct EntropyGauge {
    counts: [u64; 256],
    total: u64,
}

impl EntropyGauge {
    pub fn new() -> Self {
        Self { counts: [0; 256], total: 0 }
    }

    /// Folds the given bytes into the histogram.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.counts[b as usize] += 1;
        }
        self.total += bytes.len() as u64;
    }

    /// Shannon entropy of the observed distribution, in bits per byte.
    /// An empty gauge has zero entropy.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn entropy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let total = self.total as f64;
        let mut h = 0.0;
        for &count in &self.counts {
            if count > 0 {
                let p = count as f64 / total;
                h -= p * p.log2();
            }
        }
        h
    }

    /// Total information content of the observed bytes, in bits.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn information_in_bits(&self) -> f64 {
        self.entropy() * self.total as f64
    }

    /// Number of bytes folded in so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total
    }
}
