use std::sync::{Mutex, MutexGuard, PoisonError};

use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::blinding;
use crate::cipher::{self, BLOCK_LEN};
use crate::compare;
use crate::entropy::EntropyGauge;
use crate::helpers::ensure;
use crate::masked::MaskedBytes;
use crate::padding;
use crate::token::{self, EncryptionParts, Format};
use crate::Error;

#[cfg(feature = "default-rng")]
use rand_core::OsRng;

const MIN_KDK_LEN: usize = 14;
const MAX_KDK_LEN: usize = 32;

const MIN_SOURCE_BYTES: u64 = 100;
const MAX_SOURCE_BYTES: u64 = 10_000_000;
const MIN_SOURCE_INFORMATION_BITS: f64 = 128.0;

// Below this many bits per byte the source is treated as having no
// variation at all (2^-13).
const NO_VARIATION_ENTROPY: f64 = 1.0 / 8192.0;

// Blinding to one byte past a block forces every ciphertext to span at
// least two cipher blocks.
const MIN_BLINDED_LEN: usize = BLOCK_LEN + 1;

// Fixed salts around the subject in per-call key derivation.
const SUBJECT_PREFIX: &[u8] = b"Tu";
const SUBJECT_SUFFIX: &[u8] = b"pW";

type HmacSha256 = Hmac<Sha256>;


/// The split-key encryption engine.
///
/// Construction derives two working keys from a caller-supplied
/// key-derivation key and source byte material: the HMAC-SHA-256 of the
/// concatenated sources under the key-derivation key, split into an AES
/// *data key* (low half) and an HMAC *authentication key* (high half). Both
/// halves live in [`MaskedBytes`] containers until [`destroy`](Self::destroy)
/// or drop; the key-derivation key itself is not retained.
///
/// The engine is `Send + Sync`; all operations serialize on one internal
/// mutex. Encryption always emits the newest token format, decryption
/// accepts every historical format.
///
/// # Examples
/// ```rust
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// # #[cfg(feature = "default-rng")] {
/// use splitkey::SplitKey;
///
/// let sources: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
/// let engine = SplitKey::try_new(b"the key derivation key", &[&sources])?;
///
/// let token = engine.try_encrypt("swordfish", "")?;
/// assert_eq!(&*engine.try_decrypt(&token, "")?, "swordfish");
/// # }
/// # Ok(())}
/// ```
pub struct SplitKey {
    keys: Mutex<WorkingKeys>,
}

struct WorkingKeys {
    data_key: MaskedBytes,
    auth_key: MaskedBytes,
}

impl SplitKey {
    /// Derives the working keys from `kdk` and `sources` using the provided
    /// random number generator for the masked key containers.
    ///
    /// # Errors
    /// `InvalidArgument` when the key-derivation key is not 14 to 32 bytes,
    /// when `sources` is empty or contains an empty array, when the total
    /// source length is outside 100 to 10 000 000 bytes, or when the
    /// sources carry fewer than 128 bits of Shannon information.
    pub fn try_new_with_rng(
        rng: &mut impl CryptoRngCore, kdk: &[u8], sources: &[&[u8]],
    ) -> Result<Self, Error> {
        ensure!(
            (MIN_KDK_LEN..=MAX_KDK_LEN).contains(&kdk.len()),
            format!(
                "key derivation key must be {MIN_KDK_LEN} to {MAX_KDK_LEN} bytes, not {}",
                kdk.len()
            ),
        );
        validate_sources(sources)?;

        let mut mac = HmacSha256::new_from_slice(kdk)
            .map_err(|_| Error::CryptoInvariant("HMAC rejected its key"))?;
        for source in sources {
            mac.update(source);
        }
        let digest: Zeroizing<[u8; 32]> = Zeroizing::new(mac.finalize().into_bytes().into());

        let data_key = MaskedBytes::try_new_with_rng(rng, &digest[..16])?;
        let auth_key = MaskedBytes::try_new_with_rng(rng, &digest[16..])?;
        Ok(Self { keys: Mutex::new(WorkingKeys { data_key, auth_key }) })
    }

    /// As [`try_new_with_rng`](Self::try_new_with_rng) with the operating
    /// system random number generator.
    ///
    /// # Errors
    /// See [`try_new_with_rng`](Self::try_new_with_rng).
    #[cfg(feature = "default-rng")]
    pub fn try_new(kdk: &[u8], sources: &[&[u8]]) -> Result<Self, Error> {
        Self::try_new_with_rng(&mut OsRng, kdk, sources)
    }

    /// Encrypts `plaintext` into a printable token. The empty subject means
    /// "no subject"; a non-empty subject domain-separates the derived keys,
    /// so the token only decrypts under the same subject.
    ///
    /// # Errors
    /// `Destroyed` after [`destroy`](Self::destroy); `InvalidArgument` when
    /// the plaintext is too long for the length header.
    pub fn try_encrypt_bytes_with_rng(
        &self, rng: &mut impl CryptoRngCore, plaintext: &[u8], subject: &str,
    ) -> Result<String, Error> {
        let keys = self.lock();
        ensure_live(&keys)?;

        let mut work = blinding::blind(rng, plaintext, MIN_BLINDED_LEN)?;
        padding::pad_random(rng, &mut work, BLOCK_LEN);

        let mut iv = vec![0u8; BLOCK_LEN];
        rng.fill_bytes(&mut iv);

        let data_key = effective_data_key(&keys, subject)?;
        cipher::encrypt(Format::CURRENT.mode(), &data_key, &iv, &mut work)?;

        let auth_key = effective_auth_key(&keys, subject)?;
        let mut tag = cipher::hmac_sha256(&auth_key, &[&[Format::CURRENT.id()], &iv, &work])?;

        let parts = EncryptionParts {
            format: Format::CURRENT,
            iv,
            ciphertext: std::mem::take(&mut *work),
            tag: std::mem::take(&mut *tag),
        };
        Ok(token::assemble(&parts))
    }

    /// As [`try_encrypt_bytes_with_rng`](Self::try_encrypt_bytes_with_rng)
    /// with the operating system random number generator.
    ///
    /// # Errors
    /// See [`try_encrypt_bytes_with_rng`](Self::try_encrypt_bytes_with_rng).
    #[cfg(feature = "default-rng")]
    pub fn try_encrypt_bytes(&self, plaintext: &[u8], subject: &str) -> Result<String, Error> {
        self.try_encrypt_bytes_with_rng(&mut OsRng, plaintext, subject)
    }

    /// Encrypts a character string; the UTF-8 bytes of `plaintext` are what
    /// ends up in the token.
    ///
    /// # Errors
    /// See [`try_encrypt_bytes_with_rng`](Self::try_encrypt_bytes_with_rng).
    pub fn try_encrypt_with_rng(
        &self, rng: &mut impl CryptoRngCore, plaintext: &str, subject: &str,
    ) -> Result<String, Error> {
        self.try_encrypt_bytes_with_rng(rng, plaintext.as_bytes(), subject)
    }

    /// As [`try_encrypt_with_rng`](Self::try_encrypt_with_rng) with the
    /// operating system random number generator.
    ///
    /// # Errors
    /// See [`try_encrypt_bytes_with_rng`](Self::try_encrypt_bytes_with_rng).
    #[cfg(feature = "default-rng")]
    pub fn try_encrypt(&self, plaintext: &str, subject: &str) -> Result<String, Error> {
        self.try_encrypt_bytes(plaintext.as_bytes(), subject)
    }

    /// Decrypts a token of any supported format back into bytes. The
    /// returned buffer zeroizes itself on drop.
    ///
    /// Formats 5 and 6 require the same subject the token was encrypted
    /// under; formats 1 to 4 never mixed the subject into their keys, so it
    /// is ignored for them.
    ///
    /// # Errors
    /// `DataIntegrity` when the authentication tag does not match (wrong
    /// key, wrong subject, or tampering); `InvalidArgument` on a malformed
    /// token; `Destroyed` after [`destroy`](Self::destroy).
    pub fn try_decrypt_bytes(&self, token: &str, subject: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
        let keys = self.lock();
        ensure_live(&keys)?;

        let mut parts = token::parse(token)?;
        let format = parts.format;
        let subject = if format.subject_aware() { subject } else { "" };

        let auth_key = effective_auth_key(&keys, subject)?;
        let expected =
            cipher::hmac_sha256(&auth_key, &[&[format.id()], &parts.iv, &parts.ciphertext])?;
        if !compare::equals(&expected, &parts.tag) {
            return Err(Error::DataIntegrity);
        }

        let data_key = effective_data_key(&keys, subject)?;
        let mut work = Zeroizing::new(std::mem::take(&mut parts.ciphertext));
        cipher::decrypt(format.mode(), &data_key, &parts.iv, &mut work)?;

        if format.blinded() {
            blinding::unblind(&work)
        } else {
            Ok(Zeroizing::new(padding::unpad_arbitrary_tail(&work)?.to_vec()))
        }
    }

    /// Decrypts a token into a character string.
    ///
    /// # Errors
    /// As [`try_decrypt_bytes`](Self::try_decrypt_bytes), plus
    /// `CharacterCoding` when the plaintext is not valid UTF-8.
    pub fn try_decrypt(&self, token: &str, subject: &str) -> Result<Zeroizing<String>, Error> {
        let mut bytes = self.try_decrypt_bytes(token, subject)?;
        let raw = std::mem::take(&mut *bytes);
        match String::from_utf8(raw) {
            Ok(text) => Ok(Zeroizing::new(text)),
            Err(err) => {
                let mut raw = err.into_bytes();
                raw.zeroize();
                Err(Error::CharacterCoding)
            }
        }
    }

    /// Zeroizes and invalidates both masked key containers. Idempotent;
    /// every later `encrypt` or `decrypt` fails with `Destroyed`. Dropping
    /// the engine has the same effect.
    pub fn destroy(&self) {
        let mut keys = self.lock();
        keys.data_key.destroy();
        keys.auth_key.destroy();
    }

    // A panicking lock holder cannot leave the key containers half-written
    // (no operation mutates them after construction), so a poisoned mutex
    // is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, WorkingKeys> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


fn ensure_live(keys: &WorkingKeys) -> Result<(), Error> {
    if keys.data_key.is_valid() && keys.auth_key.is_valid() {
        Ok(())
    } else {
        Err(Error::Destroyed)
    }
}


fn validate_sources(sources: &[&[u8]]) -> Result<(), Error> {
    ensure!(!sources.is_empty(), "at least one source byte array is required");
    let mut gauge = EntropyGauge::new();
    for source in sources {
        ensure!(!source.is_empty(), "source byte arrays must not be empty");
        gauge.add_bytes(source);
    }
    let total = gauge.total_bytes();
    ensure!(
        total >= MIN_SOURCE_BYTES,
        format!("there are fewer than {MIN_SOURCE_BYTES} source bytes: {total}"),
    );
    ensure!(
        total <= MAX_SOURCE_BYTES,
        format!("there are more than {MAX_SOURCE_BYTES} source bytes: {total}"),
    );
    if gauge.information_in_bits() < MIN_SOURCE_INFORMATION_BITS {
        let entropy = gauge.entropy();
        if entropy > NO_VARIATION_ENTROPY {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let needed = (MIN_SOURCE_INFORMATION_BITS / entropy).ceil() as u64 + 1;
            return Err(Error::InvalidArgument(format!(
                "source bytes carry too little information, supply at least {needed} bytes"
            )));
        }
        return Err(Error::InvalidArgument(
            "source bytes have no information, all bytes are the same".to_string(),
        ));
    }
    Ok(())
}


// Subject-dependent key derivation: a non-empty subject replaces each base
// key with HMAC-SHA-256 keyed by the *other* base key over
// `own_base || "Tu" || subject || "pW"`. The derived keys are a full 32
// bytes, so encryption under a subject runs AES-256.

fn subject_keyed(
    mac_key: &[u8], own_base: &[u8], subject: &str,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    cipher::hmac_sha256(
        mac_key,
        &[own_base, SUBJECT_PREFIX, subject.as_bytes(), SUBJECT_SUFFIX],
    )
}

fn effective_data_key(keys: &WorkingKeys, subject: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let base = keys.data_key.get_data()?;
    if subject.is_empty() {
        return Ok(base);
    }
    let auth_base = keys.auth_key.get_data()?;
    subject_keyed(&auth_base, &base, subject)
}

fn effective_auth_key(keys: &WorkingKeys, subject: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let base = keys.auth_key.get_data()?;
    if subject.is_empty() {
        return Ok(base);
    }
    let data_base = keys.data_key.get_data()?;
    subject_keyed(&data_base, &base, subject)
}


#[cfg(test)]
mod tests {
    use rand_core::{CryptoRngCore, SeedableRng};
    use zeroize::Zeroizing;

    use crate::cipher::{self, BLOCK_LEN};
    use crate::split_key::{subject_keyed, SplitKey, MIN_BLINDED_LEN};
    use crate::token::{self, EncryptionParts, Format};
    use crate::{blinding, padding, Error};

    const KDK: [u8; 32] = [0xAA; 32];

    fn rng(seed: u64) -> rand_chacha::ChaCha8Rng {
        rand_chacha::ChaCha8Rng::seed_from_u64(seed)
    }

    fn sources() -> Vec<u8> {
        (0..200u16).map(|i| (i % 256) as u8).collect()
    }

    fn engine(seed: u64) -> SplitKey {
        SplitKey::try_new_with_rng(&mut rng(seed), &KDK, &[&sources()]).unwrap()
    }

    /// The two base keys exactly as the engine derives them.
    fn base_keys() -> (Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>) {
        let digest = cipher::hmac_sha256(&KDK, &[&sources()]).unwrap();
        (
            Zeroizing::new(digest[..16].to_vec()),
            Zeroizing::new(digest[16..].to_vec()),
        )
    }

    /// Builds a token in any historical format, mirroring the decryption
    /// matrix in reverse. Only formats 5 and 6 bind the subject.
    fn historical_token(
        rng: &mut impl CryptoRngCore, digit: char, plaintext: &[u8], subject: &str,
    ) -> String {
        let format = Format::try_from_digit(digit).unwrap();
        let subject = if format.subject_aware() { subject } else { "" };
        let (data_base, auth_base) = base_keys();
        let data_key = if subject.is_empty() {
            data_base.clone()
        } else {
            subject_keyed(&auth_base, &data_base, subject).unwrap()
        };
        let auth_key = if subject.is_empty() {
            auth_base.clone()
        } else {
            subject_keyed(&data_base, &auth_base, subject).unwrap()
        };

        let mut work = if format.blinded() {
            blinding::blind(rng, plaintext, MIN_BLINDED_LEN).unwrap()
        } else {
            Zeroizing::new(plaintext.to_vec())
        };
        if format.blinded() {
            padding::pad_random(rng, &mut work, BLOCK_LEN);
        } else {
            padding::pad_arbitrary_tail(rng, &mut work, BLOCK_LEN);
        }

        let mut iv = vec![0u8; BLOCK_LEN];
        rng.fill_bytes(&mut iv);
        cipher::encrypt(format.mode(), &data_key, &iv, &mut work).unwrap();
        let tag = cipher::hmac_sha256(&auth_key, &[&[format.id()], &iv, &work]).unwrap();
        token::assemble(&EncryptionParts {
            format,
            iv,
            ciphertext: work.to_vec(),
            tag: tag.to_vec(),
        })
    }

    #[test]
    fn test_kdk_length_bounds() {
        let sources = sources();
        let sources: &[&[u8]] = &[&sources];
        assert!(SplitKey::try_new_with_rng(&mut rng(1), &[0xAA; 13], sources).is_err());
        assert!(SplitKey::try_new_with_rng(&mut rng(1), &[0xAA; 14], sources).is_ok());
        assert!(SplitKey::try_new_with_rng(&mut rng(1), &[0xAA; 32], sources).is_ok());
        assert!(SplitKey::try_new_with_rng(&mut rng(1), &[0xAA; 33], sources).is_err());
    }

    #[test]
    fn test_source_validation_messages() {
        fn message(result: Result<SplitKey, Error>) -> String {
            match result {
                Err(Error::InvalidArgument(message)) => message,
                other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
            }
        }

        let empty: &[&[u8]] = &[];
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, empty))
            .contains("at least one source"));
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, &[&sources(), &[]]))
            .contains("must not be empty"));

        let ninety: Vec<u8> = (0..90u8).collect();
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, &[&ninety]))
            .contains("fewer than 100 source bytes"));

        let huge = vec![0x5Au8; 16_000_000];
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, &[&huge]))
            .contains("more than 10000000 source bytes"));

        let zeros = [0u8; 100];
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, &[&zeros]))
            .contains("no information"));

        let mut nearly_constant = vec![0u8; 110];
        nearly_constant[0] = 1;
        assert!(message(SplitKey::try_new_with_rng(&mut rng(1), &KDK, &[&nearly_constant]))
            .contains("supply at least"));
    }

    #[test]
    fn test_multiple_source_arrays_concatenate() {
        let all = sources();
        let split = SplitKey::try_new_with_rng(&mut rng(2), &KDK, &[&all[..77], &all[77..]]).unwrap();
        let whole = SplitKey::try_new_with_rng(&mut rng(3), &KDK, &[&all]).unwrap();
        let token = split
            .try_encrypt_with_rng(&mut rng(4), "shared derivation", "")
            .unwrap();
        assert_eq!(&*whole.try_decrypt(&token, "").unwrap(), "shared derivation");
    }

    #[test]
    fn test_historical_formats_decrypt() {
        let engine = engine(10);
        let mut rng = rng(11);
        for digit in '1'..='5' {
            let token = historical_token(&mut rng, digit, b"legacy plaintext", "");
            let plain = engine.try_decrypt_bytes(&token, "").unwrap();
            assert_eq!(&*plain, b"legacy plaintext", "format {digit}");
        }
    }

    #[test]
    fn test_historical_format_five_honors_subject() {
        let engine = engine(20);
        let token = historical_token(&mut rng(21), '5', b"subject bound", "zone-a");
        assert_eq!(&*engine.try_decrypt_bytes(&token, "zone-a").unwrap(), b"subject bound");
        assert!(matches!(
            engine.try_decrypt_bytes(&token, "zone-b"),
            Err(Error::DataIntegrity)
        ));
        assert!(matches!(engine.try_decrypt_bytes(&token, ""), Err(Error::DataIntegrity)));
    }

    #[test]
    fn test_historical_format_four_ignores_subject() {
        // format 4 never mixed the subject into either key, so a token
        // decrypts identically with and without one
        let engine = engine(30);
        let token = historical_token(&mut rng(31), '4', b"tenant secret", "");
        assert!(token.starts_with("4$"));
        assert_eq!(&*engine.try_decrypt_bytes(&token, "").unwrap(), b"tenant secret");
        assert_eq!(
            &*engine.try_decrypt_bytes(&token, "some subject").unwrap(),
            b"tenant secret"
        );
    }

    #[test]
    fn test_decrypt_rejects_tampering_in_every_field() {
        let engine = engine(40);
        let token = engine
            .try_encrypt_bytes_with_rng(&mut rng(41), b"tamper target", "")
            .unwrap();
        let fields: Vec<&str> = token.split('1').collect();
        assert_eq!(fields.len(), 4);
        for field in 1..4 {
            let mut damaged: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
            let original = damaged[field].remove(0);
            let replacement = if original == '2' { '3' } else { '2' };
            damaged[field].insert(0, replacement);
            let damaged = damaged.join("1");
            assert!(
                matches!(engine.try_decrypt_bytes(&damaged, ""), Err(Error::DataIntegrity)),
                "field {field}"
            );
        }
    }

    #[test]
    fn test_destroy_blocks_further_use_and_is_idempotent() {
        let engine = engine(50);
        let token = engine.try_encrypt_with_rng(&mut rng(51), "short lived", "").unwrap();
        engine.destroy();
        engine.destroy();
        assert!(matches!(
            engine.try_encrypt_with_rng(&mut rng(52), "more", ""),
            Err(Error::Destroyed)
        ));
        assert!(matches!(engine.try_decrypt(&token, ""), Err(Error::Destroyed)));
    }

    #[test]
    fn test_non_utf8_plaintext_is_rejected_as_characters_but_fine_as_bytes() {
        let engine = engine(60);
        let raw = [0xFFu8, 0xFE, 0x00, 0x80];
        let token = engine.try_encrypt_bytes_with_rng(&mut rng(61), &raw, "").unwrap();
        assert_eq!(&*engine.try_decrypt_bytes(&token, "").unwrap(), &raw);
        assert!(matches!(engine.try_decrypt(&token, ""), Err(Error::CharacterCoding)));
    }

    #[test]
    fn test_engine_is_usable_across_threads() {
        let engine = std::sync::Arc::new(engine(70));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                let mut rng = rng(100 + t);
                for i in 0..8 {
                    let plain = format!("thread {t} item {i}");
                    let token = engine.try_encrypt_with_rng(&mut rng, &plain, "shared").unwrap();
                    assert_eq!(&*engine.try_decrypt(&token, "shared").unwrap(), &plain);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
