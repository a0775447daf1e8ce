#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use thiserror::Error;

// Functionality map
//
// Split-key derivation, envelope engine          --> split_key.rs
// Versioned token grammar (formats 1..=6)        --> token.rs
// AES-CFB/CTR/CBC and HMAC-SHA-256 dispatch      --> cipher.rs
// Masked in-memory secret container              --> masked.rs
// Position-dependent mask generator              --> index_mask.rs
// Spell-safe Base32 codec                        --> base32.rs
// Packed unsigned integer codec                  --> packed_int.rs
// Length blinding                                --> blinding.rs
// Random / arbitrary-tail padding                --> padding.rs
// Shannon entropy gate over source bytes         --> entropy.rs
// Constant-time byte comparison                  --> compare.rs

mod base32;
mod blinding;
mod cipher;
mod compare;
mod entropy;
mod helpers;
mod index_mask;
mod masked;
mod packed_int;
mod padding;
mod split_key;
mod token;

pub use masked::MaskedBytes;
pub use split_key::SplitKey;


/// All fallible operations in this crate report one of these error kinds.
///
/// `DataIntegrity` is the only failure an application should expect to see
/// during normal operation (a wrong key, wrong subject, or tampered token).
/// `Destroyed` indicates a lifecycle bug in the caller, and
/// `CryptoInvariant` a defect in an underlying primitive; neither should be
/// observable in a correct deployment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An input violated a documented constraint: lengths, entropy, token
    /// shape, out-of-range integers, invalid encoding characters, or a
    /// malformed blinding header.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The authentication tag did not match the token contents.
    #[error("token failed authentication")]
    DataIntegrity,

    /// The decrypted plaintext is not valid UTF-8 but a character string
    /// was requested.
    #[error("decrypted data is not a valid UTF-8 string")]
    CharacterCoding,

    /// The engine or a masked container was used after `destroy`.
    #[error("use after destroy")]
    Destroyed,

    /// A lower-level cryptographic primitive reported an error that cannot
    /// occur against a conforming implementation.
    #[error("cryptographic invariant violated: {0}")]
    CryptoInvariant(&'static str),
}
