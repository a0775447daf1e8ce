use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::base32;
use crate::cipher::{Mode, BLOCK_LEN};
use crate::helpers::ensure;
use crate::Error;

// A token is four separator-joined fields: a single format digit, then the
// IV, the ciphertext and the authentication tag. The format digit selects
// everything else:
//
//   id | cipher | padding          | field encoding    | separator | subject
//   ---+--------+------------------+-------------------+-----------+--------
//    1 | CFB    | arbitrary tail   | base64            |     $     | ignored
//    2 | CTR    | arbitrary tail   | base64            |     $     | ignored
//    3 | CTR    | blinded + random | base64            |     $     | ignored
//    4 | CBC    | blinded + random | base64, unpadded  |     $     | ignored
//    5 | CBC    | blinded + random | base64, unpadded  |     $     | honored
//    6 | CBC    | blinded + random | spell-safe base32 |     1     | honored
//
// Only format 6 is ever produced; 1 through 5 decrypt so that stored tokens
// can be upgraded. Format 4 keeping the subject out of its HMAC key is a
// preserved historical defect, not an accident; see the crate documentation.

const LEGACY_SEPARATOR: char = '$';
const CURRENT_SEPARATOR: char = '1';


/// Token format id, `1..=6`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Format(u8);

impl Format {
    /// The only format new tokens are written in.
    pub const CURRENT: Format = Format(6);

    pub fn try_from_digit(digit: char) -> Result<Self, Error> {
        match digit {
            '1'..='6' => Ok(Format(digit as u8 - b'0')),
            _ => Err(Error::InvalidArgument(format!("unknown token format {digit:?}"))),
        }
    }

    /// Numeric id; also the byte bound into the authentication tag.
    pub fn id(self) -> u8 {
        self.0
    }

    pub fn digit(self) -> char {
        char::from(b'0' + self.0)
    }

    pub fn separator(self) -> char {
        if self.0 >= 6 {
            CURRENT_SEPARATOR
        } else {
            LEGACY_SEPARATOR
        }
    }

    pub fn mode(self) -> Mode {
        match self.0 {
            1 => Mode::Cfb,
            2 | 3 => Mode::Ctr,
            _ => Mode::Cbc,
        }
    }

    /// Blinded formats carry the payload length inside the plaintext;
    /// earlier ones use arbitrary-tail padding instead.
    pub fn blinded(self) -> bool {
        self.0 >= 3
    }

    /// Whether the subject participates in key derivation. Format 4 had a
    /// subject on its surface but never mixed it into the keys.
    pub fn subject_aware(self) -> bool {
        self.0 >= 5
    }

    fn encode_field(self, bytes: &[u8]) -> String {
        match self.0 {
            6 => base32::encode(bytes),
            4 | 5 => STANDARD_NO_PAD.encode(bytes),
            _ => STANDARD.encode(bytes),
        }
    }

    fn decode_field(self, field: &str) -> Result<Vec<u8>, Error> {
        match self.0 {
            6 => base32::decode(field),
            4 | 5 => STANDARD_NO_PAD
                .decode(field)
                .map_err(|e| Error::InvalidArgument(format!("invalid base64 token field: {e}"))),
            _ => STANDARD
                .decode(field)
                .map_err(|e| Error::InvalidArgument(format!("invalid base64 token field: {e}"))),
        }
    }
}


/// The three binary fields of a token plus its format. Zeroized on drop so
/// that no ciphertext fragments linger after a decryption.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct EncryptionParts {
    #[zeroize(skip)]
    pub format: Format,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}


/// Renders the parts as a printable token.
pub(crate) fn assemble(parts: &EncryptionParts) -> String {
    let separator = parts.format.separator();
    let mut token = String::new();
    token.push(parts.format.digit());
    token.push(separator);
    token.push_str(&parts.format.encode_field(&parts.iv));
    token.push(separator);
    token.push_str(&parts.format.encode_field(&parts.ciphertext));
    token.push(separator);
    token.push_str(&parts.format.encode_field(&parts.tag));
    token
}


/// Parses and decodes a printable token.
///
/// # Errors
/// `InvalidArgument` on an unknown format digit, a wrong field count, an
/// empty field, a malformed encoding, or an IV of the wrong size.
pub(crate) fn parse(token: &str) -> Result<EncryptionParts, Error> {
    let first = token
        .chars()
        .next()
        .ok_or_else(|| Error::InvalidArgument("empty token".to_string()))?;
    let format = Format::try_from_digit(first)?;

    let fields: Vec<&str> = token.split(format.separator()).collect();
    ensure!(fields.len() == 4, format!("token has {} fields instead of 4", fields.len()));
    ensure!(fields[0].len() == 1, "token format id must be a single digit");
    ensure!(
        !fields[1].is_empty() && !fields[2].is_empty() && !fields[3].is_empty(),
        "token fields must not be empty",
    );

    let iv = format.decode_field(fields[1])?;
    ensure!(
        iv.len() == BLOCK_LEN,
        format!("token IV is {} bytes instead of {BLOCK_LEN}", iv.len()),
    );
    let ciphertext = format.decode_field(fields[2])?;
    let tag = format.decode_field(fields[3])?;
    Ok(EncryptionParts { format, iv, ciphertext, tag })
}
