use aes::cipher::block_padding::NoPadding;
use aes::cipher::{
    AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, InvalidLength, KeyIvInit, StreamCipher,
};
use aes::{Aes128, Aes256};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::helpers::ensure;
use crate::Error;

/// AES block length in bytes; also the IV length for every supported mode.
pub(crate) const BLOCK_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

type HmacSha256 = Hmac<Sha256>;


/// Cipher mode of operation, selected by the token format id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Cfb,
    Ctr,
    Cbc,
}


fn bad_length(_: InvalidLength) -> Error {
    Error::CryptoInvariant("cipher rejected key or IV length")
}


/// Encrypts `buf` in place. Keys of 16 bytes select AES-128, 32 bytes
/// AES-256. CBC requires `buf` to be block-aligned (the caller pads first).
pub(crate) fn encrypt(mode: Mode, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
    match (mode, key.len()) {
        (Mode::Cfb, 16) => Aes128CfbEnc::new_from_slices(key, iv).map_err(bad_length)?.encrypt(buf),
        (Mode::Cfb, 32) => Aes256CfbEnc::new_from_slices(key, iv).map_err(bad_length)?.encrypt(buf),
        (Mode::Ctr, 16) => {
            Aes128Ctr::new_from_slices(key, iv).map_err(bad_length)?.apply_keystream(buf);
        }
        (Mode::Ctr, 32) => {
            Aes256Ctr::new_from_slices(key, iv).map_err(bad_length)?.apply_keystream(buf);
        }
        (Mode::Cbc, 16 | 32) => {
            if buf.len() % BLOCK_LEN != 0 {
                return Err(Error::CryptoInvariant("CBC input is not block-aligned"));
            }
            let msg_len = buf.len();
            if key.len() == 16 {
                Aes128CbcEnc::new_from_slices(key, iv)
                    .map_err(bad_length)?
                    .encrypt_padded_mut::<NoPadding>(buf, msg_len)
                    .map_err(|_| Error::CryptoInvariant("CBC encryption failed"))?;
            } else {
                Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(bad_length)?
                    .encrypt_padded_mut::<NoPadding>(buf, msg_len)
                    .map_err(|_| Error::CryptoInvariant("CBC encryption failed"))?;
            }
        }
        _ => return Err(Error::CryptoInvariant("unsupported AES key length")),
    }
    Ok(())
}


/// Decrypts `buf` in place; the counterpart of [`encrypt`].
///
/// # Errors
/// `InvalidArgument` when a CBC ciphertext is not block-aligned.
pub(crate) fn decrypt(mode: Mode, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error> {
    match (mode, key.len()) {
        (Mode::Cfb, 16) => Aes128CfbDec::new_from_slices(key, iv).map_err(bad_length)?.decrypt(buf),
        (Mode::Cfb, 32) => Aes256CfbDec::new_from_slices(key, iv).map_err(bad_length)?.decrypt(buf),
        (Mode::Ctr, 16) => {
            Aes128Ctr::new_from_slices(key, iv).map_err(bad_length)?.apply_keystream(buf);
        }
        (Mode::Ctr, 32) => {
            Aes256Ctr::new_from_slices(key, iv).map_err(bad_length)?.apply_keystream(buf);
        }
        (Mode::Cbc, 16 | 32) => {
            ensure!(
                buf.len() % BLOCK_LEN == 0,
                "ciphertext length is not a multiple of the cipher block length",
            );
            if key.len() == 16 {
                Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(bad_length)?
                    .decrypt_padded_mut::<NoPadding>(buf)
                    .map_err(|_| Error::CryptoInvariant("CBC decryption failed"))?;
            } else {
                Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(bad_length)?
                    .decrypt_padded_mut::<NoPadding>(buf)
                    .map_err(|_| Error::CryptoInvariant("CBC decryption failed"))?;
            }
        }
        _ => return Err(Error::CryptoInvariant("unsupported AES key length")),
    }
    Ok(())
}


/// HMAC-SHA-256 over the concatenation of `parts`. The result wipes itself.
pub(crate) fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::CryptoInvariant("HMAC rejected its key"))?;
    for part in parts {
        mac.update(part);
    }
    Ok(Zeroizing::new(mac.finalize().into_bytes().to_vec()))
}
