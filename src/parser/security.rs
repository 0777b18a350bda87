//! Standard security handler.
//!
//! lopdf decrypts the RC4 revisions (V1 and V2) itself. Version 4
//! documents are routed through here: an RC4 crypt filter is handed back to
//! lopdf with the dictionary rewritten as V2, and an AESV2 filter is
//! decrypted with AES-128-CBC under the key lopdf derives. AES-256 (V5) is
//! not supported.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use lopdf::encryption::{get_encryption_key, DecryptionError};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};
use md5::{Digest, Md5};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const AES_BLOCK: usize = 16;

/// Appended to the object key for AES (Algorithm 1, step b).
const AES_SALT: &[u8] = b"sAlT";

/// How strings and streams of an encrypted document are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CryptMethod {
    /// V1/V2 RC4, decrypted by lopdf
    Rc4,
    /// RC4 selected through a V4 crypt filter
    Rc4Filter { key_bits: i64 },
    /// AES-128 selected through a V4 crypt filter
    Aes128,
}

/// Read the crypt method from the `/Encrypt` dictionary.
pub(crate) fn crypt_method(doc: &LopdfDocument) -> Result<CryptMethod, DecryptionError> {
    let dict = doc
        .get_encrypted()
        .map_err(|_| DecryptionError::MissingEncryptDictionary)?;
    match dict.get(b"V").and_then(Object::as_i64).unwrap_or(0) {
        1 | 2 => Ok(CryptMethod::Rc4),
        4 => crypt_filter_method(dict),
        _ => Err(DecryptionError::UnsupportedEncryption),
    }
}

fn crypt_filter_method(dict: &Dictionary) -> Result<CryptMethod, DecryptionError> {
    let revision = dict
        .get(b"R")
        .and_then(Object::as_i64)
        .map_err(|_| DecryptionError::MissingRevision)?;
    // Unencrypted metadata changes the key derivation
    let encrypt_metadata = dict
        .get(b"EncryptMetadata")
        .and_then(Object::as_bool)
        .unwrap_or(true);
    if revision != 4 || !encrypt_metadata {
        return Err(DecryptionError::UnsupportedEncryption);
    }

    let stream_filter = dict.get(b"StmF").and_then(Object::as_name_str).unwrap_or("Identity");
    let string_filter = dict.get(b"StrF").and_then(Object::as_name_str).unwrap_or("Identity");
    if stream_filter != string_filter || stream_filter == "Identity" {
        return Err(DecryptionError::UnsupportedEncryption);
    }

    let filter = dict
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|cf| cf.get(stream_filter.as_bytes()))
        .and_then(Object::as_dict)
        .map_err(|_| DecryptionError::InvalidType)?;
    match filter.get(b"CFM").and_then(Object::as_name_str) {
        Ok("AESV2") => Ok(CryptMethod::Aes128),
        Ok("V2") => {
            // Writers disagree on whether this is bytes or bits
            let length = filter.get(b"Length").and_then(Object::as_i64).unwrap_or(16);
            let key_bits = if length <= 16 { length * 8 } else { length };
            Ok(CryptMethod::Rc4Filter { key_bits })
        }
        _ => Err(DecryptionError::UnsupportedEncryption),
    }
}

/// Decrypt every string and stream of `doc` with the user `password`.
///
/// The `/Encrypt` dictionary may be rewritten even when the password is
/// wrong, so callers pass a copy they can discard.
pub(crate) fn decrypt(doc: &mut LopdfDocument, password: &str) -> lopdf::Result<()> {
    match crypt_method(doc)? {
        CryptMethod::Rc4 => doc.decrypt(password),
        CryptMethod::Rc4Filter { key_bits } => {
            rewrite_as_rc4(doc, key_bits)?;
            doc.decrypt(password)
        }
        CryptMethod::Aes128 => decrypt_aes(doc, password),
    }
}

/// Present a V4 dictionary as V2 R3, whose key derivation and password
/// check are the same as R4 when metadata is encrypted.
fn rewrite_as_rc4(doc: &mut LopdfDocument, key_bits: i64) -> lopdf::Result<()> {
    let id = doc.trailer.get(b"Encrypt").and_then(Object::as_reference)?;
    let dict = doc.get_object_mut(id).and_then(Object::as_dict_mut)?;
    dict.set("V", 2_i64);
    dict.set("R", 3_i64);
    dict.set("Length", key_bits);
    Ok(())
}

fn decrypt_aes(doc: &mut LopdfDocument, password: &str) -> lopdf::Result<()> {
    let encrypt_id = doc.trailer.get(b"Encrypt").and_then(Object::as_reference)?;
    rewrite_as_rc4(doc, 128)?;
    let key = get_encryption_key(doc, password, true)?;

    let mut failed = 0usize;
    for (&id, obj) in doc.objects.iter_mut() {
        // Cross-reference streams are never encrypted
        if id == encrypt_id || obj.type_name().ok() == Some("XRef") {
            continue;
        }
        failed += decrypt_aes_object(&object_key(&key, id), obj);
    }
    if failed > 0 {
        log::warn!("{} encrypted values could not be decrypted", failed);
    }

    doc.trailer.remove(b"Encrypt");
    Ok(())
}

/// Per-object AES key (Algorithm 1 with the AES salt).
fn object_key(key: &[u8], (num, gen): ObjectId) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(&num.to_le_bytes()[..3]);
    hasher.update(&gen.to_le_bytes()[..2]);
    hasher.update(AES_SALT);
    let digest = hasher.finalize();
    digest[..(key.len() + 5).min(16)].to_vec()
}

/// Decrypt strings and stream data in place. Returns how many values were
/// left untouched because they did not decrypt.
fn decrypt_aes_object(key: &[u8], obj: &mut Object) -> usize {
    match obj {
        Object::String(content, _) => match aes_decrypt(key, content) {
            Some(plain) => {
                *content = plain;
                0
            }
            None => 1,
        },
        Object::Array(items) => items.iter_mut().map(|o| decrypt_aes_object(key, o)).sum(),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .map(|(_, o)| decrypt_aes_object(key, o))
            .sum(),
        Object::Stream(stream) => {
            let mut failed: usize = stream
                .dict
                .iter_mut()
                .map(|(_, o)| decrypt_aes_object(key, o))
                .sum();
            match aes_decrypt(key, &stream.content) {
                Some(plain) => stream.set_content(plain),
                None => failed += 1,
            }
            failed
        }
        _ => 0,
    }
}

/// AES-128-CBC with the IV in the first block and PKCS#7 padding.
fn aes_decrypt(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < AES_BLOCK || data.len() % AES_BLOCK != 0 {
        return None;
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK);
    if ciphertext.is_empty() {
        return Some(Vec::new());
    }

    let mut buf = ciphertext.to_vec();
    let len = Aes128CbcDec::new_from_slices(key, iv)
        .ok()?
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .ok()?
        .len();
    buf.truncate(len);
    Some(buf)
}
