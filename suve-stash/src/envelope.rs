use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use argon2::Argon2;
use argon2::Params;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::StashError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Argon2id, m_cost=19456 KiB, t_cost=2, p_cost=1 — a documented baseline
/// for interactive use; see DESIGN.md for the cost-parameter rationale.
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32], StashError> {
    let params = Params::new(19_456, 2, 1, Some(32))
        .map_err(|e| StashError::Io(std::io::Error::other(e.to_string())))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| StashError::Io(std::io::Error::other(e.to_string())))?;
    Ok(key)
}

/// Encrypt `plaintext` (already-serialized JSON) under `passphrase`,
/// returning `salt || nonce || ciphertext+tag` (the discriminator byte is
/// prepended by the caller).
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, StashError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key_bytes = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| StashError::Io(std::io::Error::other("encryption failure")))?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of `encrypt`. Any failure — wrong passphrase or a corrupt file —
/// is reported as `StashError::BadPassphrase`, never distinguishing the two,
/// so a bad guess can't be used to probe whether a file is well-formed.
pub fn decrypt(envelope: &[u8], passphrase: &str) -> Result<Vec<u8>, StashError> {
    if envelope.len() < SALT_LEN + NONCE_LEN {
        return Err(StashError::Truncated);
    }
    let (salt, rest) = envelope.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key_bytes = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StashError::BadPassphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_is_identity() {
        let plaintext = b"{\"entries\":{}}";
        let envelope = encrypt(plaintext, "pw").unwrap();
        let decoded = decrypt(&envelope, "pw").unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn each_encryption_uses_a_fresh_salt_and_nonce() {
        let plaintext = b"same plaintext";
        let a = encrypt(plaintext, "pw").unwrap();
        let b = encrypt(plaintext, "pw").unwrap();
        assert_ne!(a, b);
    }
}
