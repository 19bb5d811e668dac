//! At-rest-secret support (community vault format).
//!
//! Recognizes `$ANSIBLE_VAULT;1.1;AES256` envelopes: the payload is a hex
//! string of `salt(32) || hmac(32) || ciphertext`, each part itself hex
//! encoded. Keys derive via PBKDF2-HMAC-SHA256 (10000 iterations, 80 bytes
//! split 32/32/16 for cipher key, HMAC key and IV). The HMAC is verified
//! over the ciphertext before AES-256-CTR decryption; PKCS7 padding is
//! stripped afterwards. A wrong passphrase surfaces as an HMAC mismatch.

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use pbkdf2::pbkdf2_hmac;
use regex::Regex;
use sha2::Sha256;
use std::path::Path;

use crate::error::{Error, Result};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Envelope header for version 1.1 AES256 blobs.
pub const VAULT_HEADER: &str = "$ANSIBLE_VAULT";

const PBKDF2_ITERATIONS: u32 = 10_000;
const DERIVED_KEY_LEN: usize = 80;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$ANSIBLE_VAULT;(\d+\.\d+);(AES256)(?:;(\w+))?$").expect("vault header regex")
});

/// A vault passphrase.
#[derive(Clone)]
pub struct VaultSecret {
    password: Vec<u8>,
}

impl VaultSecret {
    /// Creates a secret from a passphrase string.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into().into_bytes(),
        }
    }

    /// Loads a passphrase from a file. On POSIX an executable file is run
    /// and its stdout (trimmed) becomes the passphrase.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Vault(format!(
                "Vault password file not found: {}",
                path.display()
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let is_executable = std::fs::metadata(path)
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false);
            if is_executable {
                let output = std::process::Command::new(path)
                    .output()
                    .map_err(|e| Error::Vault(format!("Vault password script failed: {}", e)))?;
                if !output.status.success() {
                    return Err(Error::Vault(format!(
                        "Vault password script failed: {}",
                        String::from_utf8_lossy(&output.stderr)
                    )));
                }
                let password = String::from_utf8_lossy(&output.stdout).trim().to_string();
                return Ok(Self::new(password));
            }
        }

        let password = std::fs::read_to_string(path)?.trim().to_string();
        Ok(Self::new(password))
    }
}

/// Returns true when the content carries a vault envelope.
pub fn is_encrypted(data: &str) -> bool {
    data.trim_start().starts_with(VAULT_HEADER)
}

/// Vault decryption (and encryption, for tooling and tests).
#[derive(Default)]
pub struct VaultLib {
    secrets: Vec<VaultSecret>,
}

impl VaultLib {
    /// Creates an empty vault with no secrets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate secret. Decryption tries each in order.
    pub fn add_secret(&mut self, secret: VaultSecret) {
        self.secrets.push(secret);
    }

    /// Returns true when at least one secret is configured.
    pub fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }

    /// Decrypts an envelope, trying each configured secret in order.
    pub fn decrypt(&self, data: &str) -> Result<Vec<u8>> {
        let mut lines = data.trim().lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::Vault("Empty vault data".into()))?;

        let caps = HEADER_RE
            .captures(header.trim())
            .ok_or_else(|| Error::Vault(format!("Invalid vault header: {}", header)))?;
        if &caps[2] != "AES256" {
            return Err(Error::Vault(format!("Unsupported vault cipher: {}", &caps[2])));
        }

        let payload_hex: String = lines.collect::<Vec<_>>().join("").replace(' ', "");
        let payload = hex::decode(&payload_hex)
            .map_err(|e| Error::Vault(format!("Invalid vault payload: {}", e)))?;

        if self.secrets.is_empty() {
            return Err(Error::Vault("No vault secrets configured".into()));
        }

        let mut last_err = None;
        for secret in &self.secrets {
            match decrypt_aes256(&payload, &secret.password) {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Vault("Vault decryption failed".into())))
    }

    /// Decrypts to a UTF-8 string.
    pub fn decrypt_str(&self, data: &str) -> Result<String> {
        let plaintext = self.decrypt(data)?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::Vault(format!("Decrypted content is not UTF-8: {}", e)))
    }

    /// Encrypts plaintext under the first configured secret, producing a
    /// complete envelope with the payload wrapped at 80 hex chars per line.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let secret = self
            .secrets
            .first()
            .ok_or_else(|| Error::Vault("No vault secrets configured".into()))?;

        let mut salt = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);

        let (key, hmac_key, iv) = derive_keys(&secret.password, &salt);

        // PKCS7 pad to the AES block size
        let pad_len = 16 - (plaintext.len() % 16);
        let mut padded = plaintext.to_vec();
        padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));

        let mut cipher = Aes256Ctr::new(&key.into(), &iv.into());
        cipher.apply_keystream(&mut padded);
        let ciphertext = padded;

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&hmac_key)
            .map_err(|e| Error::Vault(e.to_string()))?;
        mac.update(&ciphertext);
        let digest = mac.finalize().into_bytes();

        let inner = format!(
            "{}{}{}",
            hex::encode(salt),
            hex::encode(digest),
            hex::encode(&ciphertext)
        );
        let payload_hex = hex::encode(inner.as_bytes());

        let mut out = format!("{};1.1;AES256\n", VAULT_HEADER);
        for chunk in payload_hex.as_bytes().chunks(80) {
            out.push_str(std::str::from_utf8(chunk).expect("hex is ascii"));
            out.push('\n');
        }
        Ok(out)
    }
}

/// Reads a file, transparently decrypting it when it carries a vault
/// envelope and secrets are available.
pub fn read_maybe_encrypted(path: &Path, vault: &VaultLib) -> Result<String> {
    let content = std::fs::read_to_string(path)?;
    if is_encrypted(&content) {
        if !vault.has_secrets() {
            return Err(Error::Vault(format!(
                "'{}' is vault encrypted and no vault password was provided",
                path.display()
            )));
        }
        return vault.decrypt_str(&content);
    }
    Ok(content)
}

fn derive_keys(password: &[u8], salt: &[u8]) -> ([u8; 32], [u8; 32], [u8; 16]) {
    let mut derived = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut derived);

    let mut key = [0u8; 32];
    let mut hmac_key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&derived[..32]);
    hmac_key.copy_from_slice(&derived[32..64]);
    iv.copy_from_slice(&derived[64..80]);
    (key, hmac_key, iv)
}

fn decrypt_aes256(payload: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    // The payload is itself hex text: salt + hmac + ciphertext, each hex
    // encoded (64 + 64 + n chars).
    let payload_hex = std::str::from_utf8(payload)
        .map_err(|_| Error::Vault("Invalid vault payload encoding".into()))?;
    if payload_hex.len() < 128 {
        return Err(Error::Vault("Vault payload too short".into()));
    }

    let salt = hex::decode(&payload_hex[..64])
        .map_err(|e| Error::Vault(format!("Invalid vault salt: {}", e)))?;
    let expected_hmac = hex::decode(&payload_hex[64..128])
        .map_err(|e| Error::Vault(format!("Invalid vault hmac: {}", e)))?;
    let ciphertext = hex::decode(&payload_hex[128..])
        .map_err(|e| Error::Vault(format!("Invalid vault ciphertext: {}", e)))?;

    let (key, hmac_key, iv) = derive_keys(password, &salt);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&hmac_key)
        .map_err(|e| Error::Vault(e.to_string()))?;
    mac.update(&ciphertext);
    mac.verify_slice(&expected_hmac)
        .map_err(|_| Error::Vault("HMAC verification failed - wrong password?".into()))?;

    let mut plaintext = ciphertext;
    let mut cipher = Aes256Ctr::new(&key.into(), &iv.into());
    cipher.apply_keystream(&mut plaintext);

    Ok(unpad_pkcs7(plaintext))
}

fn unpad_pkcs7(data: Vec<u8>) -> Vec<u8> {
    if data.is_empty() {
        return data;
    }
    let pad_len = *data.last().expect("non-empty") as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return data;
    }
    if data[data.len() - pad_len..].iter().all(|&b| b == pad_len as u8) {
        let mut data = data;
        data.truncate(data.len() - pad_len);
        data
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault(password: &str) -> VaultLib {
        let mut v = VaultLib::new();
        v.add_secret(VaultSecret::new(password));
        v
    }

    #[test]
    fn round_trip() {
        let v = vault("hunter2");
        let blob = v.encrypt(b"secret_key: s3cr3t\n").unwrap();
        assert!(is_encrypted(&blob));
        assert_eq!(v.decrypt(&blob).unwrap(), b"secret_key: s3cr3t\n");
    }

    #[test]
    fn wrong_password_is_hmac_mismatch() {
        let blob = vault("right").encrypt(b"data").unwrap();
        let err = vault("wrong").decrypt(&blob).unwrap_err();
        match err {
            Error::Vault(msg) => assert!(msg.contains("HMAC"), "{}", msg),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn bit_flip_is_detected() {
        let v = vault("pw");
        let blob = v.encrypt(b"payload bytes").unwrap();

        // Flip one hex digit somewhere inside the ciphertext region.
        let mut lines: Vec<String> = blob.lines().map(String::from).collect();
        let last = lines.last_mut().unwrap();
        let mut chars: Vec<char> = last.chars().collect();
        let idx = chars.len() / 2;
        chars[idx] = if chars[idx] == '0' { '1' } else { '0' };
        *last = chars.into_iter().collect();
        let tampered = lines.join("\n");

        assert!(v.decrypt(&tampered).is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        let v = vault("pw");
        assert!(v.decrypt("$ANSIBLE_VAULT;9.9;DES\nabcd").is_err());
        assert!(v.decrypt("not a vault at all").is_err());
    }

    #[test]
    fn multiple_secrets_tried_in_order() {
        let blob = vault("second").encrypt(b"x").unwrap();
        let mut v = VaultLib::new();
        v.add_secret(VaultSecret::new("first"));
        v.add_secret(VaultSecret::new("second"));
        assert_eq!(v.decrypt(&blob).unwrap(), b"x");
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let v = vault("pw");
        let blob = v.encrypt(b"").unwrap();
        assert_eq!(v.decrypt(&blob).unwrap(), b"");
    }
}
