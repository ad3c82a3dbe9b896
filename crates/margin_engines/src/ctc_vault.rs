#![forbid(unsafe_code)]

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::Decimal;

use margin_contracts::records::EncryptedCtc;

const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum VaultError {
    Io(std::io::Error),
    Decode(base64::DecodeError),
    Crypto,
    InvalidPlaintext,
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::Crypto => write!(f, "vault cryptographic operation failed"),
            Self::InvalidPlaintext => write!(f, "decrypted value is not a decimal"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<std::io::Error> for VaultError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Encryption boundary for the sensitive CTC field. The vault holds only
/// the master key; encrypted values live inside `EmployeeRecord` as
/// `EncryptedCtc`. Plaintext is the canonical decimal string, so the
/// round-trip is exact.
#[derive(Debug, Clone)]
pub struct CtcVault {
    key_path: PathBuf,
}

impl CtcVault {
    pub fn default_local() -> Self {
        let key_path = env::var("MARGIN_CTC_KEY_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_key_path);
        Self::for_key_path(key_path)
    }

    pub fn for_key_path(key_path: PathBuf) -> Self {
        Self { key_path }
    }

    pub fn encrypt_ctc(&self, value: Decimal) -> Result<EncryptedCtc, VaultError> {
        if value.is_sign_negative() {
            return Err(VaultError::InvalidPlaintext);
        }
        let key = self.load_or_create_master_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Crypto)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = value.normalize().to_string();
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Crypto)?;
        EncryptedCtc::v1(BASE64.encode(nonce_bytes), BASE64.encode(ciphertext))
            .map_err(|_| VaultError::Crypto)
    }

    pub fn decrypt_ctc(&self, encrypted: &EncryptedCtc) -> Result<Decimal, VaultError> {
        let key = self.load_or_create_master_key()?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Crypto)?;
        let nonce_raw = BASE64.decode(encrypted.nonce_b64.as_bytes())?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(VaultError::Crypto);
        }
        let nonce = Nonce::from_slice(&nonce_raw);
        let ciphertext = BASE64.decode(encrypted.ciphertext_b64.as_bytes())?;
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| VaultError::Crypto)?;
        let text = String::from_utf8(plaintext).map_err(|_| VaultError::Crypto)?;
        text.parse::<Decimal>()
            .map_err(|_| VaultError::InvalidPlaintext)
    }

    fn load_or_create_master_key(&self) -> Result<[u8; MASTER_KEY_LEN], VaultError> {
        if self.key_path.exists() {
            let encoded = fs::read_to_string(&self.key_path)?;
            let decoded = BASE64.decode(encoded.trim().as_bytes())?;
            if decoded.len() != MASTER_KEY_LEN {
                return Err(VaultError::Crypto);
            }
            let mut key = [0u8; MASTER_KEY_LEN];
            key.copy_from_slice(&decoded);
            return Ok(key);
        }

        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut key = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        let encoded = BASE64.encode(key);
        write_new_file_restricted(&self.key_path, encoded.as_bytes())?;
        Ok(key)
    }
}

fn default_key_path() -> PathBuf {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join("margin")
            .join("ctc_master.key");
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("margin")
            .join("ctc_master.key");
    }
    PathBuf::from(".margin").join("ctc_master.key")
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(data)?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_vault(name: &str) -> (PathBuf, CtcVault) {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        let base = std::env::temp_dir().join(format!("margin-vault-test-{name}-{suffix}"));
        let key_path = base.join("ctc_master.key");
        (base, CtcVault::for_key_path(key_path))
    }

    #[test]
    fn at_vault_01_round_trip_is_exact_and_ciphertext_differs() {
        let (base, vault) = temp_vault("roundtrip");
        let value: Decimal = "96000.50".parse().unwrap();

        let encrypted = vault.encrypt_ctc(value).expect("encrypt should succeed");
        assert_ne!(encrypted.ciphertext_b64, value.to_string());
        assert!(!encrypted.ciphertext_b64.contains("96000"));

        let decrypted = vault.decrypt_ctc(&encrypted).expect("decrypt should succeed");
        assert_eq!(decrypted, value);
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_vault_02_fresh_nonce_per_encryption() {
        let (base, vault) = temp_vault("nonce");
        let value: Decimal = "84000".parse().unwrap();
        let first = vault.encrypt_ctc(value).unwrap();
        let second = vault.encrypt_ctc(value).unwrap();
        assert_ne!(first.nonce_b64, second.nonce_b64);
        assert_ne!(first.ciphertext_b64, second.ciphertext_b64);
        assert_eq!(vault.decrypt_ctc(&first).unwrap(), value);
        assert_eq!(vault.decrypt_ctc(&second).unwrap(), value);
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_vault_03_tampered_ciphertext_fails_closed() {
        let (base, vault) = temp_vault("tamper");
        let value: Decimal = "96000".parse().unwrap();
        let mut encrypted = vault.encrypt_ctc(value).unwrap();
        encrypted.ciphertext_b64 = BASE64.encode(b"not the real ciphertext");
        assert!(matches!(
            vault.decrypt_ctc(&encrypted),
            Err(VaultError::Crypto)
        ));
        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn at_vault_04_negative_plaintext_is_refused() {
        let (base, vault) = temp_vault("negative");
        let value: Decimal = "-1".parse().unwrap();
        assert!(matches!(
            vault.encrypt_ctc(value),
            Err(VaultError::InvalidPlaintext)
        ));
        let _ = std::fs::remove_dir_all(base);
    }
}
