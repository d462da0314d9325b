//! Secret service — AES-256-GCM encrypted per-project key-value store.
//!
//! The 32-byte master key comes from `SECRETS_ENCRYPTION_KEY` (hex).
//! Every encryption draws a fresh 96-bit nonce, so two writes of the
//! same value never produce the same ciphertext. Plaintext is never
//! persisted and never leaves through list endpoints.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use chrono::Utc;
use uuid::Uuid;

use nexus_domain::error::{Error, Result};
use nexus_store::secrets::SecretMetadata;
use nexus_store::{SecretRow, SecretStore};

pub const MASTER_KEY_ENV: &str = "SECRETS_ENCRYPTION_KEY";

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

pub struct SecretService {
    store: Arc<SecretStore>,
    cipher: Aes256Gcm,
}

impl SecretService {
    /// Build from the master key in the environment (64 hex chars).
    pub fn from_env(store: Arc<SecretStore>) -> Result<Self> {
        let raw = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::Validation(format!("{MASTER_KEY_ENV} is not set")))?;
        Self::new(store, &raw)
    }

    pub fn new(store: Arc<SecretStore>, master_key_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(master_key_hex.trim())
            .map_err(|_| Error::Validation(format!("{MASTER_KEY_ENV} must be hex")))?;
        if key_bytes.len() != 32 {
            return Err(Error::Validation(format!(
                "{MASTER_KEY_ENV} must decode to 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            store,
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt and store a secret. Returns metadata only.
    pub async fn set(
        &self,
        project_id: &str,
        key: &str,
        value: &str,
        description: Option<String>,
    ) -> Result<SecretMetadata> {
        if key.trim().is_empty() {
            return Err(Error::Validation("secret key must not be empty".into()));
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, value.as_bytes())
            .map_err(|_| Error::Internal("secret encryption failed".into()))?;

        // The AEAD output is ciphertext || tag; the envelope stores them
        // separately as hex.
        let split = sealed.len() - TAG_LEN;
        let (ciphertext, tag) = sealed.split_at(split);

        let now = Utc::now();
        let row = SecretRow {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            key: key.to_string(),
            encrypted_value: hex::encode(ciphertext),
            iv: hex::encode(nonce),
            auth_tag: hex::encode(tag),
            description,
            created_at: now,
            updated_at: now,
        };
        Ok(self.store.upsert(row).await)
    }

    /// Decrypt a secret, failing with `SECRET_NOT_FOUND` when absent.
    pub async fn get(&self, project_id: &str, key: &str) -> Result<String> {
        let row = self.store.get(project_id, key).await?;

        let iv = hex::decode(&row.iv)
            .map_err(|_| Error::Internal("secret envelope has invalid iv".into()))?;
        let mut sealed = hex::decode(&row.encrypted_value)
            .map_err(|_| Error::Internal("secret envelope has invalid ciphertext".into()))?;
        let tag = hex::decode(&row.auth_tag)
            .map_err(|_| Error::Internal("secret envelope has invalid auth tag".into()))?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| Error::Internal("secret decryption failed (wrong key or corrupt data)".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Internal("secret plaintext is not UTF-8".into()))
    }

    pub async fn exists(&self, project_id: &str, key: &str) -> bool {
        self.store.exists(project_id, key).await
    }

    pub async fn delete(&self, project_id: &str, key: &str) -> Result<()> {
        self.store.delete(project_id, key).await
    }

    pub async fn list(&self, project_id: &str) -> Vec<SecretMetadata> {
        self.store.list(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn service() -> (tempfile::TempDir, SecretService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SecretStore::new(dir.path()));
        let service = SecretService::new(store, TEST_KEY).unwrap();
        (dir, service)
    }

    #[tokio::test]
    async fn round_trip() {
        let (_dir, service) = service();
        service
            .set("P1", "API_KEY", "sk-live-12345", Some("prod key".into()))
            .await
            .unwrap();
        assert_eq!(service.get("P1", "API_KEY").await.unwrap(), "sk-live-12345");
        assert!(service.exists("P1", "API_KEY").await);
    }

    #[tokio::test]
    async fn fresh_iv_per_encryption() {
        let (_dir, service) = service();
        service.set("P1", "K", "same-value", None).await.unwrap();
        let first = service.store.get("P1", "K").await.unwrap();

        service.set("P1", "K", "same-value", None).await.unwrap();
        let second = service.store.get("P1", "K").await.unwrap();

        // Same plaintext, different nonce and ciphertext every time.
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.encrypted_value, second.encrypted_value);
        assert_eq!(service.get("P1", "K").await.unwrap(), "same-value");
    }

    #[tokio::test]
    async fn envelope_shape() {
        let (_dir, service) = service();
        service.set("P1", "K", "v", None).await.unwrap();
        let row = service.store.get("P1", "K").await.unwrap();
        assert_eq!(row.iv.len(), 24); // 12 bytes hex-encoded
        assert_eq!(row.auth_tag.len(), 32); // 16 bytes hex-encoded
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_decryption() {
        let (_dir, service) = service();
        service.set("P1", "K", "value", None).await.unwrap();
        let mut row = service.store.get("P1", "K").await.unwrap();
        // Flip a hex nibble in the auth tag.
        let mut tag: Vec<u8> = row.auth_tag.into_bytes();
        tag[0] = if tag[0] == b'0' { b'1' } else { b'0' };
        row.auth_tag = String::from_utf8(tag).unwrap();
        service.store.upsert(row).await;

        assert!(service.get("P1", "K").await.is_err());
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let (_dir, service) = service();
        let err = service.get("P1", "NOPE").await.unwrap_err();
        assert_eq!(err.code(), "SECRET_NOT_FOUND");
    }

    #[test]
    fn rejects_bad_master_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SecretStore::new(dir.path()));
        assert!(SecretService::new(store.clone(), "not-hex").is_err());
        assert!(SecretService::new(store, "abcd").is_err());
    }

    #[tokio::test]
    async fn secrets_are_project_scoped() {
        let (_dir, service) = service();
        service.set("P1", "K", "one", None).await.unwrap();
        service.set("P2", "K", "two", None).await.unwrap();
        assert_eq!(service.get("P1", "K").await.unwrap(), "one");
        assert_eq!(service.get("P2", "K").await.unwrap(), "two");
        assert_eq!(service.list("P1").await.len(), 1);
    }
}
