use std::fs;
use std::path::Path;

use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use log::{debug, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::session::cookies::{CredentialSet, AUTH_TOKEN_COOKIE, CSRF_COOKIE};

/// Cookies worth sealing at rest. Everything else in the jar is
/// harmless tracking state
const SENSITIVE_COOKIES: [&str; 2] = [AUTH_TOKEN_COOKIE, CSRF_COOKIE];

const NONCE_SIZE: usize = 12;

/// 256-bit symmetric key for cookie-at-rest encryption
#[derive(Clone)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::decode(encoded)
            .map_err(|_| ClientError::protocol("session key is not valid base64"))?;
        if bytes.len() != 32 {
            return Err(ClientError::protocol("session key must be 32 bytes"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| ClientError::protocol("cookie encryption failed"))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&sealed);
        Ok(base64::encode(out))
    }

    fn open(&self, encoded: &str) -> Result<String> {
        let raw = base64::decode(encoded)
            .map_err(|_| ClientError::protocol("encrypted cookie is not valid base64"))?;
        if raw.len() <= NONCE_SIZE {
            return Err(ClientError::protocol("encrypted cookie is truncated"));
        }
        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let opened = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| ClientError::Auth("cookie decryption failed, wrong key?".to_owned()))?;
        String::from_utf8(opened)
            .map_err(|_| ClientError::protocol("decrypted cookie is not utf-8"))
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// One persisted cookie. `encrypted` entries hold a sealed value and
/// must be opened with the session key before use
#[derive(Debug, Serialize, Deserialize)]
struct CookieRecord {
    name: String,
    value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    encrypted: bool,
}

pub fn save_cookies(
    path: &Path,
    credentials: &CredentialSet,
    key: Option<&SessionKey>,
) -> Result<()> {
    let mut records = Vec::new();
    for (name, value) in credentials.iter() {
        let sensitive = SENSITIVE_COOKIES.contains(&name);
        let record = match key {
            Some(key) if sensitive => CookieRecord {
                name: name.to_owned(),
                value: key.seal(value)?,
                encrypted: true,
            },
            _ => CookieRecord {
                name: name.to_owned(),
                value: value.to_owned(),
                encrypted: false,
            },
        };
        records.push(record);
    }
    let body = serde_json::to_string_pretty(&records)
        .map_err(|_| ClientError::protocol("could not serialize session cookies"))?;
    fs::write(path, body)
        .map_err(|err| ClientError::protocol(&format!("could not write session file: {}", err)))?;
    debug!("persisted {} cookies to {}", records.len(), path.display());
    Ok(())
}

/// Read a persisted credential set back. Missing files, malformed JSON
/// and undecryptable entries all yield None rather than an error
pub fn load_cookies(path: &Path, key: Option<&SessionKey>) -> Option<CredentialSet> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(_) => {
            debug!("no session file at {}", path.display());
            return None;
        }
    };
    let records = match serde_json::from_str::<Vec<CookieRecord>>(&body) {
        Ok(records) => records,
        Err(_) => {
            warn!("session file at {} is malformed, ignoring it", path.display());
            return None;
        }
    };
    let mut credentials = CredentialSet::default();
    for record in records {
        let value = if record.encrypted {
            match key {
                Some(key) => match key.open(&record.value) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!("could not decrypt cookie {}: {}", record.name, err);
                        return None;
                    }
                },
                None => {
                    warn!(
                        "cookie {} is encrypted but no session key is configured",
                        record.name
                    );
                    return None;
                }
            }
        } else {
            record.value
        };
        credentials.set(&record.name, &value);
    }
    Some(credentials)
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::PathBuf;

    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        env::temp_dir().join(format!("magpie-{}-{}", std::process::id(), name))
    }

    fn credentials() -> CredentialSet {
        CredentialSet::from_cookie_header("auth_token=secret-token; ct0=csrf-value; lang=en")
    }

    #[test]
    fn plaintext_round_trip() {
        let path = scratch_file("plain.json");
        save_cookies(&path, &credentials(), None).unwrap();
        let loaded = load_cookies(&path, None).unwrap();
        assert_eq!(loaded.auth_token(), Some("secret-token"));
        assert_eq!(loaded.csrf_token(), Some("csrf-value"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn encrypted_round_trip_restores_exact_values() {
        let path = scratch_file("sealed.json");
        let key = SessionKey::generate();
        save_cookies(&path, &credentials(), Some(&key)).unwrap();

        // the sensitive values must not appear in the file itself
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(!raw.contains("csrf-value"));
        assert!(raw.contains("lang"));
        assert!(raw.contains("\"encrypted\": true"));

        let loaded = load_cookies(&path, Some(&key)).unwrap();
        assert_eq!(loaded.auth_token(), Some("secret-token"));
        assert_eq!(loaded.csrf_token(), Some("csrf-value"));
        assert_eq!(loaded.get("lang"), Some("en"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn wrong_key_fails_closed() {
        let path = scratch_file("wrong-key.json");
        save_cookies(&path, &credentials(), Some(&SessionKey::generate())).unwrap();
        assert!(load_cookies(&path, Some(&SessionKey::generate())).is_none());
        assert!(load_cookies(&path, None).is_none());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_and_malformed_files_return_none() {
        assert!(load_cookies(&scratch_file("does-not-exist.json"), None).is_none());
        let path = scratch_file("garbage.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_cookies(&path, None).is_none());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn key_from_base64_validates_length() {
        let key = SessionKey::generate();
        let encoded = base64::encode(&key.0);
        assert!(SessionKey::from_base64(&encoded).is_ok());
        assert!(SessionKey::from_base64("dG9vLXNob3J0").is_err());
        assert!(SessionKey::from_base64("!!!").is_err());
    }
}
