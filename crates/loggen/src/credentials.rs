// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decryption of the search-engine credential blob (`es_key`).
//!
//! The blob is standard base64 of `IV || AES-128-CBC(PKCS#7(json))`, where the JSON carries
//! the connection parameters of the target cluster.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::endpoint::{Credentials, SinkEndpoint};
use crate::errors::CredentialsError;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;

/// Connection parameters carried inside the blob
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkKeyData {
    pub host: String,
    pub port: u16,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "https".to_string()
}

impl SinkKeyData {
    /// Endpoint targeting the project's log index.
    #[must_use]
    pub fn into_endpoint(self, project_name: &str) -> SinkEndpoint {
        let target = index_name(&self.profile_id, project_name);
        let credentials = if self.username.is_empty() {
            Credentials::None
        } else {
            Credentials::Basic {
                username: self.username,
                password: self.password,
            }
        };
        SinkEndpoint {
            protocol: self.protocol,
            host: self.host,
            port: self.port,
            path: String::new(),
            credentials,
            target,
        }
    }
}

/// Decrypts `blob` with `key` and returns the plaintext.
pub fn decrypt(blob: &str, key: &[u8]) -> Result<String, CredentialsError> {
    if key.len() != BLOCK_SIZE {
        return Err(CredentialsError::KeyLength(key.len()));
    }
    let data = STANDARD.decode(blob.trim())?;
    if data.len() < BLOCK_SIZE {
        return Err(CredentialsError::TooShort);
    }
    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CredentialsError::NotBlockAligned);
    }

    let plaintext = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|_| CredentialsError::KeyLength(key.len()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CredentialsError::Padding)?;
    Ok(String::from_utf8(plaintext)?)
}

/// Decrypts the blob and parses the connection parameters.
pub fn resolve_key_data(blob: &str, key: &[u8]) -> Result<SinkKeyData, CredentialsError> {
    let plaintext = decrypt(blob, key)?;
    Ok(serde_json::from_str(&plaintext)?)
}

/// Resolves the blob straight to the endpoint batches are posted to.
pub fn resolve_sink_credentials(
    blob: &str,
    key: &[u8],
    project_name: &str,
) -> Result<SinkEndpoint, CredentialsError> {
    Ok(resolve_key_data(blob, key)?.into_endpoint(project_name))
}

/// Normalizes a project name the way the APM side names things:
/// `MyApp_v2` becomes `_my_app__v2`.
#[must_use]
pub fn apm_name(project: &str) -> String {
    let mut name = String::with_capacity(project.len() + 4);
    for c in project.chars() {
        if c.is_uppercase() {
            name.push('_');
            name.extend(c.to_lowercase());
        } else if c == '_' {
            name.push_str("__");
        } else {
            name.push(c);
        }
    }
    name
}

#[must_use]
pub fn index_name(profile_id: &str, project_name: &str) -> String {
    format!("log-{}-{}", profile_id, apm_name(project_name)).to_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    pub(crate) fn encrypt(plaintext: &str, key: &[u8]) -> String {
        let iv = [7u8; BLOCK_SIZE];
        let ciphertext = Aes128CbcEnc::new_from_slices(key, &iv)
            .expect("valid key and iv")
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        let mut blob = iv.to_vec();
        blob.extend(ciphertext);
        STANDARD.encode(blob)
    }

    const KEY: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_decrypt_roundtrip() {
        let blob = encrypt("hello credentials", KEY);
        assert_eq!(decrypt(&blob, KEY).expect("decrypt"), "hello credentials");
    }

    #[test]
    fn test_resolve_sink_credentials() {
        let json = r#"{"host":"es.example.com","port":9200,"type":"elasticsearch",
            "profile_id":"Prof1","username":"elastic","password":"s3cret","protocol":"http"}"#;
        let endpoint = resolve_sink_credentials(&encrypt(json, KEY), KEY, "ShopFront")
            .expect("credentials should resolve");
        assert_eq!(endpoint.host, "es.example.com");
        assert_eq!(endpoint.port, 9200);
        assert_eq!(endpoint.protocol, "http");
        assert_eq!(endpoint.target, "log-prof1-_shop_front");
        assert_eq!(
            endpoint.credentials,
            Credentials::Basic {
                username: "elastic".into(),
                password: "s3cret".into()
            }
        );
    }

    #[test]
    fn test_decrypt_errors() {
        assert!(matches!(
            decrypt("!!!", KEY),
            Err(CredentialsError::Base64(_))
        ));
        assert!(matches!(
            decrypt(&STANDARD.encode([1u8; 8]), KEY),
            Err(CredentialsError::TooShort)
        ));
        assert!(matches!(
            decrypt(&STANDARD.encode([1u8; 20]), KEY),
            Err(CredentialsError::NotBlockAligned)
        ));
        assert!(matches!(
            decrypt(&encrypt("x", KEY), b"short"),
            Err(CredentialsError::KeyLength(5))
        ));
        assert!(matches!(
            resolve_key_data(&encrypt("not json", KEY), KEY),
            Err(CredentialsError::Json(_))
        ));
    }

    #[test]
    fn test_wrong_key_does_not_yield_credentials() {
        let blob = encrypt(r#"{"host":"h","port":1}"#, KEY);
        assert!(resolve_key_data(&blob, b"fedcba9876543210").is_err());
    }

    #[test]
    fn test_apm_name() {
        assert_eq!(apm_name("myapp"), "myapp");
        assert_eq!(apm_name("MyApp"), "_my_app");
        assert_eq!(apm_name("my_app"), "my__app");
        assert_eq!(index_name("ABC", "Demo_1"), "log-abc-_demo__1");
    }
}
