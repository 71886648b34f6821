// /saree-store/services/order-service/src/core/secrets.rs
//
// Sealed storage for gateway credentials.
// Format: base64(nonce_12bytes || ciphertext || tag_16bytes)

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    models::PaymentMethod,
    utils::error::{AppError, AppResult},
};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Plain gateway credentials. Only ever held in memory for the duration of a call.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gateway", rename_all = "lowercase")]
pub enum GatewayCredentials {
    Cod,
    Razorpay {
        key_id: String,
        key_secret: String,
    },
    Phonepe {
        merchant_id: String,
        salt_key: String,
        salt_index: String,
    },
    Paytm {
        merchant_id: String,
        merchant_key: String,
        website: String,
    },
}

impl GatewayCredentials {
    pub fn method(&self) -> PaymentMethod {
        match self {
            GatewayCredentials::Cod => PaymentMethod::Cod,
            GatewayCredentials::Razorpay { .. } => PaymentMethod::Razorpay,
            GatewayCredentials::Phonepe { .. } => PaymentMethod::Phonepe,
            GatewayCredentials::Paytm { .. } => PaymentMethod::Paytm,
        }
    }

    /// Identifier yang aman ditampilkan ke storefront
    pub fn public_key(&self) -> Option<String> {
        match self {
            GatewayCredentials::Razorpay { key_id, .. } => Some(key_id.clone()),
            GatewayCredentials::Paytm { merchant_id, .. } => Some(merchant_id.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayCredentials::Cod => f.write_str("Cod"),
            GatewayCredentials::Razorpay { key_id, .. } => f
                .debug_struct("Razorpay")
                .field("key_id", key_id)
                .field("key_secret", &"[redacted]")
                .finish(),
            GatewayCredentials::Phonepe { merchant_id, salt_index, .. } => f
                .debug_struct("Phonepe")
                .field("merchant_id", merchant_id)
                .field("salt_key", &"[redacted]")
                .field("salt_index", salt_index)
                .finish(),
            GatewayCredentials::Paytm { merchant_id, website, .. } => f
                .debug_struct("Paytm")
                .field("merchant_id", merchant_id)
                .field("merchant_key", &"[redacted]")
                .field("website", website)
                .finish(),
        }
    }
}

impl Drop for GatewayCredentials {
    fn drop(&mut self) {
        match self {
            GatewayCredentials::Cod => {}
            GatewayCredentials::Razorpay { key_secret, .. } => key_secret.zeroize(),
            GatewayCredentials::Phonepe { salt_key, .. } => salt_key.zeroize(),
            GatewayCredentials::Paytm { merchant_key, .. } => merchant_key.zeroize(),
        }
    }
}

/// AES-256-GCM boundary for every secret the service persists
#[derive(Clone)]
pub struct SecretStore {
    key: [u8; KEY_LEN],
}

impl Drop for SecretStore {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretStore([redacted])")
    }
}

impl SecretStore {
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load master key dari base64 (SECRETS_MASTER_KEY)
    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AppError::Configuration(format!("SECRETS_MASTER_KEY is not base64: {}", e)))?;

        if bytes.len() != KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(AppError::Configuration(format!(
                "SECRETS_MASTER_KEY wrong length: {} (expected {})",
                len, KEY_LEN
            )));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Encrypt plaintext -> base64(nonce || ciphertext || tag)
    pub fn seal(&self, plaintext: &[u8]) -> AppResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::Configuration("Invalid master key".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AppError::Internal("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&sealed))
    }

    /// Decrypt base64(nonce || ciphertext || tag) -> plaintext
    pub fn open(&self, sealed_b64: &str) -> AppResult<Vec<u8>> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(sealed_b64.trim())
            .map_err(|_| AppError::Configuration("Sealed secret is not base64".to_string()))?;

        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(AppError::Configuration("Sealed secret too short".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::Configuration("Invalid master key".to_string()))?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);

        cipher.decrypt(nonce, &data[NONCE_LEN..]).map_err(|_| {
            AppError::Configuration("Sealed secret cannot be opened (wrong key or tampered data)".to_string())
        })
    }

    pub fn seal_credentials(&self, credentials: &GatewayCredentials) -> AppResult<String> {
        let mut json = serde_json::to_vec(credentials)
            .map_err(|e| AppError::Internal(format!("Failed to serialize credentials: {}", e)))?;
        let sealed = self.seal(&json);
        json.zeroize();
        sealed
    }

    pub fn open_credentials(&self, sealed_b64: &str) -> AppResult<GatewayCredentials> {
        let mut plain = self.open(sealed_b64)?;
        let credentials = serde_json::from_slice(&plain)
            .map_err(|e| AppError::Configuration(format!("Sealed credentials are malformed: {}", e)));
        plain.zeroize();
        credentials
    }
}
