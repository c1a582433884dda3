use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::FinsightError;

type HmacSha256 = Hmac<Sha256>;

fn new_hmac(key: &[u8]) -> Result<HmacSha256, FinsightError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| FinsightError::Internal(format!("HMAC init failed: {e}")))
}

/// Seals OAuth tokens with AES-256-GCM before they hit the database and
/// signs OAuth `state` parameters with HMAC-SHA256.
pub struct Vault {
    cipher: Aes256Gcm,
    hmac_key: Vec<u8>,
}

impl Vault {
    /// Create a new Vault from base64-encoded keys.
    pub fn new(master_key_b64: &str, hmac_secret_b64: &str) -> Result<Self, FinsightError> {
        let master_key = base64::engine::general_purpose::STANDARD
            .decode(master_key_b64)
            .map_err(|e| FinsightError::Internal(format!("Invalid MASTER_KEY base64: {e}")))?;

        if master_key.len() != 32 {
            return Err(FinsightError::Internal(format!(
                "MASTER_KEY must be 32 bytes, got {}",
                master_key.len()
            )));
        }

        let hmac_key = base64::engine::general_purpose::STANDARD
            .decode(hmac_secret_b64)
            .map_err(|e| FinsightError::Internal(format!("Invalid HMAC_SECRET base64: {e}")))?;

        let cipher = Aes256Gcm::new_from_slice(&master_key)
            .map_err(|e| FinsightError::Internal(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self { cipher, hmac_key })
    }

    /// Seal a token. Returns base64(nonce || ciphertext).
    pub fn seal(&self, plaintext: &str) -> Result<String, FinsightError> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| FinsightError::Sealing(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Open a sealed token: base64(nonce || ciphertext) back to plaintext.
    pub fn open(&self, sealed_b64: &str) -> Result<String, FinsightError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(sealed_b64)
            .map_err(|e| FinsightError::Unsealing(format!("Invalid base64: {e}")))?;

        if combined.len() < 12 {
            return Err(FinsightError::Unsealing("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| FinsightError::Unsealing(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| FinsightError::Unsealing(format!("Invalid UTF-8 after decrypt: {e}")))
    }

    /// Sign a state parameter with HMAC-SHA256. Returns base64(hmac || payload).
    pub fn sign_state(&self, payload: &str) -> Result<String, FinsightError> {
        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        let mut combined = signature.to_vec();
        combined.extend_from_slice(payload.as_bytes());

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Verify and extract a signed state parameter.
    pub fn verify_state(&self, signed: &str) -> Result<String, FinsightError> {
        let combined = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signed)
            .map_err(|_| FinsightError::InvalidState)?;

        if combined.len() < 32 {
            return Err(FinsightError::InvalidState);
        }

        let (signature, payload_bytes) = combined.split_at(32);

        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload_bytes);
        mac.verify_slice(signature)
            .map_err(|_| FinsightError::InvalidState)?;

        String::from_utf8(payload_bytes.to_vec()).map_err(|_| FinsightError::InvalidState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> Vault {
        // 32-byte key for AES-256, base64 encoded
        let key = base64::engine::general_purpose::STANDARD.encode([0x42u8; 32]);
        let hmac = base64::engine::general_purpose::STANDARD.encode([0x43u8; 32]);
        Vault::new(&key, &hmac).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let vault = test_vault();
        let plaintext = "eyJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.refresh-token";
        let sealed = vault.seal(plaintext).unwrap();
        assert_ne!(sealed, plaintext);
        assert_eq!(vault.open(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn seal_produces_different_ciphertexts() {
        let vault = test_vault();
        let a = vault.seal("same-token").unwrap();
        let b = vault.seal("same-token").unwrap();
        // Different nonces → different ciphertexts
        assert_ne!(a, b);
    }

    #[test]
    fn state_sign_verify_roundtrip() {
        let vault = test_vault();
        let payload = "1754438400";
        let signed = vault.sign_state(payload).unwrap();
        assert_eq!(vault.verify_state(&signed).unwrap(), payload);
    }

    #[test]
    fn state_tamper_detection() {
        let vault = test_vault();
        let signed = vault.sign_state("1754438400").unwrap();
        let tampered = format!("{signed}X");
        assert!(vault.verify_state(&tampered).is_err());
    }
}
