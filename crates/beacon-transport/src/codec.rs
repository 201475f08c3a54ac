/// Wire codec: JSON envelopes, optionally sealed with a shared key.
///
/// Keyed frames are `nonce (24 bytes) || XChaCha20-Poly1305 ciphertext`,
/// keyed by SHA-256 of the shared secret. A packet sealed under another
/// key fails authentication and is indistinguishable from corruption.
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use sha2::{Digest, Sha256};

use crate::envelope::Envelope;
use crate::TransportError;

const NONCE_LEN: usize = 24;

/// Why an incoming packet could not be turned into an envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short for a sealed frame: {0} bytes")]
    Truncated(usize),

    #[error("authentication failed (wrong key or corrupted packet)")]
    Unauthenticated,

    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Encodes and decodes envelopes for one transport.
#[derive(Clone)]
pub struct Codec {
    cipher: Option<XChaCha20Poly1305>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("sealed", &self.cipher.is_some())
            .finish()
    }
}

impl Codec {
    /// Plain JSON codec.
    pub fn plain() -> Self {
        Self { cipher: None }
    }

    /// Codec sealing every packet with `secret`.
    pub fn with_key(secret: &str) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Self {
            cipher: Some(XChaCha20Poly1305::new(&key.into())),
        }
    }

    pub fn from_key(secret: Option<&str>) -> Self {
        secret.map(Self::with_key).unwrap_or_else(Self::plain)
    }

    pub fn is_sealed(&self) -> bool {
        self.cipher.is_some()
    }

    /// Serialize, then seal when a key is configured.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
        let json = envelope.to_bytes().map_err(TransportError::Serialization)?;

        let Some(cipher) = &self.cipher else {
            return Ok(json);
        };

        use chacha20poly1305::aead::rand_core::{OsRng, RngCore};

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, json.as_slice())
            .map_err(|e| TransportError::Encrypt(e.to_string()))?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Open (when keyed), then deserialize.
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, DecodeError> {
        let Some(cipher) = &self.cipher else {
            return Envelope::from_bytes(data).map_err(DecodeError::Malformed);
        };

        if data.len() <= NONCE_LEN {
            return Err(DecodeError::Truncated(data.len()));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecodeError::Unauthenticated)?;

        Envelope::from_bytes(&plaintext).map_err(DecodeError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Origin;

    fn envelope() -> Envelope {
        let origin = Origin {
            pid: "p-1".into(),
            iid: "i-1".into(),
            host_name: "box-a".into(),
        };
        Envelope::new("hello", &origin, Some(serde_json::json!({"weight": 3.5})))
    }

    #[test]
    fn plain_is_json() {
        let codec = Codec::plain();
        let bytes = codec.encode(&envelope()).unwrap();
        assert_eq!(bytes.first(), Some(&b'{'));
        assert_eq!(codec.decode(&bytes).unwrap(), envelope());
    }

    #[test]
    fn sealed_round_trip() {
        let codec = Codec::with_key("s3cret");
        let bytes = codec.encode(&envelope()).unwrap();
        assert!(!bytes.windows(5).any(|w| w == b"hello"));
        assert_eq!(codec.decode(&bytes).unwrap(), envelope());
    }

    #[test]
    fn fresh_nonce_per_packet() {
        let codec = Codec::with_key("s3cret");
        let a = codec.encode(&envelope()).unwrap();
        let b = codec.encode(&envelope()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let bytes = Codec::with_key("alpha").encode(&envelope()).unwrap();
        let err = Codec::with_key("beta").decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Unauthenticated));
    }

    #[test]
    fn plain_packet_rejected_by_sealed_codec() {
        let bytes = Codec::plain().encode(&envelope()).unwrap();
        assert!(Codec::with_key("alpha").decode(&bytes).is_err());
    }

    #[test]
    fn sealed_packet_rejected_by_plain_codec() {
        let bytes = Codec::with_key("alpha").encode(&envelope()).unwrap();
        assert!(matches!(
            Codec::plain().decode(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_frame() {
        let err = Codec::with_key("alpha").decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(10)));
    }

    #[test]
    fn tampered_frame() {
        let codec = Codec::with_key("alpha");
        let mut bytes = codec.encode(&envelope()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            codec.decode(&bytes),
            Err(DecodeError::Unauthenticated)
        ));
    }
}
