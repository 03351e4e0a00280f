use alloy_primitives::eip191_hash_message;
use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The result of encoding a payload for signing.
pub struct EncodedPayload {
    /// Canonical bytes of the payload.
    pub data: Vec<u8>,
    /// Hash digest to be signed.
    pub digest: Vec<u8>,
}

/// Turns an opaque structured payload into the digest a signer signs.
///
/// The encoder owns both serialization and hashing.
pub trait PayloadEncoder: Send + Sync {
    fn encode(&self, payload: &Value) -> Result<EncodedPayload>;

    /// Format name (e.g. "json", "eip191").
    fn name(&self) -> &str;
}

fn canonical_json(payload: &Value) -> Result<Vec<u8>> {
    // serde_json's map is ordered by key, so equal values serialize equally.
    Ok(serde_json::to_string(payload)
        .context("serializing payload to canonical JSON")?
        .into_bytes())
}

/// Canonical JSON with a SHA-256 digest.
pub struct JsonEncoder;

impl PayloadEncoder for JsonEncoder {
    fn encode(&self, payload: &Value) -> Result<EncodedPayload> {
        let data = canonical_json(payload)?;
        let digest = Sha256::digest(&data).to_vec();
        Ok(EncodedPayload { data, digest })
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Canonical JSON hashed as an Ethereum signed message:
/// `keccak256("\x19Ethereum Signed Message:\n" || len || json)`.
pub struct Eip191Encoder;

impl PayloadEncoder for Eip191Encoder {
    fn encode(&self, payload: &Value) -> Result<EncodedPayload> {
        let data = canonical_json(payload)?;
        let digest = eip191_hash_message(&data).to_vec();
        Ok(EncodedPayload { data, digest })
    }

    fn name(&self) -> &str {
        "eip191"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_digest() {
        let a = JsonEncoder.encode(&json!({"b": 2, "a": 1})).unwrap();
        let b = JsonEncoder.encode(&json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn json_digest_is_sha256_of_data() {
        let encoded = JsonEncoder.encode(&json!({"key": "value"})).unwrap();
        assert_eq!(encoded.digest, Sha256::digest(&encoded.data).to_vec());
    }

    #[test]
    fn eip191_digest_uses_signed_message_prefix() {
        let encoded = Eip191Encoder.encode(&json!({"foo": 1})).unwrap();
        let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", encoded.data.len()).into_bytes();
        prefixed.extend_from_slice(&encoded.data);
        assert_eq!(encoded.digest, keccak256(&prefixed).to_vec());
    }

    #[test]
    fn encoders_disagree_on_digest_but_not_data() {
        let payload = json!({"foo": [1, 2, 3]});
        let json = JsonEncoder.encode(&payload).unwrap();
        let eip191 = Eip191Encoder.encode(&payload).unwrap();
        assert_eq!(json.data, eip191.data);
        assert_ne!(json.digest, eip191.digest);
        assert_eq!(JsonEncoder.name(), "json");
        assert_eq!(Eip191Encoder.name(), "eip191");
    }
}
