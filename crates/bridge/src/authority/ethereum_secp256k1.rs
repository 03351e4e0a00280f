use anyhow::Result;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};

use super::signer::{PayloadSigner, key_from_seed};

/// secp256k1 with the recoverable 65-byte `r || s || v` layout wallets hand
/// back to dapps. `v` is the raw recovery id (0 or 1).
pub struct EthereumSecp256k1Signer {
    key: SigningKey,
}

impl EthereumSecp256k1Signer {
    pub fn from_seed(seed: &str) -> Result<Self> {
        Ok(Self {
            key: key_from_seed(seed)?,
        })
    }
}

impl PayloadSigner for EthereumSecp256k1Signer {
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let (signature, recovery): (Signature, RecoveryId) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| anyhow::anyhow!("recoverable signing failed: {e}"))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery.to_byte());
        Ok(out)
    }

    /// Uncompressed SEC1 point; the address is derived from this form.
    fn public_key_bytes(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    fn algorithm(&self) -> &str {
        "ethereum-secp256k1"
    }
}
