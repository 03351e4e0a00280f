use anyhow::Result;
use k256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};

use super::signer::{PayloadSigner, key_from_seed};

/// Plain secp256k1 ECDSA: 64-byte `r || s` signatures, compressed SEC1 key.
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    pub fn from_seed(seed: &str) -> Result<Self> {
        Ok(Self {
            key: key_from_seed(seed)?,
        })
    }
}

impl PayloadSigner for Secp256k1Signer {
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .key
            .sign_prehash(digest)
            .map_err(|e| anyhow::anyhow!("secp256k1 signing failed: {e}"))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.key.verifying_key().to_sec1_bytes().to_vec()
    }

    fn algorithm(&self) -> &str {
        "secp256k1"
    }
}
