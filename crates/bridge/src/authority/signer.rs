use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};

/// Synchronous key holder behind [`SignerAuthority`](super::SignerAuthority).
///
/// Signing a digest is CPU-bound, so this stays sync. Backends that need I/O
/// (hardware wallets, KMS) implement [`Authority`](super::Authority) directly.
pub trait PayloadSigner: Send + Sync {
    /// Sign a pre-computed digest. Returns raw signature bytes.
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>>;

    /// Public key bytes, encoded the way this algorithm's verifiers expect.
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Algorithm identifier, e.g. `"secp256k1"`.
    fn algorithm(&self) -> &str;
}

/// Derives a secp256k1 key from an operator-supplied seed: the key is the
/// SHA-256 of the seed's bytes.
pub(crate) fn key_from_seed(seed: &str) -> Result<SigningKey> {
    let scalar = Sha256::digest(seed.as_bytes());
    SigningKey::from_bytes(&scalar)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("seed does not hash to a valid secp256k1 scalar")
}
