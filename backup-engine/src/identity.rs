//! Identity provider seam.
//!
//! The user's remote-addressable keypair lives outside this engine; only its
//! capabilities are consumed here: a stable public key used as the addressing
//! namespace for all backups, encrypt/decrypt over opaque bytes, and
//! readiness/close lifecycle hooks that gate transport use. Algorithm
//! selection is the provider's business.

use crate::utils::errors::Result;
use async_trait::async_trait;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable public key, usable as a remote addressing namespace.
    fn public_key(&self) -> String;

    /// Resolves once the identity is usable. The engine waits on this before
    /// any transport call.
    async fn ready(&self) -> Result<()>;

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`crate::EngineError::Decrypt`] on wrong key or corrupted
    /// data.
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}
