//! The commit/reveal envelope protecting bids while a slot is open.
//!
//! A bid is sealed to the market's x25519 public key: the submitter draws an
//! ephemeral secret, performs a Diffie-Hellman exchange with the market key,
//! expands the shared secret through HKDF-SHA256, and encrypts the JSON bid
//! payload with ChaCha20-Poly1305. Because the exchange is symmetric, the
//! envelope opens from either half of the pair: the clearing authority can
//! use the market secret directly, or the submitter can publish the
//! ephemeral secret as a reveal key once the bidding window has closed.

use crate::models::{Bid, BidPayload, RevealKey};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
    aead::rand_core::{OsRng, RngCore},
};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::StaticSecret;

pub use x25519_dalek::PublicKey;

const HKDF_INFO: &[u8] = b"sbm-sealed-bid-v1";

/// Envelope failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    /// The bid payload could not be serialized.
    #[error("bid serialization failed")]
    Serialize,
    /// AEAD encryption failed.
    #[error("encryption failed")]
    Encrypt,
    /// AEAD decryption failed: wrong key, truncated envelope, or tampering.
    #[error("decryption failed")]
    Decrypt,
    /// The decrypted plaintext was not a valid bid payload.
    #[error("decrypted payload is not a valid bid")]
    Malformed,
}

/// The clearing authority's key pair.
///
/// The public half is published to every participant; the secret half stays
/// with the regulator and, in the single-key protocol, is handed to the
/// ledger at clearing time.
#[derive(Clone)]
pub struct MarketKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl MarketKeyPair {
    /// Generate a fresh key pair from the OS entropy source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(&mut OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The published public key.
    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// The secret half, exported as a reveal key for the single-key
    /// protocol's mark-end call.
    pub fn reveal_key(&self) -> RevealKey {
        RevealKey(self.secret.to_bytes())
    }
}

/// An encrypted bid, opaque until a matching key arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBid {
    /// The public half of the submitter's ephemeral secret.
    pub ephemeral_public: [u8; 32],
    /// AEAD nonce, fresh per envelope.
    pub nonce: [u8; 12],
    /// ChaCha20-Poly1305 ciphertext of the JSON bid payload.
    pub ciphertext: Vec<u8>,
}

impl SealedBid {
    /// Seal `bid` to the market public key under a fresh ephemeral secret.
    ///
    /// Returns the envelope together with the reveal key that reopens it.
    pub fn seal(bid: Bid, market_public: &PublicKey) -> Result<(Self, RevealKey), SealError> {
        let secret = StaticSecret::random_from_rng(&mut OsRng);
        let sealed = Self::seal_with(bid, &secret, market_public)?;
        Ok((sealed, RevealKey(secret.to_bytes())))
    }

    /// Seal `bid` under a caller-provided secret.
    ///
    /// The batched protocol reuses one secret for every bid a participant
    /// places on a slot/side pair, so only one reveal is needed later.
    pub fn seal_with(
        bid: Bid,
        secret: &StaticSecret,
        market_public: &PublicKey,
    ) -> Result<Self, SealError> {
        let plaintext =
            serde_json::to_vec(&BidPayload::from(bid)).map_err(|_| SealError::Serialize)?;

        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);

        let key = derive_aead_key(secret, market_public);
        let cipher = ChaCha20Poly1305::new(&key.into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| SealError::Encrypt)?;

        Ok(Self {
            ephemeral_public: PublicKey::from(secret).to_bytes(),
            nonce,
            ciphertext,
        })
    }

    /// Open the envelope with the market's secret key.
    pub fn open_with_market_key(&self, market: &RevealKey) -> Result<Bid, SealError> {
        let secret = StaticSecret::from(*market.as_bytes());
        let peer = PublicKey::from(self.ephemeral_public);
        self.open(&derive_aead_key(&secret, &peer))
    }

    /// Open the envelope with a revealed ephemeral secret.
    pub fn open_with_reveal(
        &self,
        reveal: &RevealKey,
        market_public: &PublicKey,
    ) -> Result<Bid, SealError> {
        let secret = StaticSecret::from(*reveal.as_bytes());
        self.open(&derive_aead_key(&secret, market_public))
    }

    fn open(&self, key: &[u8; 32]) -> Result<Bid, SealError> {
        let cipher = ChaCha20Poly1305::new(key.into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| SealError::Decrypt)?;
        let payload: BidPayload =
            serde_json::from_slice(&plaintext).map_err(|_| SealError::Malformed)?;
        Ok(payload.into())
    }
}

/// A reusable sealing secret.
///
/// The batched reveal protocol seals every bid a participant places on one
/// slot/side pair under the same secret, so a single reveal later opens all
/// of them.
pub struct Sealer {
    secret: StaticSecret,
}

impl Sealer {
    /// Draw a fresh sealing secret.
    pub fn new() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(&mut OsRng),
        }
    }

    /// Seal `bid` to the market public key under this sealer's secret.
    pub fn seal(&self, bid: Bid, market_public: &PublicKey) -> Result<SealedBid, SealError> {
        SealedBid::seal_with(bid, &self.secret, market_public)
    }

    /// Export the secret as a reveal key.
    pub fn reveal_key(&self) -> RevealKey {
        RevealKey(self.secret.to_bytes())
    }
}

impl Default for Sealer {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_aead_key(secret: &StaticSecret, peer: &PublicKey) -> [u8; 32] {
    let shared = secret.diffie_hellman(peer);
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = [0u8; 32];
    // The output length is fixed and valid for SHA-256, so expand cannot fail.
    hk.expand(HKDF_INFO, &mut key).expect("HKDF expand failed");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid() -> Bid {
        Bid::new(7.25, 4.0).unwrap()
    }

    #[test]
    fn opens_from_either_half_of_the_exchange() {
        let market = MarketKeyPair::generate();
        let (sealed, reveal) = SealedBid::seal(bid(), &market.public()).unwrap();

        let via_market = sealed.open_with_market_key(&market.reveal_key()).unwrap();
        let via_reveal = sealed.open_with_reveal(&reveal, &market.public()).unwrap();

        assert_eq!(via_market, bid());
        assert_eq!(via_reveal, bid());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let market = MarketKeyPair::generate();
        let other = MarketKeyPair::generate();
        let (sealed, _) = SealedBid::seal(bid(), &market.public()).unwrap();

        assert_eq!(
            sealed.open_with_market_key(&other.reveal_key()),
            Err(SealError::Decrypt)
        );
    }

    #[test]
    fn shared_secret_reuse_reveals_all_envelopes() {
        let market = MarketKeyPair::generate();
        let secret = StaticSecret::random_from_rng(&mut OsRng);

        let a = SealedBid::seal_with(Bid::new(5.0, 1.0).unwrap(), &secret, &market.public())
            .unwrap();
        let b = SealedBid::seal_with(Bid::new(6.0, 2.0).unwrap(), &secret, &market.public())
            .unwrap();

        let reveal = RevealKey(secret.to_bytes());
        assert!(a.open_with_reveal(&reveal, &market.public()).is_ok());
        assert!(b.open_with_reveal(&reveal, &market.public()).is_ok());
    }
}
