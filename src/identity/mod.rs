//! Bootstrap identity generation
//!
//! Every deploy mints a fresh trust domain for the simulated network:
//!
//! - an Ed25519 keypair for the bootstrap peer, marshalled the way libp2p
//!   stores private keys (protobuf envelope, base64) so `ipfs-cluster-service`
//!   can consume it directly
//! - the peer id derived from the public key (identity multihash, base58btc),
//!   which lets joining peers address the bootstrap without the full key
//! - a 32-byte cluster secret shared by every peer of the deployment
//!
//! Nothing here is cached or persisted. Redeploying a topology changes its
//! network identity.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::SigningKey;

use crate::{Error, Result};

/// Size of the cluster secret in bytes
pub const CLUSTER_SECRET_BYTES: usize = 32;

/// libp2p `KeyType::Ed25519`
const KEY_TYPE_ED25519: u8 = 1;

/// Multihash code of the identity hash function
const MULTIHASH_IDENTITY: u8 = 0x00;

/// Fill a buffer from the system CSPRNG
fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    aws_lc_rs::rand::fill(&mut buf)
        .map_err(|_| Error::identity("system random number generator unavailable"))?;
    Ok(buf)
}

/// Encode `KeyType` + `Data` as the libp2p crypto protobuf message
fn encode_key_message(data: &[u8]) -> Vec<u8> {
    // field 1 (varint): key type, field 2 (bytes): key data
    let mut out = Vec::with_capacity(data.len() + 4);
    out.extend_from_slice(&[0x08, KEY_TYPE_ED25519, 0x12, data.len() as u8]);
    out.extend_from_slice(data);
    out
}

/// libp2p peer identifier of a public key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    /// Derive the peer id of an Ed25519 public key
    pub fn from_ed25519_public(public: &[u8; 32]) -> Self {
        let encoded = encode_key_message(public);
        // keys up to 42 bytes are inlined with the identity hash
        let mut multihash = Vec::with_capacity(encoded.len() + 2);
        multihash.push(MULTIHASH_IDENTITY);
        multihash.push(encoded.len() as u8);
        multihash.extend_from_slice(&encoded);
        Self(bs58::encode(multihash).into_string())
    }

    /// Base58 representation (`12D3KooW...`)
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bootstrap peer keypair
#[derive(Clone)]
pub struct PeerKeypair {
    /// base64(protobuf(PrivateKey)) as consumed by ipfs-cluster
    private_key: String,
    peer_id: PeerId,
}

impl PeerKeypair {
    /// Generate a new Ed25519 keypair
    pub fn generate() -> Result<Self> {
        let seed = random_bytes::<32>()?;
        Ok(Self::from_seed(&seed))
    }

    /// Build the keypair from a 32-byte Ed25519 seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(seed);
        let public = signing.verifying_key().to_bytes();

        // libp2p stores Ed25519 private keys as seed || public
        let mut keypair_bytes = [0u8; 64];
        keypair_bytes[..32].copy_from_slice(seed);
        keypair_bytes[32..].copy_from_slice(&public);

        Self {
            private_key: STANDARD.encode(encode_key_message(&keypair_bytes)),
            peer_id: PeerId::from_ed25519_public(&public),
        }
    }

    /// Marshalled private key, base64 encoded
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Peer id derived from the public key
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }
}

impl std::fmt::Debug for PeerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the private key in debug output
        f.debug_struct("PeerKeypair")
            .field("peer_id", &self.peer_id)
            .finish()
    }
}

/// Shared symmetric secret gating membership in one deployment
#[derive(Clone)]
pub struct ClusterSecret(String);

impl ClusterSecret {
    /// Generate a new random secret
    pub fn generate() -> Result<Self> {
        let raw = random_bytes::<CLUSTER_SECRET_BYTES>()?;
        Ok(Self(hex::encode(raw)))
    }

    /// Hex encoded secret
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ClusterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClusterSecret(<redacted>)")
    }
}

/// Keypair and cluster secret minted for one deploy
#[derive(Clone, Debug)]
pub struct BootstrapIdentity {
    /// Bootstrap peer keypair
    pub keypair: PeerKeypair,
    /// Shared cluster secret
    pub cluster_secret: ClusterSecret,
}

impl BootstrapIdentity {
    /// Generate a fresh identity.
    ///
    /// Fails only when the system random number generator is unavailable.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            keypair: PeerKeypair::generate()?,
            cluster_secret: ClusterSecret::generate()?,
        })
    }

    /// Peer id of the bootstrap node
    pub fn peer_id(&self) -> &PeerId {
        self.keypair.peer_id()
    }
}
