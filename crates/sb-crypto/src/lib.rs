use anyhow::{Context, Result, anyhow};
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sb_api_types::WalletAddress;
use std::fmt;
use std::path::Path;
use zeroize::Zeroize;

pub trait Signer: Send + Sync {
    fn address(&self) -> WalletAddress;
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Locally created ed25519 account. The secret half never leaves this struct
/// except through [`GeneratedAccount::to_keypair_bytes`].
pub struct GeneratedAccount {
    signing_key: SigningKey,
    address: WalletAddress,
}

impl GeneratedAccount {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = WalletAddress::from_public_key(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Solana CLI layout: 32 secret bytes followed by 32 public bytes.
    pub fn from_keypair_bytes(keypair: &[u8; 64]) -> Result<Self> {
        let signing_key = SigningKey::from_keypair_bytes(keypair)
            .map_err(|err| anyhow!("invalid keypair bytes: {err}"))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl Signer for GeneratedAccount {
    fn address(&self) -> WalletAddress {
        self.address.clone()
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(anyhow!("payload cannot be empty"));
        }

        let signature: Signature = self.signing_key.sign(payload);
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for GeneratedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

pub fn verify(address: &WalletAddress, payload: &[u8], signature: &[u8]) -> Result<()> {
    let public_key = address.to_public_key()?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|err| anyhow!("invalid public key: {err}"))?;
    let signature =
        Signature::from_slice(signature).map_err(|err| anyhow!("invalid signature: {err}"))?;
    verifying_key
        .verify(payload, &signature)
        .map_err(|err| anyhow!("signature mismatch for {address}: {err}"))
}

/// Parses the JSON byte-array keypair format written by `solana-keygen`.
pub fn parse_keypair_json(raw: &str) -> Result<GeneratedAccount> {
    let mut bytes: Vec<u8> =
        serde_json::from_str(raw.trim()).context("keypair file must be a JSON array of bytes")?;

    let keypair = <[u8; 64]>::try_from(bytes.as_slice());
    let len = bytes.len();
    bytes.zeroize();

    let mut keypair = keypair.map_err(|_| anyhow!("keypair must hold 64 bytes, got {len}"))?;
    let account = GeneratedAccount::from_keypair_bytes(&keypair);
    keypair.zeroize();
    account
}

pub fn read_keypair_file(path: impl AsRef<Path>) -> Result<GeneratedAccount> {
    let path = path.as_ref();
    let mut raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keypair file {}", path.display()))?;
    let account = parse_keypair_json(&raw);
    raw.zeroize();
    account
}
