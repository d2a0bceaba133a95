use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use std::fmt;
use std::path::Path;

use super::SignatureDigest;
use crate::auth::AuthError;

/// Private key plus certificate chain from a PKCS#12 file.
pub struct Keystore {
    key: PKey<Private>,
    /// Leaf first.
    chain: Vec<X509>,
}

impl Keystore {
    pub fn from_pkcs12(der: &[u8], passphrase: &str) -> Result<Self, AuthError> {
        let parsed = Pkcs12::from_der(der)
            .and_then(|p| p.parse2(passphrase))
            .map_err(|e| AuthError::Keystore(e.to_string()))?;

        let key = parsed
            .pkey
            .ok_or_else(|| AuthError::Keystore("keystore has no private key".to_string()))?;
        let leaf = parsed
            .cert
            .ok_or_else(|| AuthError::Keystore("keystore has no certificate".to_string()))?;

        let mut chain = vec![leaf];
        if let Some(extra) = parsed.ca {
            chain.extend(extra);
        }
        Ok(Self { key, chain })
    }

    pub fn load(path: &Path, passphrase: &str) -> Result<Self, AuthError> {
        let der = std::fs::read(path)
            .map_err(|e| AuthError::Keystore(format!("{}: {}", path.display(), e)))?;
        Self::from_pkcs12(&der, passphrase)
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// Chain as DER, leaf first.
    pub fn chain_der(&self) -> Result<Vec<Vec<u8>>, AuthError> {
        self.chain
            .iter()
            .map(|cert| cert.to_der().map_err(AuthError::from))
            .collect()
    }

    /// RSA PKCS#1 v1.5 signature over `data`.
    pub fn sign(&self, data: &[u8], digest: SignatureDigest) -> Result<Vec<u8>, AuthError> {
        let mut signer = Signer::new(digest.message_digest(), &self.key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    /// Verify a signature produced by [`sign`](Self::sign) with the leaf's public key.
    pub fn verify(&self, data: &[u8], signature: &[u8], digest: SignatureDigest) -> Result<bool, AuthError> {
        let public = self.chain[0].public_key()?;
        let mut verifier = openssl::sign::Verifier::new(digest.message_digest(), &public)?;
        verifier.update(data)?;
        Ok(verifier.verify(signature)?)
    }
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subjects: Vec<String> = self
            .chain
            .iter()
            .map(|c| format!("{:?}", c.subject_name()))
            .collect();
        f.debug_struct("Keystore").field("chain", &subjects).finish()
    }
}
