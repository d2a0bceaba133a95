use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::Keystore;
use crate::auth::AuthError;

const SEQUENCE_TAG: u8 = 0x30;

/// DER length octets (short form below 128, long form otherwise).
fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend(bytes);
    out
}

/// `PkiPath ::= SEQUENCE OF Certificate`, trust anchor first.
///
/// `chain` is leaf first, as stored in the keystore.
pub fn encode_pki_path(chain: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chain.iter().rev().flatten().copied().collect();
    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(SEQUENCE_TAG);
    out.extend(der_length(body.len()));
    out.extend(body);
    out
}

/// Base64 PkiPath of the keystore's certificate chain.
pub fn pki_path_base64(keystore: &Keystore) -> Result<String, AuthError> {
    Ok(STANDARD.encode(encode_pki_path(&keystore.chain_der()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::self_signed_keystore;
    use openssl::x509::X509;

    #[test]
    fn test_der_length_forms() {
        assert_eq!(der_length(5), vec![0x05]);
        assert_eq!(der_length(127), vec![0x7f]);
        assert_eq!(der_length(128), vec![0x81, 0x80]);
        assert_eq!(der_length(0x1234), vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn test_chain_is_reversed() {
        let leaf = vec![0xAA, 0x01];
        let root = vec![0xBB, 0x02];
        let encoded = encode_pki_path(&[leaf, root]);
        assert_eq!(encoded, vec![0x30, 0x04, 0xBB, 0x02, 0xAA, 0x01]);
    }

    #[test]
    fn test_keystore_chain_round_trips() {
        let der = self_signed_keystore("pfx-pass");
        let keystore = Keystore::from_pkcs12(&der, "pfx-pass").unwrap();

        let encoded = STANDARD.decode(pki_path_base64(&keystore).unwrap()).unwrap();
        assert_eq!(encoded[0], SEQUENCE_TAG);

        // Single certificate: the sequence body is that certificate.
        let leaf = keystore.chain_der().unwrap().remove(0);
        let header = 1 + der_length(leaf.len()).len();
        assert_eq!(encoded.len(), header + leaf.len());
        let cert = X509::from_der(&encoded[header..]).unwrap();
        assert_eq!(cert.to_der().unwrap(), leaf);
    }
}
