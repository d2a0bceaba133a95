//! Testing utilities and mock implementations for end-to-end tests.
//!
//! Mocks for every external seam a job touches: the browser session, object
//! storage and the progress channel. Each mock is cheap to clone and clones
//! share state, so tests keep a handle for assertions.
//!
//! # Example
//!
//! ```rust,ignore
//! use docket_core::testing::{MockDriverFactory, MockObjectStorage, MockPageDriver};
//!
//! let storage = MockObjectStorage::new();
//! storage.insert("docket", "jobs/7/input.xlsx", bytes).await;
//!
//! let drivers = MockDriverFactory::new(MockPageDriver::new());
//! // Build JobServices around these...
//! ```

mod mock_channel;
mod mock_driver;
mod mock_storage;

pub use mock_channel::MockProgressChannel;
pub use mock_driver::{MockDriverFactory, MockPageDriver};
pub use mock_storage::MockObjectStorage;

/// Test fixtures and helper functions.
pub mod fixtures {
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkcs12::Pkcs12;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509Builder, X509NameBuilder};
    use std::path::Path;

    use crate::record::FieldValue;

    /// DER-encoded PKCS#12 bundle holding a fresh 2048-bit RSA key and a
    /// self-signed certificate for it.
    pub fn self_signed_keystore(passphrase: &str) -> Vec<u8> {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "Docket Test Signer").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        Pkcs12::builder()
            .name("docket-test")
            .pkey(&key)
            .cert(&cert)
            .build2(passphrase)
            .unwrap()
            .to_der()
            .unwrap()
    }

    /// Single-sheet workbook with a header row and `rows` below it.
    pub fn workbook_bytes(headers: &[&str], rows: &[Vec<FieldValue>]) -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let col = col as u16;
                match value {
                    FieldValue::Integer(n) => sheet.write_number(r, col, *n as f64).unwrap(),
                    FieldValue::Number(n) => sheet.write_number(r, col, *n).unwrap(),
                    other => sheet.write_string(r, col, other.display_text()).unwrap(),
                };
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    /// Write [`workbook_bytes`] to `path`.
    pub fn write_workbook(path: &Path, headers: &[&str], rows: &[Vec<FieldValue>]) {
        std::fs::write(path, workbook_bytes(headers, rows)).unwrap();
    }
}
