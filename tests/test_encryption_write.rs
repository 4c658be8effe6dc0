//! Integration tests for encryption on write.
//!
//! Tests encryption functionality including:
//! - Writing encrypted PDFs with RC4-40, RC4-128 and AES-128
//! - Reading them back with the user and owner passwords
//! - Version raising for algorithms newer than the requested version
//! - Encrypt dictionary structure validation

mod common;

use common::*;
use pdf_binder::{
    Algorithm, Document, EncryptionConfig, Object, Permissions, PdfReader, PdfVersion, ReadOptions, Reader,
    WriteOptions,
};
use tempfile::tempdir;

fn encrypted_document(config: EncryptionConfig) -> Document {
    let mut doc = Document::new();
    doc.add_page_with_content(400.0, 400.0, b"BT /F1 12 Tf (secret) Tj ET".to_vec(), &Default::default())
        .unwrap();
    let page = doc.page_key(0).unwrap();
    doc.add_bookmark(None, "Secret chapter", page).unwrap();
    doc.set_info("Title", "Classified");
    doc.set_encryption(Some(config));
    doc
}

fn read(bytes: Vec<u8>, password: &str) -> pdf_binder::Result<PdfReader> {
    PdfReader::from_bytes(bytes, &ReadOptions::new().with_password(password))
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_every_algorithm_round_trips() {
        init_logger();
        for algorithm in [Algorithm::Rc4_40, Algorithm::Rc4_128, Algorithm::Aes128] {
            let mut doc = encrypted_document(EncryptionConfig::new("user", "owner").with_algorithm(algorithm));
            let bytes = doc.to_bytes(&WriteOptions::new()).unwrap();
            assert!(!bytes.windows(10).any(|w| w == b"Classified"), "{:?}", algorithm);

            for password in ["user", "owner"] {
                let reader = read(bytes.clone(), password).unwrap();
                assert!(reader.is_encrypted());
                let info = reader.info().unwrap();
                assert_eq!(info.get("Title"), Some(&Object::String(b"Classified".to_vec())));
                assert_eq!(reader.page_refs().unwrap().len(), 1);
            }
        }
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let mut doc = encrypted_document(EncryptionConfig::new("user", "owner"));
        let bytes = doc.to_bytes(&WriteOptions::new()).unwrap();
        assert!(read(bytes, "guess").is_err());
    }

    #[test]
    fn test_empty_user_password_opens_without_prompt() {
        let mut doc = encrypted_document(EncryptionConfig::new("", "owner"));
        let bytes = doc.to_bytes(&WriteOptions::new()).unwrap();
        let reader = open(bytes);
        assert!(reader.is_encrypted());
        assert_eq!(reader.page_refs().unwrap().len(), 1);
    }

    #[test]
    fn test_password_prompt_is_consulted() {
        let mut doc = encrypted_document(EncryptionConfig::new("user", "owner"));
        let bytes = doc.to_bytes(&WriteOptions::new()).unwrap();
        let options = ReadOptions::new().on_password(|| Some(b"user".to_vec()));
        let reader = PdfReader::from_bytes(bytes, &options).unwrap();
        assert_eq!(reader.page_refs().unwrap().len(), 1);
    }

    #[test]
    fn test_packed_objects_survive_encryption() {
        let mut doc = encrypted_document(EncryptionConfig::new("user", "owner"));
        let bytes = doc.to_bytes(&WriteOptions::new().with_version(PdfVersion::V1_7)).unwrap();
        assert!(doc.last_session().unwrap().compressed_count() > 0);

        let reader = read(bytes, "user").unwrap();
        let outlines = reader.deref(reader.catalog().unwrap().get("Outlines").unwrap()).unwrap();
        let first = reader.deref(outlines.get("First").unwrap()).unwrap();
        assert_eq!(first.get("Title"), Some(&Object::String(b"Secret chapter".to_vec())));
    }
}

mod dictionary_tests {
    use super::*;

    #[test]
    fn test_encrypt_dictionary_entries() {
        let config = EncryptionConfig::new("user", "owner")
            .with_algorithm(Algorithm::Rc4_128)
            .with_permissions(Permissions::read_only());
        let mut doc = encrypted_document(config);
        let reader = read(doc.to_bytes(&WriteOptions::new()).unwrap(), "user").unwrap();

        let dict = reader.encrypt_dict().unwrap();
        assert_eq!(dict.get("Filter"), Some(&Object::name("Standard")));
        assert_eq!(dict.get("V"), Some(&Object::Integer(2)));
        assert_eq!(dict.get("R"), Some(&Object::Integer(3)));
        assert_eq!(dict.get("P"), Some(&Object::Integer(Permissions::read_only().p_value() as i64)));
    }

    #[test]
    fn test_aes_raises_version() {
        let mut doc = encrypted_document(EncryptionConfig::new("user", "owner"));
        let bytes = doc.to_bytes(&WriteOptions::new().with_version(PdfVersion::V1_4)).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.6"));
        assert!(has_xref_stream(&bytes));
        let reader = read(bytes, "owner").unwrap();
        assert_eq!(reader.version(), PdfVersion::new(1, 6));
    }

    #[test]
    fn test_file_id_in_trailer() {
        let mut doc = encrypted_document(EncryptionConfig::new("user", "owner").with_algorithm(Algorithm::Rc4_40));
        let reader = read(doc.to_bytes(&WriteOptions::new()).unwrap(), "user").unwrap();
        let (first, second) = reader.file_id().unwrap();
        assert_eq!(first.len(), 16);
        assert_eq!(second.len(), 16);
    }

    fn open_identified() -> (tempfile::TempDir, Document) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identified.pdf");
        std::fs::write(&path, identified_source()).unwrap();
        let doc = Document::open(&path).unwrap();
        (dir, doc)
    }

    #[test]
    fn test_opened_document_keeps_first_id() {
        let (_dir, mut doc) = open_identified();
        let reader = open(doc.to_bytes(&WriteOptions::new()).unwrap());
        let (first, second) = reader.file_id().unwrap();
        assert_eq!(first, SOURCE_ID.0.to_vec());
        assert_ne!(second, SOURCE_ID.1.to_vec());
        assert_eq!(second.len(), 16);
    }

    #[test]
    fn test_encrypted_output_keeps_first_id() {
        let (_dir, mut doc) = open_identified();
        doc.set_encryption(Some(EncryptionConfig::new("user", "owner").with_algorithm(Algorithm::Rc4_128)));
        let reader = read(doc.to_bytes(&WriteOptions::new()).unwrap(), "user").unwrap();
        let (first, second) = reader.file_id().unwrap();
        assert_eq!(first, SOURCE_ID.0.to_vec());
        assert_ne!(second, SOURCE_ID.1.to_vec());
        assert_eq!(reader.page_refs().unwrap().len(), 1);
    }
}
