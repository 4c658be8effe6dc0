//! Encryption adapter.
//!
//! The write pipeline and the reader only talk to [`SecurityHandler`] (to set
//! up or authenticate keys) and [`ObjectCipher`] (to transform string and
//! stream payloads of one object). [`StandardSecurityHandler`] implements the
//! password-based standard handler for RC4-40, RC4-128 and AES-128.

mod aes;
mod cipher;
mod rc4;
mod standard;

pub use cipher::{CryptMethod, ObjectCipher};
pub use standard::StandardSecurityHandler;

use crate::error::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Encryption algorithm for written documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// 40-bit RC4 (V1, R2)
    Rc4_40,
    /// 128-bit RC4 (V2, R3)
    Rc4_128,
    /// 128-bit AES (V4, R4)
    #[default]
    Aes128,
}

impl Algorithm {
    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
        }
    }

    /// The `/V` value.
    pub fn version(&self) -> u32 {
        match self {
            Algorithm::Rc4_40 => 1,
            Algorithm::Rc4_128 => 2,
            Algorithm::Aes128 => 4,
        }
    }

    /// The `/R` value.
    pub fn revision(&self) -> u32 {
        match self {
            Algorithm::Rc4_40 => 2,
            Algorithm::Rc4_128 => 3,
            Algorithm::Aes128 => 4,
        }
    }

    /// Minimum PDF minor version (for 1.x) that can carry this algorithm.
    pub fn min_minor_version(&self) -> u8 {
        match self {
            Algorithm::Rc4_40 => 1,
            Algorithm::Rc4_128 => 4,
            Algorithm::Aes128 => 6,
        }
    }

    pub(crate) fn crypt_method(&self) -> CryptMethod {
        match self {
            Algorithm::Aes128 => CryptMethod::AesV2,
            _ => CryptMethod::Rc4,
        }
    }
}

bitflags! {
    /// User access permissions (the `/P` entry).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Print the document
        const PRINT = 1 << 2;
        /// Modify contents
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics
        const COPY = 1 << 4;
        /// Add or modify annotations and fill fields
        const ANNOTATE = 1 << 5;
        /// Fill existing form fields
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Insert, rotate or delete pages
        const ASSEMBLE = 1 << 10;
        /// Print at full quality
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// The signed `/P` value, with reserved bits set.
    pub fn p_value(self) -> i32 {
        (0xFFFF_F0C0u32 | self.bits()) as i32
    }

    /// Permissions for a read-only document (print and accessibility only).
    pub fn read_only() -> Self {
        Permissions::PRINT | Permissions::EXTRACT_ACCESSIBILITY
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::all()
    }
}

/// Encryption settings for a written document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionConfig {
    /// Password needed to open the document
    pub user_password: Vec<u8>,
    /// Password granting full access (falls back to the user password)
    pub owner_password: Vec<u8>,
    /// Permissions granted to user-password holders
    pub permissions: Permissions,
    /// Cipher to use
    pub algorithm: Algorithm,
}

impl EncryptionConfig {
    /// New config with the given passwords, all permissions and AES-128.
    pub fn new(user_password: impl Into<Vec<u8>>, owner_password: impl Into<Vec<u8>>) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: owner_password.into(),
            ..Default::default()
        }
    }

    /// Set the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Key setup contract used by the reader and the write pipeline.
///
/// Key derivation itself is the handler's business; callers only read back
/// the derived keys.
pub trait SecurityHandler {
    /// Derive owner and user keys plus the file key for a new document.
    fn setup_all_keys(
        &mut self,
        permissions: i32,
        user_password: &[u8],
        owner_password: &[u8],
        file_id: &[u8],
    ) -> Result<()>;

    /// Authenticate with a user password; on success the file key is set.
    fn setup_by_user_password(&mut self, password: &[u8], file_id: &[u8]) -> Result<bool>;

    /// Authenticate with an owner password; on success the file key is set.
    fn setup_by_owner_password(&mut self, password: &[u8], file_id: &[u8]) -> Result<bool>;

    /// The file key, once set up or authenticated.
    fn encryption_key(&self) -> Option<&[u8]>;

    /// The `/O` value.
    fn owner_key(&self) -> &[u8];

    /// The `/U` value.
    fn user_key(&self) -> &[u8];

    /// The `/P` value.
    fn permissions(&self) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bits() {
        assert_eq!(Permissions::all().p_value(), -4);
        assert_eq!(Permissions::empty().p_value(), 0xFFFF_F0C0u32 as i32);
        let read_only = Permissions::read_only();
        assert!(read_only.contains(Permissions::PRINT));
        assert!(!read_only.contains(Permissions::MODIFY));
    }

    #[test]
    fn test_algorithm_versions() {
        assert_eq!((Algorithm::Rc4_40.version(), Algorithm::Rc4_40.revision()), (1, 2));
        assert_eq!((Algorithm::Rc4_128.version(), Algorithm::Rc4_128.revision()), (2, 3));
        assert_eq!((Algorithm::Aes128.version(), Algorithm::Aes128.revision()), (4, 4));
    }

    #[test]
    fn test_config_builder() {
        let config = EncryptionConfig::new("user", "owner")
            .with_algorithm(Algorithm::Rc4_128)
            .with_permissions(Permissions::PRINT);
        assert_eq!(config.user_password, b"user");
        assert_eq!(config.algorithm, Algorithm::Rc4_128);
        assert_eq!(config.permissions, Permissions::PRINT);
    }

    #[test]
    fn test_algorithm_deserializes_from_kebab_case() {
        let algorithm: Algorithm = serde_json::from_str("\"rc4-128\"").unwrap();
        assert_eq!(algorithm, Algorithm::Rc4_128);
    }
}
