//! Standard password-based security handler (revisions 2 to 4).
//!
//! Key derivation follows the MD5/RC4 construction of the standard security
//! handler: the file key is derived from the padded user password, the /O
//! entry, the permission word and the first file identifier.

use super::rc4::rc4_crypt;
use super::{Algorithm, CryptMethod, ObjectCipher, SecurityHandler};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use md5::{Digest, Md5};

/// Padding string used to extend passwords to 32 bytes.
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// RC4 key used to produce or open the /O entry.
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_len: usize) -> Vec<u8> {
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_len]).to_vec();
        }
    }
    hash.truncate(key_len);
    hash
}

/// Apply the 20-round RC4 with XOR-ed keys used for /O and /U at R >= 3.
fn rc4_rounds(key: &[u8], data: &[u8], rounds: impl Iterator<Item = u8>) -> Vec<u8> {
    let mut out = data.to_vec();
    for i in rounds {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = rc4_crypt(&round_key, &out);
    }
    out
}

/// Password-based handler for RC4-40, RC4-128 and AES-128 documents.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    algorithm: Algorithm,
    revision: u32,
    key_len: usize,
    permissions: i32,
    encrypt_metadata: bool,
    owner_key: Vec<u8>,
    user_key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    file_key: Option<Vec<u8>>,
}

impl StandardSecurityHandler {
    /// Handler that will encrypt a new document with `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        let method = algorithm.crypt_method();
        Self {
            algorithm,
            revision: algorithm.revision(),
            key_len: algorithm.key_length(),
            permissions: 0,
            encrypt_metadata: true,
            owner_key: Vec::new(),
            user_key: Vec::new(),
            string_method: method,
            stream_method: method,
            file_key: None,
        }
    }

    /// Handler for a source document's `/Encrypt` dictionary.
    pub fn from_encrypt_dict(dict: &Dictionary) -> Result<Self> {
        let int = |key: &str| dict.get(key).and_then(Object::as_integer);
        let bytes = |key: &str| {
            dict.get(key)
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::Encryption(format!("Encrypt dictionary missing /{}", key)))
        };

        let filter = dict.get("Filter").and_then(Object::as_name).unwrap_or("");
        if filter != "Standard" {
            return Err(Error::Encryption(format!("unsupported security handler /{}", filter)));
        }
        let v = int("V").unwrap_or(0);
        let r = int("R").unwrap_or(0);
        let algorithm = match (v, r) {
            (1, 2) => Algorithm::Rc4_40,
            (2, 3) | (2, 2) => Algorithm::Rc4_128,
            (4, 4) => Algorithm::Aes128,
            _ => return Err(Error::Encryption(format!("unsupported encryption V={} R={}", v, r))),
        };

        let key_len = match int("Length") {
            Some(bits) if v == 2 && (40..=128).contains(&bits) => (bits / 8) as usize,
            _ => algorithm.key_length(),
        };

        let (string_method, stream_method) = if v == 4 {
            let method_of = |filter_key: &str| -> CryptMethod {
                let name = dict.get(filter_key).and_then(Object::as_name).unwrap_or("Identity");
                if name == "Identity" {
                    return CryptMethod::Identity;
                }
                let cfm = dict
                    .get("CF")
                    .and_then(|cf| cf.get(name))
                    .and_then(|f| f.get("CFM"))
                    .and_then(Object::as_name);
                match cfm {
                    Some("AESV2") => CryptMethod::AesV2,
                    Some("None") => CryptMethod::Identity,
                    _ => CryptMethod::Rc4,
                }
            };
            (method_of("StrF"), method_of("StmF"))
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };

        Ok(Self {
            algorithm,
            revision: r as u32,
            key_len,
            permissions: int("P").unwrap_or(0) as i32,
            encrypt_metadata: dict.get("EncryptMetadata").and_then(Object::as_bool).unwrap_or(true),
            owner_key: bytes("O")?,
            user_key: bytes("U")?,
            string_method,
            stream_method,
            file_key: None,
        })
    }

    /// Do not encrypt XMP metadata streams.
    pub fn with_plain_metadata(mut self) -> Self {
        self.encrypt_metadata = false;
        self
    }

    /// The algorithm in use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Algorithm 2: file key from a user password.
    fn compute_file_key(&self, password: &[u8], file_id: &[u8]) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(pad_password(password));
        hasher.update(&self.owner_key);
        hasher.update(self.permissions.to_le_bytes());
        hasher.update(file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            hasher.update([0xFF; 4]);
        }
        let mut hash = hasher.finalize().to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(&hash[..self.key_len]).to_vec();
            }
        }
        hash.truncate(self.key_len);
        hash
    }

    /// Algorithms 4 and 5: the /U value for a file key.
    fn compute_user_key(&self, file_key: &[u8], file_id: &[u8]) -> Vec<u8> {
        if self.revision >= 3 {
            let mut hasher = Md5::new();
            hasher.update(PADDING);
            hasher.update(file_id);
            let mut out = rc4_rounds(file_key, &hasher.finalize(), 0..20);
            out.extend_from_slice(&[0u8; 16]);
            out
        } else {
            rc4_crypt(file_key, &PADDING)
        }
    }

    /// The `/Encrypt` dictionary describing this handler's keys.
    pub fn encrypt_dict(&self) -> Result<Dictionary> {
        if self.owner_key.is_empty() || self.user_key.is_empty() {
            return Err(Error::usage("encryption keys have not been set up"));
        }
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("Standard"));
        dict.insert("V".to_string(), Object::Integer(self.algorithm.version() as i64));
        dict.insert("R".to_string(), Object::Integer(self.revision as i64));
        dict.insert("Length".to_string(), Object::Integer((self.key_len * 8) as i64));
        dict.insert("O".to_string(), Object::String(self.owner_key.clone()));
        dict.insert("U".to_string(), Object::String(self.user_key.clone()));
        dict.insert("P".to_string(), Object::Integer(self.permissions as i64));
        if self.algorithm == Algorithm::Aes128 {
            let std_cf = Object::dict([
                ("Type", Object::name("CryptFilter")),
                ("CFM", Object::name("AESV2")),
                ("AuthEvent", Object::name("DocOpen")),
                ("Length", Object::Integer(16)),
            ]);
            dict.insert("CF".to_string(), Object::dict([("StdCF", std_cf)]));
            dict.insert("StmF".to_string(), Object::name("StdCF"));
            dict.insert("StrF".to_string(), Object::name("StdCF"));
            if !self.encrypt_metadata {
                dict.insert("EncryptMetadata".to_string(), Object::Boolean(false));
            }
        }
        Ok(dict)
    }

    /// Per-object cipher for the authenticated or freshly set up key.
    pub fn cipher(&self) -> Option<ObjectCipher> {
        self.file_key.as_ref().map(|key| ObjectCipher {
            key: key.clone(),
            string_method: self.string_method,
            stream_method: self.stream_method,
            encrypt_metadata: self.encrypt_metadata,
        })
    }
}

impl SecurityHandler for StandardSecurityHandler {
    fn setup_all_keys(
        &mut self,
        permissions: i32,
        user_password: &[u8],
        owner_password: &[u8],
        file_id: &[u8],
    ) -> Result<()> {
        let owner_password = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };
        self.permissions = permissions;

        // Algorithm 3: /O from the owner password.
        let rc4_key = owner_rc4_key(owner_password, self.revision, self.key_len);
        let mut owner_key = rc4_crypt(&rc4_key, &pad_password(user_password));
        if self.revision >= 3 {
            owner_key = rc4_rounds(&rc4_key, &owner_key, 1..=19);
        }
        self.owner_key = owner_key;

        let file_key = self.compute_file_key(user_password, file_id);
        self.user_key = self.compute_user_key(&file_key, file_id);
        self.file_key = Some(file_key);
        log::debug!(
            "Set up {:?} keys (R={}, {} byte key)",
            self.algorithm,
            self.revision,
            self.key_len
        );
        Ok(())
    }

    fn setup_by_user_password(&mut self, password: &[u8], file_id: &[u8]) -> Result<bool> {
        if self.user_key.len() < 16 {
            return Err(Error::Encryption("/U entry is too short".to_string()));
        }
        let file_key = self.compute_file_key(password, file_id);
        let expected = self.compute_user_key(&file_key, file_id);
        let compare_len = if self.revision >= 3 { 16 } else { 32 };
        let matches = expected.len() >= compare_len
            && self.user_key.len() >= compare_len
            && expected[..compare_len] == self.user_key[..compare_len];
        if matches {
            self.file_key = Some(file_key);
        }
        Ok(matches)
    }

    fn setup_by_owner_password(&mut self, password: &[u8], file_id: &[u8]) -> Result<bool> {
        // Algorithm 7: recover the user password from /O.
        let rc4_key = owner_rc4_key(password, self.revision, self.key_len);
        let user_password = if self.revision >= 3 {
            rc4_rounds(&rc4_key, &self.owner_key, (0..=19).rev())
        } else {
            rc4_crypt(&rc4_key, &self.owner_key)
        };
        self.setup_by_user_password(&user_password, file_id)
    }

    fn encryption_key(&self) -> Option<&[u8]> {
        self.file_key.as_deref()
    }

    fn owner_key(&self) -> &[u8] {
        &self.owner_key
    }

    fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    fn permissions(&self) -> i32 {
        self.permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::Permissions;

    const FILE_ID: &[u8] = b"0123456789abcdef";

    fn reopen(handler: &StandardSecurityHandler) -> StandardSecurityHandler {
        StandardSecurityHandler::from_encrypt_dict(&handler.encrypt_dict().unwrap()).unwrap()
    }

    #[test]
    fn test_pad_password() {
        assert_eq!(pad_password(b""), PADDING);
        let padded = pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PADDING[..29]);
    }

    #[test]
    fn test_user_password_round_trip_all_algorithms() {
        for algorithm in [Algorithm::Rc4_40, Algorithm::Rc4_128, Algorithm::Aes128] {
            let mut writer = StandardSecurityHandler::new(algorithm);
            writer
                .setup_all_keys(Permissions::all().p_value(), b"user", b"owner", FILE_ID)
                .unwrap();
            let key = writer.encryption_key().unwrap().to_vec();
            assert_eq!(key.len(), algorithm.key_length());

            let mut reader = reopen(&writer);
            assert!(!reader.setup_by_user_password(b"wrong", FILE_ID).unwrap());
            assert!(reader.encryption_key().is_none());
            assert!(reader.setup_by_user_password(b"user", FILE_ID).unwrap());
            assert_eq!(reader.encryption_key(), Some(&key[..]));
        }
    }

    #[test]
    fn test_owner_password_unlocks() {
        let mut writer = StandardSecurityHandler::new(Algorithm::Rc4_128);
        writer
            .setup_all_keys(Permissions::PRINT.p_value(), b"", b"secret", FILE_ID)
            .unwrap();
        let mut reader = reopen(&writer);
        assert!(reader.setup_by_owner_password(b"secret", FILE_ID).unwrap());
        assert_eq!(reader.encryption_key(), writer.encryption_key());
        assert_eq!(reader.permissions(), Permissions::PRINT.p_value());
    }

    #[test]
    fn test_empty_user_password_opens() {
        let mut writer = StandardSecurityHandler::new(Algorithm::Aes128);
        writer.setup_all_keys(-4, b"", b"owner", FILE_ID).unwrap();
        let mut reader = reopen(&writer);
        assert!(reader.setup_by_user_password(b"", FILE_ID).unwrap());
    }

    #[test]
    fn test_aes_dict_has_crypt_filter() {
        let mut writer = StandardSecurityHandler::new(Algorithm::Aes128);
        writer.setup_all_keys(-4, b"u", b"o", FILE_ID).unwrap();
        let dict = writer.encrypt_dict().unwrap();
        assert_eq!(dict.get("V"), Some(&Object::Integer(4)));
        assert_eq!(dict.get("R"), Some(&Object::Integer(4)));
        assert_eq!(dict.get("StmF"), Some(&Object::name("StdCF")));
        let reader = StandardSecurityHandler::from_encrypt_dict(&dict).unwrap();
        assert_eq!(reader.stream_method, CryptMethod::AesV2);
    }

    #[test]
    fn test_encrypt_dict_requires_setup() {
        assert!(StandardSecurityHandler::new(Algorithm::Rc4_40).encrypt_dict().unwrap_err().is_usage());
    }

    #[test]
    fn test_rejects_unknown_handler() {
        let dict = Dictionary::from([("Filter".to_string(), Object::name("Adobe.PubSec"))]);
        assert!(StandardSecurityHandler::from_encrypt_dict(&dict).is_err());
    }
}
