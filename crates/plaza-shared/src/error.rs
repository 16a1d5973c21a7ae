use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Sealing failed")]
    EncryptionFailed,

    #[error("Opening failed: wrong key or damaged ciphertext")]
    DecryptionFailed,

    #[error("Key material must be exactly 32 bytes")]
    InvalidKeyLength,

    #[error("No published key for {0}")]
    MissingKey(String),
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Unusable key bytes")]
    InvalidKeyBytes,

    #[error("Device key file: {0}")]
    KeyFile(String),
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid base64 field: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid or missing field: {0}")]
    InvalidField(&'static str),
}
