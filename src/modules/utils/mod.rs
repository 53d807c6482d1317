use base64::{engine::general_purpose, Engine};
use rand::{rng, Rng};

#[macro_export]
macro_rules! nubo_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::NuboError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! encode_folder_name {
    ($name:expr) => {{
        utf7_imap::encode_utf7_imap($name.to_string())
    }};
}

#[macro_export]
macro_rules! decode_folder_name {
    ($name:expr) => {{
        utf7_imap::decode_utf7_imap($name)
    }};
}

#[macro_export]
macro_rules! id {
    ($bit_strength:expr) => {{
        let token = $crate::modules::utils::generate_token_impl($bit_strength);
        $crate::modules::utils::hash(&token)
    }};
}

#[macro_export]
macro_rules! generate_token {
    ($bit_strength:expr) => {{
        $crate::modules::utils::generate_token_impl($bit_strength)
    }};
}

/// Generates a 64-bit hash from a string, kept within JavaScript's safe integer range.
pub fn hash(s: &str) -> u64 {
    let mut cursor = std::io::Cursor::new(s.as_bytes().to_vec());
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    (hash & 0x1F_FFFF_FFFF_FFFF) as u64
}

/// Stable identifier for an (account, folder name) pair.
pub fn folder_id(account_id: u64, folder_name: &str) -> u64 {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&account_id.to_le_bytes());
    buffer.push(b':');
    buffer.extend_from_slice(folder_name.as_bytes());
    let mut cursor = std::io::Cursor::new(buffer);
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    hash as u64
}

/// Stable identifier for a cached email, derived from (account, folder, remote UID).
pub fn email_id(account_id: u64, folder_id: u64, uid: u32) -> u64 {
    let mut buffer = Vec::with_capacity(8 + 8 + 4);
    buffer.extend_from_slice(&account_id.to_be_bytes());
    buffer.extend_from_slice(&folder_id.to_be_bytes());
    buffer.extend_from_slice(&uid.to_be_bytes());
    let mut cursor = std::io::Cursor::new(buffer);
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    hash as u64
}

pub(crate) fn generate_token_impl(bit_strength: usize) -> String {
    let byte_length = (bit_strength + 23) / 24 * 3;
    let random_bytes: Vec<u8> = (0..byte_length).map(|_| rand::random::<u8>()).collect();
    let mut encoded = general_purpose::URL_SAFE.encode(&random_bytes);

    encoded = encoded
        .chars()
        .map(|c| {
            if c == '/' || c == '+' || c == '-' || c == '_' {
                make_single_random_char()
            } else {
                c
            }
        })
        .collect();

    encoded
}

fn make_single_random_char() -> char {
    let charset = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let idx = rng().random_range(0..charset.len());
    charset[idx] as char
}
