//! Password hashing and one-time secrets.
//!
//! Passwords are stored as `sha256$<iterations>$<salt>$<hash>` with a random
//! 16-byte salt. Session tokens, reset tokens and OTPs are only ever stored
//! as digests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const ITERATIONS: u32 = 10_000;

pub const OTP_LENGTH: usize = 6;

pub fn hash_password(password: &SecretString) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = URL_SAFE_NO_PAD.encode(salt);
    let hash = stretch(password.expose_secret(), &salt, ITERATIONS);
    format!("{SCHEME}${ITERATIONS}${salt}${hash}")
}

pub fn verify_password(password: &SecretString, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let actual = stretch(password.expose_secret(), salt, iterations);
    constant_time_eq(actual.as_bytes(), expected.as_bytes())
}

fn stretch(password: &str, salt: &str, iterations: u32) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }
    URL_SAFE_NO_PAD.encode(digest)
}

/// Random 32-byte token, base64url (43 chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Zero-padded numeric one-time password.
pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:0width$}", width = OTP_LENGTH)
}

/// Digest used to store tokens and OTPs at rest.
pub fn digest(secret: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(secret.as_bytes()))
}

pub fn digest_matches(secret: &str, stored: &str) -> bool {
    constant_time_eq(digest(secret).as_bytes(), stored.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn password_roundtrip() {
        let encoded = hash_password(&secret("correct horse"));
        assert!(encoded.starts_with("sha256$10000$"));
        assert!(verify_password(&secret("correct horse"), &encoded));
        assert!(!verify_password(&secret("wrong horse"), &encoded));
    }

    #[test]
    fn same_password_different_salt() {
        let a = hash_password(&secret("password1"));
        let b = hash_password(&secret("password1"));
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password(&secret("x"), ""));
        assert!(!verify_password(&secret("x"), "md5$1$a$b"));
        assert!(!verify_password(&secret("x"), "sha256$abc$a$b"));
        assert!(!verify_password(&secret("x"), "sha256$1$a$b$c"));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let otp = generate_otp();
            assert_eq!(otp.len(), OTP_LENGTH);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn token_is_url_safe() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn digest_comparison() {
        let stored = digest("123456");
        assert!(digest_matches("123456", &stored));
        assert!(!digest_matches("123457", &stored));
    }
}
