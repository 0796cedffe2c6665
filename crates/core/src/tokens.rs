// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Random token generation for detach keys, connect passwords, and the
//! spawn helper's per-instance password (§4.3, §6).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::id::{ConnectPassword, DetachKey};

/// Generate `n` cryptographically random bytes, base64url-encoded (no padding).
fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A fresh 43-character detach key (32 random bytes, base64url-encoded).
pub fn generate_detach_key() -> DetachKey {
    DetachKey(random_token(32))
}

/// A fresh 43-character connect password (32 random bytes, base64url-encoded).
pub fn generate_connect_password() -> ConnectPassword {
    ConnectPassword(random_token(32))
}

/// A fresh spawn-helper password: 32 random bytes, base64-encoded (§4.3).
pub fn generate_helper_password() -> String {
    random_token(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detach_keys_are_43_chars_and_unique() {
        let a = generate_detach_key();
        let b = generate_detach_key();
        assert_eq!(a.0.len(), 43);
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn connect_passwords_are_43_chars() {
        let p = generate_connect_password();
        assert_eq!(p.0.len(), 43);
    }
}
