// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated identities with capability rights (§3, §4.2).

use scrypt::password_hash::rand_core::OsRng;
use scrypt::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use scrypt::Scrypt;
use subtle::ConstantTimeEq;

use crate::id::AccountUsername;

bitflags::bitflags! {
    /// Capability bits an [`Account`] may hold.
    ///
    /// Checked with bitwise AND, matching the original's `Account::hasRights`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u16 {
        const GET                     = 1 << 0;
        const CLEAR                   = 1 << 1;
        const GET_PARAMETERS          = 1 << 2;
        const SET_PARAMETERS          = 1 << 3;
        const INSPECT_BASIC_INFO      = 1 << 4;
        const INSPECT_SENSITIVE_INFO  = 1 << 5;
        const INSPECT_BACKTRACES      = 1 << 6;
        const DETACH                  = 1 << 7;
        const EXIT                    = 1 << 8;
    }
}

/// An account's secret, tagged by whether it was supplied by a human.
///
/// Invariant (§3): an account with a human-supplied secret is never compared
/// by plaintext equality — only [`Secret::Hashed`] reaches
/// [`Account::check_password`] through the hash-verification path.
#[derive(Debug, Clone)]
pub enum Secret {
    /// Generated internally; known never to have left the process.
    Cleartext(String),
    /// A password hash, produced by [`hash_secret`] from human input.
    Hashed(String),
}

impl Secret {
    fn check(&self, candidate: &str) -> bool {
        match self {
            Secret::Cleartext(expected) => constant_time_eq(expected.as_bytes(), candidate.as_bytes()),
            Secret::Hashed(hash) => verify_hash(candidate, hash),
        }
    }
}

/// Hash a human-supplied plaintext secret for storage in a [`Secret::Hashed`].
///
/// Uses `scrypt` (§9 open question: the original's `createHash` is a literal
/// "TODO bcrypt" placeholder; this picks a modern KDF as instructed).
pub fn hash_secret(plaintext: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    // scrypt's default cost parameters reject only malformed input, never the
    // hashing call itself, so this cannot fail in practice.
    match Scrypt.hash_password(plaintext.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(_) => String::new(),
    }
}

fn verify_hash(candidate: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Scrypt.verify_password(candidate.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Immutable tuple `(username, secret, rights)` (§3).
#[derive(Debug, Clone)]
pub struct Account {
    username: AccountUsername,
    secret: Secret,
    rights: Rights,
}

impl Account {
    pub fn new(username: impl Into<AccountUsername>, secret: Secret, rights: Rights) -> Self {
        Self {
            username: username.into(),
            secret,
            rights,
        }
    }

    pub fn username(&self) -> &AccountUsername {
        &self.username
    }

    pub fn rights(&self) -> Rights {
        self.rights
    }

    pub fn has_rights(&self, required: Rights) -> bool {
        self.rights.contains(required)
    }

    /// Constant-time password check (§4.2).
    pub fn check_password(&self, candidate: &str) -> bool {
        self.secret.check(candidate)
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
