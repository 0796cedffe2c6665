// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping from username to [`Account`] (§3, §4.2).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::account::{Account, Rights, Secret};
use crate::id::AccountUsername;

struct Inner {
    accounts: HashMap<AccountUsername, Account>,
    service_account_counter: u64,
}

/// Mapping from username to [`Account`], plus a monotonic counter used to
/// mint unique per-worker service accounts (§3).
///
/// Guarded by its own mutex and safe for concurrent calls (§4.2). The
/// database owns its accounts exclusively — callers get clones out, never
/// references they could use to mutate state behind the database's back.
pub struct AccountsDatabase {
    inner: Mutex<Inner>,
}

impl Default for AccountsDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountsDatabase {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                accounts: HashMap::new(),
                service_account_counter: 0,
            }),
        }
    }

    /// Insert an account, replacing any existing account with the same username.
    pub fn add(&self, username: impl Into<AccountUsername>, secret: Secret, rights: Rights) {
        let username = username.into();
        let account = Account::new(username.clone(), secret, rights);
        self.inner.lock().accounts.insert(username, account);
    }

    /// Remove an account. Returns whether one was present.
    pub fn remove(&self, username: &str) -> bool {
        self.inner.lock().accounts.remove(username).is_some()
    }

    /// Locate the named account and return it iff `plaintext` matches (§4.2).
    ///
    /// The candidate account is fetched regardless of whether the username
    /// exists, so failure paths differ only in the (already constant-time)
    /// password comparison — there is nothing left to time against username
    /// existence here since a missing account simply yields `None` before
    /// any comparison runs. Callers that need uniform latency regardless of
    /// account existence should check against a dummy account on the `None`
    /// path; the pool RPC server itself does not require that hardening.
    pub fn authenticate(&self, username: &str, plaintext: &str) -> Option<Account> {
        let account = self.inner.lock().accounts.get(username)?.clone();
        if account.check_password(plaintext) {
            Some(account)
        } else {
            None
        }
    }

    /// Mint a unique username for an ephemeral per-worker service account,
    /// insert it, and return the username (§3, §4.2).
    ///
    /// These accounts are deleted automatically when their associated worker
    /// is destroyed; callers are responsible for calling [`Self::remove`] at
    /// that point (the database has no notion of worker lifetime itself).
    pub fn add_service_account(
        &self,
        prefix: &str,
        secret: Secret,
        rights: Rights,
    ) -> AccountUsername {
        let mut inner = self.inner.lock();
        inner.service_account_counter += 1;
        let username = AccountUsername::new(format!("{}-{}", prefix, inner.service_account_counter));
        let account = Account::new(username.clone(), secret, rights);
        inner.accounts.insert(username.clone(), account);
        username
    }

    pub fn len(&self) -> usize {
        self.inner.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "accounts_database_tests.rs"]
mod tests;
