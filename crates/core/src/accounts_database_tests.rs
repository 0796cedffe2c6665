// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn authenticate_succeeds_with_correct_password() {
    let db = AccountsDatabase::new();
    db.add("ops", Secret::Cleartext("pw".to_string()), Rights::GET);
    let account = db.authenticate("ops", "pw").expect("should authenticate");
    assert_eq!(account.username().as_str(), "ops");
}

#[test]
fn authenticate_fails_with_wrong_password_or_unknown_user() {
    let db = AccountsDatabase::new();
    db.add("ops", Secret::Cleartext("pw".to_string()), Rights::GET);
    assert!(db.authenticate("ops", "wrong").is_none());
    assert!(db.authenticate("ghost", "pw").is_none());
}

#[test]
fn remove_is_idempotent() {
    let db = AccountsDatabase::new();
    db.add("ops", Secret::Cleartext("pw".to_string()), Rights::GET);
    assert!(db.remove("ops"));
    assert!(!db.remove("ops"));
}

#[test]
fn service_account_usernames_are_unique_and_prefixed() {
    let db = AccountsDatabase::new();
    let a = db.add_service_account("w-1", Secret::Cleartext("x".to_string()), Rights::GET);
    let b = db.add_service_account("w-1", Secret::Cleartext("y".to_string()), Rights::GET);
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("w-1-"));
    assert_eq!(db.len(), 2);
}
