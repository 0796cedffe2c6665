// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_id_displays_as_inner_string() {
    let id = WorkerId::new("w-1");
    assert_eq!(id.as_str(), "w-1");
    assert_eq!(id.to_string(), "w-1");
}

#[test]
fn worker_id_compares_against_str() {
    let id = WorkerId::new("w-1");
    assert_eq!(id, "w-1");
    assert_ne!(id, "w-2");
}

#[test]
fn group_name_from_string_round_trips() {
    let name: GroupName = "/srv/app".to_string().into();
    assert_eq!(name.as_str(), "/srv/app");
}
