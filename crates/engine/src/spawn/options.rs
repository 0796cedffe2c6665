// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Options passed through to the spawn helper's `spawn_application` command
//! (§4.3, §6). Field ordering in the wire message matters, so the
//! application-specific k/v pairs are kept in an `IndexMap` rather than a
//! `HashMap`.

use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub app_root: String,
    /// Extra `spawn_application` k/v pairs, in the order they should be
    /// written to the wire (§6: "option k/v pairs in insertion order").
    pub extra: IndexMap<String, String>,
    pub use_global_queue: bool,
    pub pool_account_username: Option<String>,
    pub pool_account_password_base64: Option<String>,
}

impl SpawnOptions {
    pub fn new(app_root: impl Into<String>) -> Self {
        Self {
            app_root: app_root.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_global_queue(mut self, enabled: bool) -> Self {
        self.use_global_queue = enabled;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ReloadOptions {
    pub group_name: String,
}
