// Copyright 2025 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

//! User configuration.
//!
//! A single JSON document with two recognized keys, `user.name` and
//! `user.email`. Free-form `ui.*` and `merge.*` entries are stored and
//! returned verbatim but never interpreted by the engine.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::RepoError;
use crate::error::RepoResult;

/// On-disk form: a flat key-to-value map.
pub type SettingsRecord = BTreeMap<String, Value>;

const RECOGNIZED_PREFIXES: &[&str] = &["user.", "ui.", "merge."];

#[derive(Clone, Debug, Default)]
pub struct UserSettings {
    values: SettingsRecord,
}

impl UserSettings {
    pub fn new(user_name: impl Into<String>, user_email: impl Into<String>) -> Self {
        let mut settings = Self::default();
        settings
            .values
            .insert("user.name".to_string(), Value::String(user_name.into()));
        settings
            .values
            .insert("user.email".to_string(), Value::String(user_email.into()));
        settings
    }

    pub fn from_record(record: SettingsRecord) -> Self {
        Self { values: record }
    }

    pub fn to_record(&self) -> SettingsRecord {
        self.values.clone()
    }

    fn string_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|value| value.as_str())
    }

    pub fn user_name(&self) -> &str {
        self.string_value("user.name").unwrap_or("")
    }

    pub fn user_email(&self) -> &str {
        self.string_value("user.email").unwrap_or("")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Sets a configuration entry. Only `user.*`, `ui.*` and `merge.*` keys
    /// are accepted.
    pub fn set(&mut self, key: &str, value: Value) -> RepoResult<()> {
        if !RECOGNIZED_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix))
        {
            return Err(RepoError::InvalidArgument {
                message: format!("Unrecognized configuration key {key:?}"),
            });
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_keys() {
        let mut settings = UserSettings::new("Alice", "alice@example.com");
        assert_eq!(settings.user_name(), "Alice");
        assert_eq!(settings.user_email(), "alice@example.com");

        settings
            .set("ui.color", Value::String("never".to_string()))
            .unwrap();
        settings.set("merge.timeout", Value::from(5000)).unwrap();
        assert_eq!(
            settings.get("ui.color"),
            Some(&Value::String("never".to_string()))
        );

        let err = settings.set("core.bare", Value::Bool(true)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_record_roundtrip() {
        let settings = UserSettings::new("Alice", "alice@example.com");
        let reloaded = UserSettings::from_record(settings.to_record());
        assert_eq!(reloaded.user_email(), "alice@example.com");
    }
}
