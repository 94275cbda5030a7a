// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Real → synthetic value mapping.  Replacements stay stable for the
//! lifetime of the process so the same customer reads the same everywhere in
//! a run, across fragments and across input files.

use crate::scrub::{Category, ValueGenerator};
use std::collections::HashMap;
use std::sync::Mutex;

/// Written in place of a value when the generator cannot supply one.  The
/// real value is never an acceptable fallback.
pub const PLACEHOLDER: &str = "REDACTED";

/// How many times to re-ask the generator when it happens to hand back the
/// real value.
const MAX_ATTEMPTS: usize = 8;

/// Mapping shared by every fragment of one invocation.  The lock is held
/// across the generator call so a pair is only ever generated once, even
/// with `--parallel`.
#[derive(Default)]
pub struct SyntheticCache {
    entries: Mutex<HashMap<(Category, String), String>>,
}

impl SyntheticCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the synthetic value for `real`, generating and storing one the
    /// first time this category/value pair is seen.
    pub fn get_or_create(
        &self,
        category: Category,
        real: &str,
        generator: &dyn ValueGenerator,
    ) -> String {
        let key = (category, real.trim().to_string());
        let mut entries = self.entries.lock().expect("synthetic cache mutex poisoned");

        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }

        let Some(value) = fresh_value(category, &key.1, generator) else {
            // Not stored: a later call may still get a real fake.
            return PLACEHOLDER.to_string();
        };
        tracing::debug!(%category, "generated synthetic value");
        entries.insert(key, value.clone());
        value
    }

    /// Number of distinct real values mapped so far.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("synthetic cache mutex poisoned")
            .len()
    }

}

/// Ask the generator for a value that differs from the real one.  `None`
/// means the generator failed or kept echoing the input.
fn fresh_value(category: Category, real: &str, generator: &dyn ValueGenerator) -> Option<String> {
    for _ in 0..MAX_ATTEMPTS {
        match generator.generate(category) {
            Ok(value) if value.trim().eq_ignore_ascii_case(real) => continue,
            Ok(value) if value.trim().is_empty() => continue,
            Ok(value) => return Some(value),
            Err(err) => {
                tracing::warn!(%category, error = %err, "generator failed, using placeholder");
                return None;
            }
        }
    }
    tracing::warn!(%category, "generator kept returning the real value, using placeholder");
    None
}
