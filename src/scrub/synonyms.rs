// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Tag-name synonym table.  Maps the local names used by the English and
//! German partner schemas onto a handful of PII categories.  The table is
//! plain data: adding a synonym never touches the traversal code.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;

/// Semantic class of a personal-data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Category {
    FirstName,
    LastName,
    Street,
    HouseNumber,
    ZipCode,
    City,
    DateOfBirth,
    Salutation,
    Country,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::FirstName => "FirstName",
            Category::LastName => "LastName",
            Category::Street => "Street",
            Category::HouseNumber => "HouseNumber",
            Category::ZipCode => "ZipCode",
            Category::City => "City",
            Category::DateOfBirth => "DateOfBirth",
            Category::Salutation => "Salutation",
            Category::Country => "Country",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Built-in synonyms, English first then German.  Keys are matched
/// case-insensitively.
const BUILTIN_SYNONYMS: &[(&str, Category)] = &[
    ("FirstName", Category::FirstName),
    ("GivenName", Category::FirstName),
    ("Forename", Category::FirstName),
    ("Vorname", Category::FirstName),
    ("LastName", Category::LastName),
    ("Surname", Category::LastName),
    ("FamilyName", Category::LastName),
    ("Nachname", Category::LastName),
    ("Familienname", Category::LastName),
    ("Street", Category::Street),
    ("StreetName", Category::Street),
    ("Strasse", Category::Street),
    ("Straße", Category::Street),
    ("HouseNumber", Category::HouseNumber),
    ("HouseNo", Category::HouseNumber),
    ("BuildingNumber", Category::HouseNumber),
    ("Hausnummer", Category::HouseNumber),
    ("ZipCode", Category::ZipCode),
    ("Zip", Category::ZipCode),
    ("PostalCode", Category::ZipCode),
    ("PostCode", Category::ZipCode),
    ("PLZ", Category::ZipCode),
    ("Postleitzahl", Category::ZipCode),
    ("City", Category::City),
    ("Town", Category::City),
    ("Ort", Category::City),
    ("Wohnort", Category::City),
    ("Stadt", Category::City),
    ("DateOfBirth", Category::DateOfBirth),
    ("BirthDate", Category::DateOfBirth),
    ("DOB", Category::DateOfBirth),
    ("Geburtsdatum", Category::DateOfBirth),
    ("Salutation", Category::Salutation),
    ("Anrede", Category::Salutation),
    ("Country", Category::Country),
    ("CountryName", Category::Country),
    ("Land", Category::Country),
];

static BUILTIN: Lazy<HashMap<String, Category>> = Lazy::new(|| {
    BUILTIN_SYNONYMS
        .iter()
        .map(|(tag, category)| (tag.to_lowercase(), *category))
        .collect()
});

/// On-disk form of an extra synonym table supplied with `--synonyms`.
#[derive(Debug, Deserialize)]
#[serde(rename = "synonyms")]
struct SynonymFile {
    #[serde(rename = "synonym", default)]
    entries: Vec<SynonymEntry>,
}

#[derive(Debug, Deserialize)]
struct SynonymEntry {
    #[serde(rename = "@tag")]
    tag: String,
    #[serde(rename = "@category")]
    category: Category,
}

/// Case-insensitive lookup from a local tag name to its category.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    table: HashMap<String, Category>,
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CategoryResolver {
    pub fn builtin() -> Self {
        Self {
            table: BUILTIN.clone(),
        }
    }

    /// Parse an XML synonym table and merge it over the current entries.
    pub fn merge_xml(&mut self, xml: &str) -> Result<usize> {
        let file: SynonymFile =
            quick_xml::de::from_str(xml).context("invalid synonym table")?;
        let added = file.entries.len();
        for entry in file.entries {
            let tag = entry.tag.trim();
            if tag.is_empty() {
                continue;
            }
            self.table.insert(tag.to_lowercase(), entry.category);
        }
        Ok(added)
    }

    /// Load and merge each synonym file in order; later files win.
    pub fn load_files(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            let xml = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            let added = self
                .merge_xml(&xml)
                .with_context(|| format!("failed to load synonyms from {path}"))?;
            tracing::debug!(path = %path, entries = added, "loaded synonym table");
        }
        Ok(())
    }

    /// Resolve a local (already normalised) tag name.
    pub fn resolve(&self, local_name: &str) -> Option<Category> {
        if local_name.is_empty() {
            return None;
        }
        if let Some(category) = self.table.get(local_name) {
            return Some(*category);
        }
        self.table.get(&local_name.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}
