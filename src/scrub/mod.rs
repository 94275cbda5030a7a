// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

pub mod anonymizer;
pub mod cache;
pub mod generator;
pub mod synonyms;
pub mod tags;

pub use anonymizer::{AnonymizeMode, Anonymizer};
pub use cache::SyntheticCache;
pub use generator::{FakeGenerator, ValueGenerator};
pub use synonyms::{Category, CategoryResolver};

/// Build the anonymiser used by the CLI: built-in synonyms plus any
/// `--synonyms` files, and the word-list generator (seeded when asked).
pub fn create_anonymizer(
    synonym_files: &[String],
    seed: Option<u64>,
    mode: AnonymizeMode,
) -> anyhow::Result<Anonymizer> {
    let mut resolver = CategoryResolver::builtin();
    resolver.load_files(synonym_files)?;
    tracing::debug!(synonyms = resolver.len(), seeded = seed.is_some(), "anonymiser ready");
    let generator: Box<dyn ValueGenerator> = match seed {
        Some(seed) => Box::new(FakeGenerator::seeded(seed)),
        None => Box::new(FakeGenerator::new()),
    };
    Ok(Anonymizer::new(resolver, generator).with_mode(mode))
}
