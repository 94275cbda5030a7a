// SPDX-License-Identifier: AGPL-3.0-only
// SPDX-FileCopyrightText: 2025 Steve Clarke <stephenlclarke@mac.com> - https://xyzzy.tools

//! Synthetic value generation.  The anonymiser only needs "a plausible value
//! of the right shape" per category; how that value is produced lives behind
//! the [`ValueGenerator`] trait so tests can plug in something predictable.

use crate::error::GeneratorError;
use crate::scrub::Category;
use chrono::{Duration, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Produces fake values on demand.  Implementations must tolerate concurrent
/// calls because `--parallel` shares one generator across worker threads.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, category: Category) -> Result<String, GeneratorError>;
}

const FIRST_NAMES: &[&str] = &[
    "Lukas", "Mia", "Jonas", "Emma", "Felix", "Hannah", "Paul", "Lea", "Finn", "Sophie", "Oliver",
    "Charlotte", "Henry", "Amelia", "Jack", "Isla", "Noah", "Grace", "Leon", "Marie",
];

const LAST_NAMES: &[&str] = &[
    "Müller", "Schmidt", "Schneider", "Fischer", "Weber", "Becker", "Hoffmann", "Koch", "Wagner",
    "Richter", "Smith", "Jones", "Taylor", "Brown", "Wilson", "Evans", "Walker", "Wright",
];

const STREETS: &[&str] = &[
    "Hauptstraße", "Bahnhofstraße", "Gartenweg", "Lindenallee", "Schulstraße", "Am Markt",
    "Bergstraße", "Kirchgasse", "Mill Lane", "Station Road", "Church Street", "Park Avenue",
    "Victoria Road", "High Street",
];

const CITIES: &[&str] = &[
    "Bielefeld", "Gütersloh", "Münster", "Paderborn", "Kassel", "Freiburg", "Augsburg", "Rostock",
    "Leeds", "Bristol", "Norwich", "Exeter", "York", "Bath",
];

const SALUTATIONS: &[&str] = &["Herr", "Frau", "Mr", "Mrs", "Ms", "Dr."];

const COUNTRIES: &[&str] = &[
    "Deutschland", "Österreich", "Schweiz", "Niederlande", "United Kingdom", "Ireland", "France",
    "Denmark",
];

const HOUSE_SUFFIXES: &[&str] = &["a", "b", "c"];

/// Age window for generated dates of birth, in years.
const MIN_AGE: i64 = 20;
const MAX_AGE: i64 = 70;

/// Word-list backed generator.  The RNG sits behind a mutex so the generator
/// can be shared between rayon workers.
pub struct FakeGenerator {
    rng: Mutex<StdRng>,
    today: NaiveDate,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible values for a given seed (used by `--seed` and tests).
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            today: Local::now().date_naive(),
        }
    }

    fn pick(rng: &mut StdRng, words: &[&str], category: Category) -> Result<String, GeneratorError> {
        words
            .choose(rng)
            .map(|w| (*w).to_string())
            .ok_or(GeneratorError::Exhausted(category))
    }

    fn date_of_birth(&self, rng: &mut StdRng) -> Result<String, GeneratorError> {
        let youngest = self.today - Duration::days(MIN_AGE * 365 + MIN_AGE / 4);
        let oldest = self.today - Duration::days(MAX_AGE * 365 + MAX_AGE / 4);
        let span = (youngest - oldest).num_days();
        if span <= 0 {
            return Err(GeneratorError::Exhausted(Category::DateOfBirth));
        }
        let dob = oldest + Duration::days(rng.gen_range(0..=span));
        Ok(dob.format("%Y-%m-%d").to_string())
    }
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGenerator for FakeGenerator {
    fn generate(&self, category: Category) -> Result<String, GeneratorError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| GeneratorError::Unavailable("generator mutex poisoned".to_string()))?;
        let rng = &mut *rng;
        match category {
            Category::FirstName => Self::pick(rng, FIRST_NAMES, category),
            Category::LastName => Self::pick(rng, LAST_NAMES, category),
            Category::Street => Self::pick(rng, STREETS, category),
            Category::City => Self::pick(rng, CITIES, category),
            Category::Salutation => Self::pick(rng, SALUTATIONS, category),
            Category::Country => Self::pick(rng, COUNTRIES, category),
            Category::HouseNumber => {
                let number: u32 = rng.gen_range(1..=199);
                if rng.gen_bool(0.15) {
                    let suffix = Self::pick(rng, HOUSE_SUFFIXES, category)?;
                    Ok(format!("{number}{suffix}"))
                } else {
                    Ok(number.to_string())
                }
            }
            Category::ZipCode => Ok(format!("{:05}", rng.gen_range(1067..=99998))),
            Category::DateOfBirth => self.date_of_birth(rng),
        }
    }
}
