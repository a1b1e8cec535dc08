//! Random secrets and identifiers for first-launch secret generation.
//!
//! Secrets back a container-local database password and an internal signing
//! key, never a public-facing credential. The requirement is "hard to guess by
//! casual inspection"; callers must not rely on these for anything stronger.
//! (The default generator happens to be seeded from OS entropy.)

use chord_schema::{keys, ConfigVars};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// The 36-symbol lowercase alphanumeric alphabet secrets are drawn from.
pub const SECRET_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const SECRET_LENGTH: usize = 64;

pub struct SecretGenerator {
    rng: Mutex<StdRng>,
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl SecretGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic generator, for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Sample `length` characters uniformly from [`SECRET_ALPHABET`].
    pub fn generate_secret(&self, length: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..length)
            .map(|_| char::from(SECRET_ALPHABET[rng.gen_range(0..SECRET_ALPHABET.len())]))
            .collect()
    }

    /// A random (version 4) UUID in hyphenated form.
    pub fn generate_identifier(&self) -> String {
        let mut bytes = [0u8; 16];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string()
    }

    /// The secret record created the first time an artifact is launched.
    pub fn secret_record(&self) -> ConfigVars {
        let mut record = ConfigVars::new();
        record.insert(
            keys::POSTGRES_PASSWORD.to_owned(),
            self.generate_secret(SECRET_LENGTH),
        );
        record.insert(
            keys::SERVICE_SECRET_KEY.to_owned(),
            self.generate_secret(SECRET_LENGTH),
        );
        record.insert(keys::SERVICE_ID.to_owned(), self.generate_identifier());
        record
    }
}
