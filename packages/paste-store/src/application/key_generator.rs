//! Document key generation

use rand::Rng;

use crate::error::{Result, StoreError};

/// Lowercase letters and digits without the look-alikes `0 o 1 l i`
pub const DEFAULT_ALPHABET: &str = "abcdefghjkmnpqrstuvwxyz23456789";

/// Source of candidate document keys
pub trait KeyGenerator: Send + Sync {
    /// Exactly `length` characters from the generator's alphabet
    fn create_key(&self, length: usize) -> String;
}

/// Uniform random keys over a fixed alphabet
#[derive(Debug, Clone)]
pub struct RandomKeyGenerator {
    alphabet: Vec<char>,
}

impl RandomKeyGenerator {
    pub fn new() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
        }
    }

    pub fn with_alphabet(alphabet: &str) -> Result<Self> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(StoreError::config("key alphabet must not be empty"));
        }
        Ok(Self { alphabet })
    }

    /// Number of distinct keys of `length` characters (saturating)
    pub fn keyspace(&self, length: usize) -> u128 {
        let base = self.alphabet.len() as u128;
        (0..length).fold(1u128, |acc, _| acc.saturating_mul(base))
    }
}

impl Default for RandomKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn create_key(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}
