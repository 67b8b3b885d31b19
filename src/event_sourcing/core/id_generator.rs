use rand::Rng;
use uuid::Uuid;

// ============================================================================
// Aggregate Identity Generation
// ============================================================================

/// Alphabet used when an aggregate mints its own identity.
pub const DEFAULT_ID_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of identities minted with [`DEFAULT_ID_ALPHABET`].
pub const DEFAULT_ID_SIZE: usize = 64;

/// Mints aggregate identities.
///
/// Implementations may ignore `alphabet` and `size` when they produce a fixed
/// format (see [`UuidGenerator`]).
pub trait IdGenerator: Send + Sync {
    fn generate(&self, alphabet: &str, size: usize) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn(&str, usize) -> String + Send + Sync,
{
    fn generate(&self, alphabet: &str, size: usize) -> String {
        self(alphabet, size)
    }
}

/// Hyphenated v4 UUIDs, always 36 characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, _alphabet: &str, _size: usize) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Random strings of exactly `size` characters drawn from `alphabet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlphabetGenerator;

impl IdGenerator for AlphabetGenerator {
    fn generate(&self, alphabet: &str, size: usize) -> String {
        let chars: Vec<char> = alphabet.chars().collect();
        if chars.is_empty() {
            tracing::warn!(size, "empty alphabet, generated an empty identity");
            return String::new();
        }

        let mut rng = rand::rng();
        (0..size).map(|_| chars[rng.random_range(0..chars.len())]).collect()
    }
}
