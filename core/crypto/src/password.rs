//! Random password generation under character-class constraints.
//!
//! Candidates are drawn from the OS CSPRNG only. When a class is enabled,
//! the output is guaranteed to contain at least one character from it.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use keyhaven_common::{Error, Result};

/// Minimum accepted password length.
pub const MIN_LENGTH: usize = 8;

/// Maximum accepted password length.
pub const MAX_LENGTH: usize = 128;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{};:,.?/";

/// Characters easily confused with one another when read or transcribed.
const AMBIGUOUS: &str = "Il1O0";

/// Requested password shape. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub length: usize,
    pub upper: bool,
    pub lower: bool,
    pub digits: bool,
    pub symbols: bool,
    pub avoid_ambiguous: bool,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            length: 20,
            upper: true,
            lower: true,
            digits: true,
            symbols: true,
            avoid_ambiguous: true,
        }
    }
}

fn pool(chars: &str, avoid_ambiguous: bool) -> Vec<char> {
    chars
        .chars()
        .filter(|c| !(avoid_ambiguous && AMBIGUOUS.contains(*c)))
        .collect()
}

/// Generate a random password matching the request.
///
/// The output has exactly `length` characters drawn from the union of the
/// enabled classes, with at least one character from each enabled class.
///
/// # Errors
/// - `Validation` if `length` is outside 8..=128
/// - `Validation` if no character class is enabled
pub fn generate(request: &GenerationRequest) -> Result<String> {
    if request.length < MIN_LENGTH || request.length > MAX_LENGTH {
        return Err(Error::Validation(format!(
            "length must be between {} and {}",
            MIN_LENGTH, MAX_LENGTH
        )));
    }

    let mut pools: Vec<Vec<char>> = Vec::new();
    if request.upper {
        pools.push(pool(UPPER, request.avoid_ambiguous));
    }
    if request.lower {
        pools.push(pool(LOWER, request.avoid_ambiguous));
    }
    if request.digits {
        pools.push(pool(DIGITS, request.avoid_ambiguous));
    }
    if request.symbols {
        // Symbol glyphs are distinct enough; ambiguity exclusion does not
        // apply to them.
        pools.push(SYMBOLS.chars().collect());
    }

    let union: Vec<char> = pools.iter().flatten().copied().collect();
    if union.is_empty() {
        return Err(Error::Validation(
            "at least one character class must be enabled".to_string(),
        ));
    }

    let mut rng = OsRng;

    // One guaranteed character per enabled class, then fill from the union.
    let mut chars: Vec<char> = Vec::with_capacity(request.length);
    for p in &pools {
        if let Some(c) = p.choose(&mut rng) {
            chars.push(*c);
        }
    }
    while chars.len() < request.length {
        if let Some(c) = union.choose(&mut rng) {
            chars.push(*c);
        }
    }

    chars.shuffle(&mut rng);
    chars.truncate(request.length);

    Ok(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(length: usize, upper: bool, lower: bool, digits: bool, symbols: bool) -> GenerationRequest {
        GenerationRequest {
            length,
            upper,
            lower,
            digits,
            symbols,
            avoid_ambiguous: false,
        }
    }

    #[test]
    fn test_exact_length() {
        for length in [MIN_LENGTH, 20, 64, MAX_LENGTH] {
            let password = generate(&request(length, true, true, true, true)).unwrap();
            assert_eq!(password.chars().count(), length);
        }
    }

    #[test]
    fn test_lowercase_only() {
        let password = generate(&request(20, false, true, false, false)).unwrap();

        assert_eq!(password.len(), 20);
        assert!(password.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_each_enabled_class_present() {
        // Long enough that a missing guaranteed class would be a bug, not
        // bad luck.
        let password = generate(&request(32, true, true, true, true)).unwrap();

        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| SYMBOLS.contains(c)));
    }

    #[test]
    fn test_no_class_enabled_fails() {
        assert!(matches!(
            generate(&request(20, false, false, false, false)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_length_bounds() {
        assert!(generate(&request(MIN_LENGTH - 1, true, true, true, true)).is_err());
        assert!(generate(&request(MAX_LENGTH + 1, true, true, true, true)).is_err());
    }

    #[test]
    fn test_ambiguous_excluded() {
        let req = GenerationRequest {
            length: MAX_LENGTH,
            symbols: false,
            ..GenerationRequest::default()
        };

        for _ in 0..8 {
            let password = generate(&req).unwrap();
            assert!(
                password.chars().all(|c| !AMBIGUOUS.contains(c)),
                "ambiguous character in {:?}",
                password
            );
        }
    }

    #[test]
    fn test_outputs_differ() {
        let req = GenerationRequest::default();

        let a = generate(&req).unwrap();
        let b = generate(&req).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_request_defaults_from_empty_payload() {
        let req: GenerationRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(req.length, 20);
        assert!(req.upper && req.lower && req.digits && req.symbols);
        assert!(req.avoid_ambiguous);
    }
}
