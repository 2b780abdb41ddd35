//! Candidate password generation.
//!
//! Passwords are drawn from the OS random source. The alphabet excludes
//! quotes, backslash, backtick, slash, `@`, `$` and whitespace, so a
//! generated password embeds in a `'...'` literal unchanged.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::RotationConfig;
use crate::errors::{Result, RotationError};
use crate::secrets::SecretString;

pub const MIN_PASSWORD_LENGTH: usize = 16;
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;
pub const MAX_PASSWORD_LENGTH: usize = 128;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const PUNCTUATION: &[u8] = b"!#%&()*+,-.:;<=>?[]^_{|}~";

const CLASSES: [&[u8]; 4] = [UPPERCASE, LOWERCASE, DIGITS, PUNCTUATION];

/// Whether `c` belongs to the generator's alphabet
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii() && CLASSES.iter().any(|class| class.contains(&(c as u8)))
}

/// Check a value against the generator's guarantees.
pub fn is_valid_password(password: &str, require_each_class: bool) -> bool {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return false;
    }
    if !password.chars().all(is_allowed_char) {
        return false;
    }
    !require_each_class
        || CLASSES.iter().all(|class| password.bytes().any(|b| class.contains(&b)))
}

/// Generates passwords according to a fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct PasswordGenerator {
    length: usize,
    require_each_class: bool,
}

impl Default for PasswordGenerator {
    fn default() -> Self {
        Self { length: DEFAULT_PASSWORD_LENGTH, require_each_class: true }
    }
}

impl PasswordGenerator {
    pub fn new(length: usize, require_each_class: bool) -> Result<Self> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(RotationError::config(format!(
                "Password length must be between {} and {} (got {})",
                MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH, length
            )));
        }
        Ok(Self { length, require_each_class })
    }

    pub fn from_config(config: &RotationConfig) -> Result<Self> {
        Self::new(config.password_length, config.require_each_character_class)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> SecretString {
        let mut rng = OsRng;
        let alphabet: Vec<u8> = CLASSES.concat();

        let mut bytes: Vec<u8> = Vec::with_capacity(self.length);
        if self.require_each_class {
            for class in CLASSES {
                bytes.push(class[rng.gen_range(0..class.len())]);
            }
        }
        while bytes.len() < self.length {
            bytes.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        bytes.shuffle(&mut rng);

        let password: String = bytes.iter().map(|&b| b as char).collect();
        SecretString::new(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::quote_literal;

    #[test]
    fn test_default_password_satisfies_policy() {
        let password = PasswordGenerator::default().generate();
        assert_eq!(password.len(), DEFAULT_PASSWORD_LENGTH);
        assert!(is_valid_password(password.expose_secret(), true));
    }

    #[test]
    fn test_length_bounds() {
        assert!(PasswordGenerator::new(15, true).is_err());
        assert!(PasswordGenerator::new(129, true).is_err());
        assert_eq!(PasswordGenerator::new(16, true).unwrap().generate().len(), 16);
        assert_eq!(PasswordGenerator::new(128, false).unwrap().generate().len(), 128);
    }

    #[test]
    fn test_alphabet_needs_no_escaping() {
        for c in CLASSES.concat() {
            let c = c as char;
            assert!(!"'\"\\`/@$ ".contains(c), "unsafe character {:?} in alphabet", c);
        }
        let password = PasswordGenerator::default().generate();
        assert_eq!(
            quote_literal(password.expose_secret()).unwrap(),
            format!("'{}'", password.expose_secret())
        );
    }

    #[test]
    fn test_consecutive_passwords_differ() {
        let generator = PasswordGenerator::default();
        assert_ne!(generator.generate(), generator.generate());
    }

    #[test]
    fn test_is_valid_password() {
        assert!(!is_valid_password("short", false));
        assert!(!is_valid_password("abcdefghijklmnop'", false));
        assert!(is_valid_password("abcdefghijklmnop", false));
        assert!(!is_valid_password("abcdefghijklmnop", true));
        assert!(is_valid_password("Abcdefghijklmn0!", true));
    }
}
