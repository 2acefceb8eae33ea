//! Random password generation

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Longest password the generator produces
pub const MAX_PASSWORD_LENGTH: usize = 1024;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.?";

/// Generate a random password containing at least one character of each class.
///
/// Lengths below the number of classes are raised to that minimum; lengths
/// above [`MAX_PASSWORD_LENGTH`] are lowered to it.
pub fn generate_password(length: usize) -> String {
    let classes = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];
    let length = length.clamp(classes.len(), MAX_PASSWORD_LENGTH);
    let mut rng = OsRng;

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();

    let all: Vec<u8> = classes.concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}
