//! Room share codes
//!
//! Codes are short uppercase alphanumerics. The store generates them when it
//! can; otherwise the client draws one and relies on the unique constraint.

use rand::Rng;

use crate::error::{Error, Result};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Every room code has exactly this many characters
pub const CODE_LEN: usize = 6;

/// Draw a random code
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draw a code from the thread-local generator
pub fn fresh_code() -> String {
    random_code(&mut rand::thread_rng())
}

/// Normalize user input to the stored form
pub fn normalize(input: &str) -> Result<String> {
    let code = input.trim().to_ascii_uppercase();
    if code.len() != CODE_LEN || !code.bytes().all(|b| ALPHABET.contains(&b)) {
        return Err(Error::Validation(format!(
            "room code must be {CODE_LEN} letters or digits"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = random_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" ab12cd ").unwrap(), "AB12CD");
        assert!(normalize("ab12c").is_err());
        assert!(normalize("ab12cde").is_err());
        assert!(normalize("ab-2cd").is_err());
    }
}
