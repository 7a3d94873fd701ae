use std::io;

use rand::rngs::OsRng;
use rand::TryRngCore;

/// Hex encoded random token of `len` bytes from the OS random source, used as
/// the `multipart/byteranges` boundary. `random_token(6)` yields 12 characters.
pub fn random_token(len: usize) -> io::Result<String> {
    let mut bytes = vec![0; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(io::Error::other)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::random_token;

    #[test]
    fn test_token_is_printable_hex() {
        let token = random_token(6).unwrap();
        assert_eq!(12, token.len());
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(random_token(16).unwrap(), random_token(16).unwrap());
    }
}
