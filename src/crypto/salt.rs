//! Salt-parameter encoding for the bcrypt setting string
//! (`$2y$<cost>$<22 salt chars>`).

use base64::{engine::general_purpose::STANDARD, Engine};

/// Bytes of entropy drawn for every salt.
pub const SALT_LENGTH: usize = 16;

/// Salt characters the bcrypt setting carries.
pub const ENCODED_SALT_LENGTH: usize = 22;

/// Algorithm tag for the corrected Blowfish variant.
pub const ALGORITHM_TAG: &str = "2y";

/// Encodes salt bytes as standard base64 cut to 22 characters, with `+`
/// swapped for `.` so every character lands in the bcrypt alphabet.
pub fn encode_salt(salt: &[u8]) -> String {
    let mut encoded = STANDARD.encode(salt);
    encoded.truncate(ENCODED_SALT_LENGTH);
    encoded.replace('+', ".")
}

/// Builds the setting string handed to the crypt primitive.
pub fn setting(cost: u32, salt: &[u8]) -> String {
    format!("${}${:02}${}", ALGORITHM_TAG, cost, encode_salt(salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_bcrypt_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '.' || c == '/'
    }

    #[test]
    fn encodes_sequential_salt() {
        let salt: Vec<u8> = (0u8..16).collect();
        assert_eq!(encode_salt(&salt), "AAECAwQFBgcICQoLDA0ODw");
    }

    #[test]
    fn replaces_plus_with_dot() {
        let mut salt = [0xfbu8, 0xef, 0xbe].repeat(5);
        salt.push(0xff);
        assert_eq!(encode_salt(&salt), "..................../w");
    }

    #[test]
    fn pads_cost_to_two_digits() {
        let salt = [0u8; SALT_LENGTH];
        assert_eq!(setting(4, &salt), "$2y$04$AAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(setting(31, &salt), "$2y$31$AAAAAAAAAAAAAAAAAAAAAA");
    }

    #[test]
    fn setting_has_bcrypt_shape_for_random_salts() {
        for _ in 0..32 {
            let salt: [u8; SALT_LENGTH] = rand::random();
            let value = setting(10, &salt);
            assert!(value.starts_with("$2y$10$"));
            let encoded = &value["$2y$10$".len()..];
            assert_eq!(encoded.len(), ENCODED_SALT_LENGTH);
            assert!(encoded.chars().all(is_bcrypt_char), "bad salt chars: {encoded}");
        }
    }
}
