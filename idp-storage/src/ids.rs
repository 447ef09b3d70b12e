//! Random identifiers handed out alongside stored records.

use rand::{Rng, RngCore};

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Consonants only, so a typed code never spells a word and is hard to
/// misread.
const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

const ID_LEN: usize = 26;
const DEVICE_CODE_BYTES: usize = 32;
const HMAC_KEY_BYTES: usize = 32;

fn sample(rng: &mut impl Rng, alphabet: &[u8], n: usize) -> String {
    (0..n)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Lower-case alphanumeric ID that always starts with a letter.
pub fn new_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = sample(&mut rng, &ID_ALPHABET[..26], 1);
    id.push_str(&sample(&mut rng, ID_ALPHABET, ID_LEN - 1));
    id
}

/// Code shown to the user in the device flow, formatted `XXXX-XXXX`.
pub fn new_user_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = sample(&mut rng, USER_CODE_ALPHABET, 4);
    code.push('-');
    code.push_str(&sample(&mut rng, USER_CODE_ALPHABET, 4));
    code
}

/// Secret code the device polls with.
pub fn new_device_code() -> String {
    let mut buf = [0u8; DEVICE_CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Key for signing the state of an authorization request.
pub fn new_hmac_key() -> Vec<u8> {
    let mut buf = vec![0u8; HMAC_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
