use rand::Rng;

const PREFIX: &str = "APT-";
const CODE_LEN: usize = 6;
// No 0/O or 1/I, codes get read out over the phone.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Human-facing booking reference, e.g. `APT-7KQ2MX`.
pub fn generate_reference_code() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", PREFIX, code)
}

/// Canonical form for lookups: trimmed and upper-cased.
pub fn normalize_reference_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_valid_reference_code(code: &str) -> bool {
    match code.strip_prefix(PREFIX) {
        Some(rest) => rest.len() == CODE_LEN && rest.bytes().all(|b| ALPHABET.contains(&b)),
        None => false,
    }
}
