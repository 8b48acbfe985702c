use chrono::{Datelike, Utc};
use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_LEN: usize = 5;

/// `SHIP-<5 base36 chars>-<year>`, uppercase.
pub fn generate_tracking_id() -> String {
    generate_with(&mut rand::thread_rng(), Utc::now().year())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, year: i32) -> String {
    let code: String = (0..RANDOM_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("SHIP-{code}-{year}")
}
