use rand::Rng;

pub const ROOM_CODE_LEN: usize = 6;

// Caller retries on collision against the live room table under the global lock; this
// function has no visibility into that table.
pub fn generate_room_code() -> String {
    let mut raw = [0_u8; 3];
    rand::rng().fill(&mut raw);
    hex::encode_upper(raw)
}

pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// Used only for sanity-checking server-generated codes in tests; client-supplied codes
// are looked up as-is after normalization and a missing room is "not found" rather than
// "malformed".
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_lowercase())
}
