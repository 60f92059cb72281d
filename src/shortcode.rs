use rand::Rng;

/// Length of a freshly generated link id.
pub const ID_LEN: usize = 6;

/// URL-safe alphabet: 64 symbols, so every character carries 6 bits.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a random 6-character link id.
///
/// Uniqueness is not checked here; the link store retries on collision.
pub fn generate() -> String {
    generate_with_len(ID_LEN)
}

/// Generate a random id of the given length from the URL-safe alphabet.
pub fn generate_with_len(len: usize) -> String {
    // thread_rng is a CSPRNG (ChaCha) reseeded from the OS.
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Return `true` if `id` could have been produced by [`generate_with_len`].
pub fn is_valid(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| ALPHABET.contains(&b))
}
