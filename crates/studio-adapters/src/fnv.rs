// studio-adapters/src/fnv.rs
// ============================================================================
// Module: FNV-1a Hashing
// Description: 64-bit FNV-1a hash for idempotency key input signatures.
// Purpose: Derive a short, deterministic signature for image job retries.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Image generation idempotency keys fold a hash of the request's semantic
//! inputs (prompt, aspect ratio, count, reference signature) so that two
//! distinct requests never collide and a single request's retries share a
//! stable suffix. FNV-1a is a fast, allocation-free, non-cryptographic hash,
//! adequate for this purely-disambiguating role.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes the 64-bit FNV-1a hash of `input` as lowercase hex.
#[must_use]
pub fn fnv1a_hex(input: &str) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_the_offset_basis() {
        assert_eq!(fnv1a_hex(""), format!("{:016x}", FNV_OFFSET_BASIS));
    }

    #[test]
    fn distinct_inputs_hash_differently() {
        assert_ne!(fnv1a_hex("a|b|1"), fnv1a_hex("a|b|2"));
    }

    #[test]
    fn identical_inputs_hash_identically() {
        assert_eq!(fnv1a_hex("prompt|16:9|2|sig"), fnv1a_hex("prompt|16:9|2|sig"));
    }
}
