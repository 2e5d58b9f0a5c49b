//! Obfuscation of the generated source at rest.
//!
//! Every byte is XORed with a fixed 256-entry key stream indexed by its
//! position, so the transform is its own inverse and works on any length.

/// Key stream, filled by a linear congruential generator at compile time.
pub static KEY_TABLE: [u8; 256] = build_key_table();

const fn build_key_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut state: u32 = 0x2545_F491;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        table[i] = (state >> 24) as u8;
        i += 1;
    }
    table
}

pub fn encrypt(data: &mut [u8]) {
    for (i, b) in data.iter_mut().enumerate() {
        *b ^= KEY_TABLE[i & 0xFF];
    }
}

pub fn decrypt(data: &mut [u8]) {
    encrypt(data);
}

/// Encrypted copy of `source`.
pub fn encrypted(source: &[u8]) -> Vec<u8> {
    let mut out = source.to_vec();
    encrypt(&mut out);
    out
}

/// Decrypted copy of `data`.
pub fn decrypted(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    decrypt(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn key_stream_is_not_trivial() {
        assert!(KEY_TABLE.iter().any(|&k| k != KEY_TABLE[0]));
        let text = b"float4 Local1 = 0;";
        assert_ne!(encrypted(text), text.to_vec());
    }

    #[test]
    fn key_repeats_every_256_bytes() {
        let zeros = vec![0u8; 600];
        let e = encrypted(&zeros);
        assert_eq!(e[..256], e[256..512]);
        assert_eq!(e[3], e[259]);
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(decrypted(&encrypted(&data)), data);
        }
    }
}
