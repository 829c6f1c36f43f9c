//! CRC-64 class identifiers, matching the ids written by the recording agent.

const POLY64REV: u64 = 0xd800_0000_0000_0000;

const LOOKUP_TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut v = i as u64;
        let mut j = 0;
        while j < 8 {
            v = if v & 1 == 1 { (v >> 1) ^ POLY64REV } else { v >> 1 };
            j += 1;
        }
        table[i] = v;
        i += 1;
    }
    table
}

fn update(sum: u64, byte: u8) -> u64 {
    let index = ((sum ^ u64::from(byte)) & 0xff) as usize;
    (sum >> 8) ^ LOOKUP_TABLE[index]
}

/// Plain CRC-64 over a byte slice.
pub fn checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |sum, &b| update(sum, b))
}

/// Class id for raw class-file bytes.
///
/// Class files with major version 53 are hashed as if they were version 52,
/// matching ids produced by agents that rewrite early Java 9 class files.
#[allow(clippy::cast_possible_wrap)]
pub fn class_id(bytes: &[u8]) -> i64 {
    const JAVA_9: u8 = 53;
    const JAVA_8: u8 = 52;
    if bytes.len() > 7 && bytes[6] == 0x00 && bytes[7] == JAVA_9 {
        let sum = bytes[..7].iter().fold(0, |sum, &b| update(sum, b));
        let sum = update(sum, JAVA_8);
        return bytes[8..].iter().fold(sum, |sum, &b| update(sum, b)) as i64;
    }
    checksum(bytes) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn table_matches_reflected_polynomial() {
        assert_eq!(LOOKUP_TABLE[0], 0);
        assert_eq!(LOOKUP_TABLE[1], 0x01b0_0000_0000_0000);
        assert_eq!(LOOKUP_TABLE[128], POLY64REV);
    }

    #[test]
    fn single_byte() {
        assert_eq!(checksum(&[1]), 0x01b0_0000_0000_0000);
    }

    #[test]
    fn java9_hashes_like_java8() {
        let v9 = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 53, 1, 2, 3];
        let v8 = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 1, 2, 3];
        assert_eq!(class_id(&v9), class_id(&v8));
        let v11 = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 55, 1, 2, 3];
        assert_ne!(class_id(&v11), class_id(&v8));
    }
}
