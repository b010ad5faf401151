//! TLS ClientHello Signal
//!
//! JA3-style string: `version,ciphers,extensions,curves,point_formats`,
//! each list `-` joined with GREASE values removed. Hashed with SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// RFC 8701 GREASE values: 0x?a?a with equal bytes
pub fn is_grease(value: u16) -> bool {
    (value & 0x0f0f) == 0x0a0a && (value >> 8) == (value & 0xff)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientHelloRecord {
    pub version: u16,
    pub ciphers: Vec<u16>,
    pub extensions: Vec<u16>,
    pub curves: Vec<u16>,
    pub point_formats: Vec<u8>,
}

impl ClientHelloRecord {
    pub fn ja3_string(&self) -> String {
        fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
            values.map(|v| v.to_string()).collect::<Vec<_>>().join("-")
        }
        let strip = |list: &[u16]| join(list.iter().copied().filter(|v| !is_grease(*v)));

        format!(
            "{},{},{},{},{}",
            self.version,
            strip(&self.ciphers),
            strip(&self.extensions),
            strip(&self.curves),
            join(self.point_formats.iter()),
        )
    }

    pub fn ja3_hash(&self) -> String {
        hex::encode(Sha256::digest(self.ja3_string().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientHelloRecord {
        ClientHelloRecord {
            version: 771,
            ciphers: vec![0x1a1a, 4865, 4866, 4867],
            extensions: vec![0x2a2a, 0, 23, 65281, 10, 11],
            curves: vec![0xfafa, 29, 23, 24],
            point_formats: vec![0],
        }
    }

    #[test]
    fn test_grease_detection() {
        for v in [0x0a0a, 0x1a1a, 0x5a5a, 0xfafa] {
            assert!(is_grease(v), "{:#x}", v);
        }
        for v in [0x0a1a, 0x1301, 0x0000, 0xff01] {
            assert!(!is_grease(v), "{:#x}", v);
        }
    }

    #[test]
    fn test_ja3_string_strips_grease() {
        assert_eq!(sample().ja3_string(), "771,4865-4866-4867,0-23-65281-10-11,29-23-24,0");
    }

    #[test]
    fn test_grease_does_not_change_hash() {
        let mut rotated = sample();
        rotated.ciphers[0] = 0x3a3a;
        rotated.extensions[0] = 0x9a9a;
        assert_eq!(sample().ja3_hash(), rotated.ja3_hash());
        assert_eq!(sample().ja3_hash().len(), 64);
    }

    #[test]
    fn test_empty_record() {
        assert_eq!(ClientHelloRecord::default().ja3_string(), "0,,,,");
    }
}
