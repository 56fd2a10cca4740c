use std::{fmt::Display, io::Cursor};

use binrw::prelude::*;
use rand::{rngs::OsRng, RngCore};

/// A standard, 16-byte GUID, stored in its mixed-endian wire layout.
#[derive(BinRead, BinWrite, Clone, Copy, PartialEq, Eq, Default)]
#[brw(little)]
pub struct Guid(u32, u16, u16, [u8; 8]);

impl Guid {
    /// Generates a random GUID with the RFC 4122 version-4 and variant bits
    /// set.
    pub fn gen() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        bytes[7] = (bytes[7] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self::from(&bytes)
    }
}

impl From<&[u8; 16]> for Guid {
    fn from(value: &[u8; 16]) -> Self {
        // 16-byte input always parses.
        Guid::read(&mut Cursor::new(value)).unwrap()
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.0,
            self.1,
            self.2,
            self.3[0],
            self.3[1],
            self.3[2],
            self.3[3],
            self.3[4],
            self.3[5],
            self.3[6],
            self.3[7]
        )
    }
}

impl std::fmt::Debug for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_display() {
        let guid = Guid::from(&[
            0x79, 0xbc, 0x90, 0x38, 0x0b, 0x9c, 0x1f, 0x4e, 0xaf, 0x1c, 0x0a, 0x09, 0xff, 0xc0,
            0x34, 0xb1,
        ]);
        assert_eq!(guid.to_string(), "3890bc79-9c0b-4e1f-af1c-0a09ffc034b1");
    }

    #[test]
    fn test_gen_sets_version_bits() {
        for _ in 0..16 {
            let guid = Guid::gen();
            let mut buf = Vec::new();
            guid.write(&mut Cursor::new(&mut buf)).unwrap();
            assert_eq!(buf[7] & 0xf0, 0x40, "version nibble");
            assert_eq!(buf[8] & 0xc0, 0x80, "variant bits");
        }
    }
}
