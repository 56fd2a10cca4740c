//! Strings whose length is described by another field rather than a
//! terminator, as used throughout SMB2 and NTLMSSP buffers.

use binrw::io::Write;
use binrw::{prelude::*, Endian};
use core::fmt::{self, Write as _};
use std::{io::prelude::*, string::FromUtf16Error};

/// A string of `T`-sized characters, read by an explicit byte size passed as
/// an argument, and written back-to-back with no terminator.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct BaseSizedString<T> {
    data: Vec<T>,
}

impl<T> BaseSizedString<T> {
    const CHAR_WIDTH: u64 = std::mem::size_of::<T>() as u64;

    /// Size of the string's data, in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64 * Self::CHAR_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> BinRead for BaseSizedString<T>
where
    T: BinRead,
    T::Args<'static>: Default,
{
    type Args<'a> = (u64,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        size_bytes: Self::Args<'_>,
    ) -> BinResult<Self> {
        if size_bytes.0 % Self::CHAR_WIDTH != 0 {
            return Err(binrw::Error::AssertFail {
                pos: reader.stream_position()?,
                message: "string size is not a multiple of the character width".to_string(),
            });
        }
        let size_chars = size_bytes.0 / Self::CHAR_WIDTH;

        let mut values = Vec::with_capacity(size_chars as usize);
        for _ in 0..size_chars {
            values.push(<T>::read_options(reader, endian, Default::default())?);
        }
        Ok(Self { data: values })
    }
}

impl<T> BinWrite for BaseSizedString<T>
where
    T: BinWrite + 'static,
    for<'a> T::Args<'a>: Clone,
{
    type Args<'a> = T::Args<'a>;

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.data.write_options(writer, endian, args)
    }
}

impl<T> core::ops::Deref for BaseSizedString<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// A sized ANSI (single-byte) string — the NTLMSSP Type 1 field encoding.
pub type SizedAnsiString = BaseSizedString<u8>;

impl From<&str> for SizedAnsiString {
    fn from(s: &str) -> Self {
        debug_assert!(s.is_ascii());
        Self {
            data: s.bytes().collect(),
        }
    }
}

impl TryFrom<SizedAnsiString> for String {
    type Error = std::string::FromUtf8Error;

    fn try_from(value: SizedAnsiString) -> Result<Self, Self::Error> {
        String::from_utf8(value.data)
    }
}

impl fmt::Display for SizedAnsiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data
            .iter()
            .flat_map(|&b| char::from_u32(b as u32))
            .try_for_each(|c| f.write_char(c))
    }
}

impl fmt::Debug for SizedAnsiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SizedAnsiString(\"{}\")", self)
    }
}

/// A sized wide (UTF-16LE) string — the default SMB2 string encoding.
pub type SizedWideString = BaseSizedString<u16>;

impl From<&str> for SizedWideString {
    fn from(s: &str) -> Self {
        Self {
            data: s.encode_utf16().collect(),
        }
    }
}

impl From<String> for SizedWideString {
    fn from(s: String) -> Self {
        Self {
            data: s.encode_utf16().collect(),
        }
    }
}

impl TryFrom<SizedWideString> for String {
    type Error = FromUtf16Error;

    fn try_from(value: SizedWideString) -> Result<Self, Self::Error> {
        String::from_utf16(&value.data)
    }
}

impl fmt::Display for SizedWideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        char::decode_utf16(self.data.iter().copied())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .try_for_each(|c| f.write_char(c))
    }
}

impl fmt::Debug for SizedWideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SizedWideString(\"{}\")", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_wide_string_write() {
        let s = SizedWideString::from("ab\\c");
        let mut buf = Vec::new();
        s.write_le(&mut Cursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [b'a', 0, b'b', 0, b'\\', 0, b'c', 0]);
        assert_eq!(s.size(), 8);
    }

    #[test]
    fn test_wide_string_read_by_size() {
        let data = [b'h', 0, b'i', 0, 0xff, 0xff];
        let s = SizedWideString::read_le_args(&mut Cursor::new(&data), (4,)).unwrap();
        assert_eq!(String::try_from(s).unwrap(), "hi");
    }

    #[test]
    fn test_ansi_string_roundtrip() {
        let s = SizedAnsiString::from("WORKSTATION");
        let mut buf = Vec::new();
        s.write_le(&mut Cursor::new(&mut buf)).unwrap();
        assert_eq!(buf, b"WORKSTATION");
        let parsed =
            SizedAnsiString::read_le_args(&mut Cursor::new(&buf), (buf.len() as u64,)).unwrap();
        assert_eq!(parsed, s);
    }
}
