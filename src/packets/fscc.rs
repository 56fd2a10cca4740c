//! File System Control Codes structures ([MS-FSCC]) used by the client:
//! attributes, access masks, directory enumeration records, change
//! notifications, and the file information classes carried by
//! QueryInfo/SetInfo.

use std::io::SeekFrom;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use super::binrw_util::prelude::*;

#[bitfield]
#[derive(BinWrite, BinRead, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct FileAttributes {
    pub readonly: bool,
    pub hidden: bool,
    pub system: bool,
    #[skip]
    __: B1,

    pub directory: bool,
    pub archive: bool,
    #[skip]
    __: B1,
    pub normal: bool,

    pub temporary: bool,
    pub sparse_file: bool,
    pub reparse_point: bool,
    pub compressed: bool,

    pub offline: bool,
    pub not_content_indexed: bool,
    pub encrypted: bool,
    pub integrity_stream: bool,

    #[skip]
    __: B1,
    pub no_scrub_data: bool,
    pub recall_on_open: bool,
    #[skip]
    __: B3,
    pub recall_on_data_access: bool,
    #[skip]
    __: B9,
}

/// File access mask ([MS-SMB2] 2.2.13.1.1). For directories, the low bits
/// read as list-directory/add-file/add-subdirectory.
#[bitfield]
#[derive(BinWrite, BinRead, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct FileAccessMask {
    pub read_data: bool,
    pub write_data: bool,
    pub append_data: bool,
    pub read_ea: bool,

    pub write_ea: bool,
    pub execute: bool,
    pub delete_child: bool,
    pub read_attributes: bool,

    pub write_attributes: bool,
    #[skip]
    __: B7,

    pub delete: bool,
    pub read_control: bool,
    pub write_dac: bool,
    pub write_owner: bool,

    pub synchronize: bool,
    #[skip]
    __: B3,
    pub access_system_security: bool,
    pub maximum_allowed: bool,
    #[skip]
    __: B2,

    pub generic_all: bool,
    pub generic_execute: bool,
    pub generic_write: bool,
    pub generic_read: bool,
}

impl FileAccessMask {
    /// List-directory shares the bit position of read-data.
    pub fn list_directory(&self) -> bool {
        self.read_data()
    }
}

/// A list of records chained by a leading `nextEntryOffset` field, where a
/// zero offset terminates the chain. `ALIGN` is the alignment each record's
/// offset must honor when written.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct ChainedList<T, const ALIGN: u32 = 4> {
    pub items: Vec<T>,
}

impl<T, const ALIGN: u32> BinRead for ChainedList<T, ALIGN>
where
    T: BinRead,
    for<'a> T::Args<'a>: Default,
{
    type Args<'a> = ();

    fn read_options<R: binrw::io::Read + binrw::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let mut items = Vec::new();
        // An empty buffer is a valid, empty list.
        let mut record_start = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(record_start))?;
        if record_start == end {
            return Ok(Self { items });
        }
        loop {
            let next_entry_offset = u32::read_options(reader, endian, ())?;
            items.push(T::read_options(reader, endian, Default::default())?);
            if next_entry_offset == 0 {
                break;
            }
            record_start += next_entry_offset as u64;
            reader.seek(SeekFrom::Start(record_start))?;
        }
        Ok(Self { items })
    }
}

impl<T, const ALIGN: u32> BinWrite for ChainedList<T, ALIGN>
where
    T: BinWrite,
    for<'a> T::Args<'a>: Default,
{
    type Args<'a> = ();

    fn write_options<W: binrw::io::Write + binrw::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        for (i, item) in self.items.iter().enumerate() {
            let last = i == self.items.len() - 1;

            // Serialize the record body first to learn its size.
            let mut body = std::io::Cursor::new(Vec::new());
            item.write_options(&mut body, endian, Default::default())?;
            let mut body = body.into_inner();

            let next_entry_offset = if last {
                0
            } else {
                let mut record_size = 4 + body.len() as u32;
                while record_size % ALIGN != 0 {
                    body.push(0);
                    record_size += 1;
                }
                record_size
            };
            next_entry_offset.write_options(writer, endian, ())?;
            writer.write_all(&body)?;
        }
        Ok(())
    }
}

impl<T, const ALIGN: u32> From<Vec<T>> for ChainedList<T, ALIGN> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// FileDirectoryInformation (class 0x01), one record per enumerated file,
/// without its leading `nextEntryOffset` — see [`ChainedList`].
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileDirectoryInformation {
    pub file_index: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub change_time: FileTime,
    pub end_of_file: u64,
    pub allocation_size: u64,
    pub file_attributes: FileAttributes,
    #[bw(try_calc = file_name.size().try_into())]
    file_name_length: u32,
    #[br(args(file_name_length as u64))]
    pub file_name: SizedWideString,
}

impl FileDirectoryInformation {
    pub const CLASS_ID: u8 = 0x01;
    /// Directory records are chained on 8-byte boundaries.
    pub const CHAIN_ALIGN: u32 = 8;

    pub fn name(&self) -> String {
        self.file_name.to_string()
    }
}

pub type FileDirectoryInformationList =
    ChainedList<FileDirectoryInformation, { FileDirectoryInformation::CHAIN_ALIGN }>;

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u32))]
pub enum NotifyAction {
    Added = 0x1,
    Removed = 0x2,
    Modified = 0x3,
    RenamedOldName = 0x4,
    RenamedNewName = 0x5,
    AddedStream = 0x6,
    RemovedStream = 0x7,
    ModifiedStream = 0x8,
    RemovedByDelete = 0x9,
}

/// FileNotifyInformation, one record per change delivered by ChangeNotify,
/// without its leading `nextEntryOffset` — see [`ChainedList`].
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileNotifyInformation {
    pub action: NotifyAction,
    #[bw(try_calc = file_name.size().try_into())]
    file_name_length: u32,
    #[br(args(file_name_length as u64))]
    pub file_name: SizedWideString,
}

impl FileNotifyInformation {
    pub fn name(&self) -> String {
        self.file_name.to_string()
    }
}

pub type FileNotifyInformationList = ChainedList<FileNotifyInformation, 4>;

/// FileStandardInformation (class 5), returned by QueryInfo.
#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileStandardInformation {
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub number_of_links: u32,
    pub delete_pending: u8,
    pub directory: u8,
    #[bw(calc = 0)]
    _reserved: u16,
}

impl FileStandardInformation {
    pub const CLASS_ID: u8 = 5;
}

/// FileEndOfFileInformation (class 20), set to truncate or extend a file.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct FileEndOfFileInformation {
    pub end_of_file: u64,
}

impl FileEndOfFileInformation {
    pub const CLASS_ID: u8 = 20;
}

/// FileDispositionInformation (class 13), set to mark a file for deletion
/// on close.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
pub struct FileDispositionInformation {
    pub delete_pending: u8,
}

impl FileDispositionInformation {
    pub const CLASS_ID: u8 = 13;
}

/// FileRenameInformation (class 10), SMB2 flavor ([MS-FSCC] 2.4.37.2).
#[binrw::binrw]
#[derive(Debug)]
pub struct FileRenameInformation {
    pub replace_if_exists: u8,
    #[bw(calc = [0; 7])]
    _reserved: [u8; 7],
    #[bw(calc = 0)]
    #[br(assert(_root_directory == 0))]
    _root_directory: u64,
    #[bw(try_calc = file_name.size().try_into())]
    file_name_length: u32,
    #[br(args(file_name_length as u64))]
    pub file_name: SizedWideString,
}

impl FileRenameInformation {
    pub const CLASS_ID: u8 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_notify_information_list_parse() {
        // Two chained records: "new.txt" added, then "old.txt" removed.
        let mut data = Vec::new();
        data.extend_from_slice(&28u32.to_le_bytes()); // next entry at +28
        data.extend_from_slice(&1u32.to_le_bytes()); // Added
        data.extend_from_slice(&14u32.to_le_bytes());
        for c in "new.txt".encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }
        data.extend_from_slice(&[0, 0]); // align pad to 28
        data.extend_from_slice(&0u32.to_le_bytes()); // terminator
        data.extend_from_slice(&2u32.to_le_bytes()); // Removed
        data.extend_from_slice(&14u32.to_le_bytes());
        for c in "old.txt".encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }

        let list = FileNotifyInformationList::read_le(&mut Cursor::new(&data)).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].action, NotifyAction::Added);
        assert_eq!(list.items[0].name(), "new.txt");
        assert_eq!(list.items[1].action, NotifyAction::Removed);
        assert_eq!(list.items[1].name(), "old.txt");
    }

    #[test]
    fn test_chained_list_roundtrip() {
        let list: FileNotifyInformationList = vec![
            FileNotifyInformation {
                action: NotifyAction::Modified,
                file_name: "a".into(),
            },
            FileNotifyInformation {
                action: NotifyAction::Added,
                file_name: "dir\\b.txt".into(),
            },
        ]
        .into();
        let mut buf = Cursor::new(Vec::new());
        list.write_le(&mut buf).unwrap();
        let parsed =
            FileNotifyInformationList::read_le(&mut Cursor::new(buf.into_inner())).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_empty_chained_list() {
        let list = FileNotifyInformationList::read_le(&mut Cursor::new(Vec::new())).unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_directory_information_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // terminator
        data.extend_from_slice(&0u32.to_le_bytes()); // file index
        data.extend_from_slice(&[0u8; 8 * 4]); // four timestamps
        data.extend_from_slice(&42u64.to_le_bytes()); // end of file
        data.extend_from_slice(&4096u64.to_le_bytes()); // allocation size
        data.extend_from_slice(&0x20u32.to_le_bytes()); // archive attribute
        data.extend_from_slice(&6u32.to_le_bytes()); // name length
        for c in "f.c".encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }

        let list = FileDirectoryInformationList::read_le(&mut Cursor::new(&data)).unwrap();
        assert_eq!(list.items.len(), 1);
        let entry = &list.items[0];
        assert_eq!(entry.name(), "f.c");
        assert_eq!(entry.end_of_file, 42);
        assert!(entry.file_attributes.archive());
        assert!(!entry.file_attributes.directory());
    }
}
