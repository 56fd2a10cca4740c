//! Change Notify messages. The request is answered with `Pending` right
//! away; the actual notification arrives later, out of band, with the same
//! message ID.

use std::io::SeekFrom;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use super::create::FileId;
use crate::packets::binrw_util::prelude::*;
use crate::packets::fscc::FileNotifyInformationList;

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct NotifyFlags {
    pub watch_tree: bool,
    #[skip]
    __: B15,
}

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct NotifyFilter {
    pub file_name: bool,
    pub dir_name: bool,
    pub attributes: bool,
    pub size: bool,

    pub last_write: bool,
    pub last_access: bool,
    pub creation: bool,
    pub ea: bool,

    pub security: bool,
    pub stream_name: bool,
    pub stream_size: bool,
    pub stream_write: bool,

    #[skip]
    __: B20,
}

impl NotifyFilter {
    /// Watch for file and directory name changes, size, and last-write
    /// updates.
    pub fn default_watch() -> Self {
        NotifyFilter::new()
            .with_file_name(true)
            .with_dir_name(true)
            .with_attributes(true)
            .with_size(true)
            .with_last_write(true)
    }
}

#[binrw::binrw]
#[derive(Debug)]
pub struct ChangeNotifyRequest {
    #[bw(calc = 32)]
    #[br(assert(_structure_size == 32))]
    _structure_size: u16,
    pub flags: NotifyFlags,
    pub output_buffer_length: u32,
    pub file_id: FileId,
    pub completion_filter: NotifyFilter,
    #[bw(calc = 0)]
    _reserved: u32,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct ChangeNotifyResponse {
    #[bw(calc = 9)]
    #[br(assert(_structure_size == 9))]
    _structure_size: u16,
    #[bw(calc = PosMarker::default())]
    _output_buffer_offset: PosMarker<u16>,
    #[bw(try_calc = output_buffer.len().try_into())]
    output_buffer_length: u32,
    #[br(seek_before = SeekFrom::Start(_output_buffer_offset.value as u64), count = output_buffer_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_output_buffer_offset))]
    pub output_buffer: Vec<u8>,
}

impl ChangeNotifyResponse {
    /// Parses the raw output buffer as chained FileNotifyInformation
    /// records. A `Pending` interim response carries an empty buffer.
    pub fn read_notifications(&self) -> crate::Result<FileNotifyInformationList> {
        let mut cursor = std::io::Cursor::new(&self.output_buffer);
        Ok(FileNotifyInformationList::read_le(&mut cursor)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::fscc::{FileNotifyInformation, NotifyAction};
    use crate::packets::smb2::*;

    #[test]
    fn test_change_notify_req_write() {
        let req = ChangeNotifyRequest {
            flags: NotifyFlags::new().with_watch_tree(true),
            output_buffer_length: 2048,
            file_id: FileId {
                persistent: 3,
                volatile: 4,
            },
            completion_filter: NotifyFilter::default_watch(),
        };
        let data = encode_content(Content::ChangeNotifyRequest(req));
        assert_eq!(data.len(), 32);
        assert_eq!(&data[0..2], &[32, 0]);
        assert_eq!(&data[2..4], &[1, 0]); // watch tree
        assert_eq!(
            u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            2048
        );
        assert_eq!(
            u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            0x1f // name + dir name + attributes + size + last write
        );
    }

    #[test]
    fn test_change_notify_resp_notifications() {
        let list: FileNotifyInformationList = vec![FileNotifyInformation {
            action: NotifyAction::Added,
            file_name: "x.bin".into(),
        }]
        .into();
        let mut buffer = std::io::Cursor::new(Vec::new());
        list.write_le(&mut buffer).unwrap();
        let resp = ChangeNotifyResponse {
            output_buffer: buffer.into_inner(),
        };
        let data = encode_server_message(Content::ChangeNotifyResponse(resp), Status::Success);
        match decode_message(&data).content {
            Content::ChangeNotifyResponse(r) => {
                let list = r.read_notifications().unwrap();
                assert_eq!(list.items.len(), 1);
                assert_eq!(list.items[0].name(), "x.bin");
            }
            _ => panic!("wrong content type"),
        }
    }
}
