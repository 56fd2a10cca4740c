//! Query Info and Set Info messages, for the file information classes the
//! client uses (standard info, end-of-file, disposition, rename).

use std::io::SeekFrom;

use binrw::prelude::*;

use super::create::FileId;
use crate::packets::binrw_util::prelude::*;

#[binrw::binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[brw(repr(u8))]
pub enum InfoType {
    File = 0x01,
    FileSystem = 0x02,
    Security = 0x03,
    Quota = 0x04,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct QueryInfoRequest {
    #[bw(calc = 41)]
    #[br(assert(_structure_size == 41))]
    _structure_size: u16,
    pub info_type: InfoType,
    pub file_info_class: u8,
    pub output_buffer_length: u32,
    // No input buffer is ever sent.
    #[bw(calc = 0)]
    _input_buffer_offset: u16,
    #[bw(calc = 0)]
    _reserved: u16,
    #[bw(calc = 0)]
    _input_buffer_length: u32,
    pub additional_information: u32,
    pub flags: u32,
    pub file_id: FileId,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct QueryInfoResponse {
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

impl QueryInfoResponse {
    /// Parses the output buffer as the given information structure.
    pub fn parse<T>(&self) -> crate::Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        let mut cursor = std::io::Cursor::new(&self.output_buffer);
        Ok(T::read_le(&mut cursor)?)
    }
}

#[binrw::binrw]
#[derive(Debug)]
pub struct SetInfoRequest {
    #[bw(calc = 33)]
    #[br(assert(_structure_size == 33))]
    _structure_size: u16,
    pub info_type: InfoType,
    pub file_info_class: u8,
    #[bw(try_calc = buffer.len().try_into())]
    buffer_length: u32,
    #[bw(calc = PosMarker::default())]
    _buffer_offset: PosMarker<u16>,
    #[bw(calc = 0)]
    _reserved: u16,
    pub additional_information: u32,
    pub file_id: FileId,
    #[br(seek_before = SeekFrom::Start(_buffer_offset.value as u64), count = buffer_length)]
    #[bw(write_with = PosMarker::write_aoff, args(&_buffer_offset))]
    pub buffer: Vec<u8>,
}

impl SetInfoRequest {
    /// Builds a file-class SetInfo request from an information structure.
    pub fn file_info<T>(file_id: FileId, class_id: u8, info: &T) -> crate::Result<SetInfoRequest>
    where
        T: for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut cursor = std::io::Cursor::new(Vec::new());
        info.write_le(&mut cursor)?;
        Ok(SetInfoRequest {
            info_type: InfoType::File,
            file_info_class: class_id,
            additional_information: 0,
            file_id,
            buffer: cursor.into_inner(),
        })
    }
}

#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetInfoResponse {
    #[bw(calc = 2)]
    #[br(assert(_structure_size == 2))]
    _structure_size: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::fscc::*;
    use crate::packets::smb2::*;

    #[test]
    fn test_set_eof_request_layout() {
        let req = SetInfoRequest::file_info(
            FileId {
                persistent: 1,
                volatile: 2,
            },
            FileEndOfFileInformation::CLASS_ID,
            &FileEndOfFileInformation { end_of_file: 8192 },
        )
        .unwrap();
        let data = encode_content(Content::SetInfoRequest(req));
        assert_eq!(&data[0..2], &[33, 0]);
        assert_eq!(data[2], InfoType::File as u8);
        assert_eq!(data[3], 20); // EndOfFileInformation
        let buffer_length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(buffer_length, 8);
        assert_eq!(
            u64::from_le_bytes(data[32..40].try_into().unwrap()),
            8192
        );
    }

    #[test]
    fn test_query_info_standard_parse() {
        let info = FileStandardInformation {
            allocation_size: 4096,
            end_of_file: 100,
            number_of_links: 1,
            delete_pending: 0,
            directory: 0,
        };
        let mut buf = std::io::Cursor::new(Vec::new());
        info.write_le(&mut buf).unwrap();
        let resp = QueryInfoResponse {
            output_buffer: buf.into_inner(),
        };
        let data = encode_server_message(Content::QueryInfoResponse(resp), Status::Success);
        match decode_message(&data).content {
            Content::QueryInfoResponse(r) => {
                let parsed: FileStandardInformation = r.parse().unwrap();
                assert_eq!(parsed.end_of_file, 100);
                assert_eq!(parsed.directory, 0);
            }
            _ => panic!("wrong content type"),
        }
    }
}
