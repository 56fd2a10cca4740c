//! Query Directory messages. The response payload is a chained list of
//! directory information records.

use std::io::SeekFrom;

use binrw::prelude::*;
use modular_bitfield::prelude::*;

use super::create::FileId;
use crate::packets::binrw_util::prelude::*;
use crate::packets::fscc::FileDirectoryInformationList;

#[bitfield]
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct QueryDirectoryFlags {
    pub restart_scans: bool,
    pub return_single_entry: bool,
    pub index_specified: bool,
    pub reopen: bool,
    #[skip]
    __: B4,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct QueryDirectoryRequest {
    #[bw(calc = 33)]
    #[br(assert(_structure_size == 33))]
    _structure_size: u16,
    pub file_information_class: u8,
    pub flags: QueryDirectoryFlags,
    #[bw(assert(flags.index_specified() || *file_index == 0))]
    pub file_index: u32,
    pub file_id: FileId,
    #[bw(calc = PosMarker::default())]
    _file_name_offset: PosMarker<u16>,
    #[bw(try_calc = file_name.size().try_into())]
    file_name_length: u16,
    pub output_buffer_length: u32,
    #[br(args(file_name_length as u64))]
    #[bw(write_with = PosMarker::write_aoff, args(&_file_name_offset))]
    pub file_name: SizedWideString,
}

#[binrw::binrw]
#[derive(Debug)]
pub struct QueryDirectoryResponse {
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

impl QueryDirectoryResponse {
    /// Parses the raw output buffer as a chained list of
    /// FileDirectoryInformation records.
    pub fn read_output(&self) -> crate::Result<FileDirectoryInformationList> {
        let mut cursor = std::io::Cursor::new(&self.output_buffer);
        Ok(FileDirectoryInformationList::read_le(&mut cursor)?)
    }
}
