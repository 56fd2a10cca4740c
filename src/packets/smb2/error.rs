//! The generic error response body, sent with any non-success status.

use binrw::prelude::*;

#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    #[bw(calc = 9)]
    #[br(assert(_structure_size == 9))]
    _structure_size: u16,
    pub error_context_count: u8,
    #[bw(calc = 0)]
    _reserved: u8,
    #[bw(try_calc = error_data.len().try_into())]
    byte_count: u32,
    // When byte_count is zero the server still pads with one byte; reading
    // to end of message keeps both forms parseable.
    #[br(parse_with = binrw::helpers::until_eof)]
    pub error_data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_error_resp_parse_with_pad_byte() {
        let data = [9u8, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = ErrorResponse::read_le(&mut Cursor::new(&data)).unwrap();
        assert_eq!(err.error_context_count, 0);
        assert_eq!(err.error_data, vec![0]);
    }
}
