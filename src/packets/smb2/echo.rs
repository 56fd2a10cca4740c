//! Echo request and response.
use binrw::prelude::*;

#[binrw::binrw]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EchoMessage {
    #[bw(calc = 4)]
    #[br(assert(_structure_size == 4))]
    _structure_size: u16,
    #[bw(calc = 0)]
    _reserved: u16,
}

pub type EchoRequest = EchoMessage;
pub type EchoResponse = EchoMessage;
