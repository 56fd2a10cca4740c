//! The plain (unencrypted) SMB2 message: the 64-byte header followed by a
//! command-specific body. [`Content`] is the per-command catalog — one
//! variant per request/response shape, selected by the header's command and
//! direction when parsing.

use binrw::prelude::*;

use super::header::*;
use super::*;

/// Generates the request/response variant pairs of the [`Content`] enum,
/// along with `associated_cmd` and `From<T>` conversions for requests.
macro_rules! req_response_pairs {
    (
        $({$cmd:ident, $mod:ident},)+
    ) => {
        paste::paste!{

#[derive(BinRead, BinWrite, Debug)]
#[brw(import(command: &Command, from_srv: bool))]
pub enum Content {
    $(
        #[br(pre_assert(matches!(command, Command::$cmd) && !from_srv))]
        [<$cmd Request>]($mod::[<$cmd Request>]),
        #[br(pre_assert(matches!(command, Command::$cmd) && from_srv))]
        [<$cmd Response>]($mod::[<$cmd Response>]),
    )*

    // Any server message whose expected body fails to parse falls through
    // to the generic error response.
    #[br(pre_assert(from_srv))]
    ErrorResponse(error::ErrorResponse),
}

impl Content {
    /// The command this content is carried under.
    ///
    /// # Panics
    /// For an error response, which has no single associated command.
    pub fn associated_cmd(&self) -> Command {
        use Content::*;
        match self {
            $(
                [<$cmd Request>](_) => Command::$cmd,
                [<$cmd Response>](_) => Command::$cmd,
            )*
            ErrorResponse(_) => panic!("error response has no associated command"),
        }
    }
}

$(
    impl From<$mod::[<$cmd Request>]> for Content {
        fn from(req: $mod::[<$cmd Request>]) -> Content {
            Content::[<$cmd Request>](req)
        }
    }
)*
        }
    };
}

req_response_pairs!(
    {Negotiate, negotiate},
    {SessionSetup, session_setup},
    {Logoff, session_setup},
    {TreeConnect, tree_connect},
    {TreeDisconnect, tree_connect},
    {Create, create},
    {Close, create},
    {Flush, file},
    {Read, file},
    {Write, file},
    {Echo, echo},
    {QueryDirectory, query_dir},
    {ChangeNotify, notify},
    {QueryInfo, info},
    {SetInfo, info},
);

/// A plain, single SMB2 message.
#[binrw::binrw]
#[derive(Debug)]
#[brw(little)]
pub struct PlainMessage {
    pub header: Header,
    #[brw(args(&header.command, header.flags.server_to_redir()))]
    pub content: Content,
}

impl PlainMessage {
    /// Default credits requested with every request.
    pub const DEFAULT_CREDIT_REQUEST: u16 = 8191;

    pub fn new(content: Content) -> PlainMessage {
        PlainMessage {
            header: Header {
                credit_charge: 1,
                status: 0,
                command: content.associated_cmd(),
                credit_request: Self::DEFAULT_CREDIT_REQUEST,
                flags: HeaderFlags::new(),
                next_command: 0,
                message_id: u64::MAX,
                tree_id: Some(0),
                async_id: None,
                session_id: 0,
                signature: 0,
            },
            content,
        }
    }
}

/// Test helpers shared by the packet modules' tests.
#[cfg(test)]
pub mod test_helpers {
    use std::io::Cursor;

    use super::*;

    /// Encodes `content` as part of a full message and returns only the
    /// body bytes. Useful for asserting body layouts, since offset fields
    /// are measured from the header start.
    pub fn encode_content(content: Content) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let msg = PlainMessage::new(content);
        msg.write(&mut cursor).unwrap();
        cursor.into_inner()[Header::STRUCT_SIZE..].to_vec()
    }

    /// Encodes a full server-to-client message with the given status.
    pub fn encode_server_message(content: Content, status: Status) -> Vec<u8> {
        let mut msg = PlainMessage::new(content);
        msg.header.flags = msg.header.flags.with_server_to_redir(true);
        msg.header.status = status as u32;
        let mut cursor = Cursor::new(Vec::new());
        msg.write(&mut cursor).unwrap();
        cursor.into_inner()
    }

    /// Parses a full message from bytes.
    pub fn decode_message(bytes: &[u8]) -> PlainMessage {
        PlainMessage::read(&mut Cursor::new(bytes)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use crate::packets::smb2::*;
    use binrw::prelude::*;

    #[test]
    fn test_request_roundtrip_via_catalog() {
        let data = {
            let mut msg = PlainMessage::new(Content::EchoRequest(Default::default()));
            msg.header.message_id = 42;
            let mut cursor = std::io::Cursor::new(Vec::new());
            msg.write(&mut cursor).unwrap();
            cursor.into_inner()
        };
        let parsed = decode_message(&data);
        assert_eq!(parsed.header.command, Command::Echo);
        assert_eq!(parsed.header.message_id, 42);
        assert_eq!(parsed.header.credit_request, 8191);
        assert!(matches!(parsed.content, Content::EchoRequest(_)));
    }

    #[test]
    fn test_error_body_falls_through_to_error_response() {
        // A Read response with an error status carries a 9-byte error body;
        // it must parse as ErrorResponse, not ReadResponse.
        let mut msg = PlainMessage::new(Content::ReadRequest(ReadRequest {
            flags: Default::default(),
            length: 0,
            offset: 0,
            file_id: Default::default(),
            minimum_count: 0,
        }));
        msg.content = Content::ErrorResponse(Default::default());
        msg.header.flags = msg.header.flags.with_server_to_redir(true);
        msg.header.status = Status::AccessDenied as u32;
        let mut cursor = std::io::Cursor::new(Vec::new());
        msg.write(&mut cursor).unwrap();

        let parsed = decode_message(&cursor.into_inner());
        assert_eq!(parsed.header.command, Command::Read);
        assert_eq!(parsed.header.status, Status::AccessDenied as u32);
        assert!(matches!(parsed.content, Content::ErrorResponse(_)));
    }
}
