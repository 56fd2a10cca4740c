pub mod file_time;
pub mod pos_marker;
pub mod sized_string;

pub mod prelude {
    pub use super::file_time::FileTime;
    pub use super::pos_marker::PosMarker;
    pub use super::sized_string::{SizedAnsiString, SizedWideString};
}
