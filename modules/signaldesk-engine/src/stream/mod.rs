//! Wire side of an audit run: bytes → lines → events.

pub mod decode;
pub mod lines;

pub use decode::{decode, DecodeCause, DecodeFailure, StreamEvent};
pub use lines::{lines, LineReassembler};
