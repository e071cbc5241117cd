//! Request/response messages and their wire framing

pub mod codec;
pub mod types;

pub use codec::{CodecError, RequestCodec, ResponseCodec};
pub use types::*;
