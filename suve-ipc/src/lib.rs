//! The framed request/response protocol spoken over the agent's local
//! socket. One connection carries exactly one exchange: a 4-byte
//! big-endian length prefix, then a UTF-8 JSON payload, capped at 16 MiB.

mod framing;
mod protocol;

pub use framing::MAX_FRAME_LEN;
pub use framing::read_frame;
pub use framing::write_frame;
pub use framing::FramingError;
pub use protocol::ErrorBody;
pub use protocol::ErrorKind;
pub use protocol::Hint;
pub use protocol::Method;
pub use protocol::Request;
pub use protocol::Response;
