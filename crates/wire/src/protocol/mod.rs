//! Outbound HTTP protocol types.
//!
//! - [`Message`] / [`PayloadItem`]: the head-then-payload item stream fed to the encoder
//! - [`PayloadSize`]: how the payload is framed (length, chunked, empty, omitted)
//! - [`ResponseHead`]: status, version and headers of a response
//! - [`SendError`]: everything that can go wrong while writing

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod response;
pub use response::ResponseHead;
pub use response::response_head;

mod error;
pub use error::SendError;
