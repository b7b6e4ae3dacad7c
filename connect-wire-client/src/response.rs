//! Response-side types for the Connect client runtime.
//!
//! - [`FrameDecoder`]: parses envelope frames out of a response byte stream
//! - [`UnaryOutput`] / [`ConnectResponse`]: unary result carriers
//! - [`StreamOutput`]: the streaming response handle

mod decoder;
pub(crate) mod error_parser;
mod output;
mod stream;

pub use decoder::FrameDecoder;
pub use output::{ConnectResponse, UnaryOutput};
pub use stream::StreamOutput;
