//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one relay task per connection)
//!     → codec.rs (request head / response head + body fragments)
//!     → request.rs (client head, signed origin request)
//!     → response.rs (status mapping, header copy, chunked re-framing)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 framing on `httparse`; body fragments stay visible to the relay
//! - Header types come from `hyper` (`http` re-exports)

pub mod codec;
pub mod request;
pub mod response;
pub mod server;

pub use codec::{CodecError, RequestDecoder, ResponseDecoder};
pub use request::RequestHead;
pub use response::ResponseHead;
pub use server::{AppState, RelayServer};
