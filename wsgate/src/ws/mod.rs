//! WebSocket gateway: frames, codecs, routing, connection lifecycle

pub mod codec;
pub mod connection;
pub mod endpoint;
pub mod frames;
pub mod registry;
pub mod router;

pub use codec::{DecodeError, FrameCodec, WireFormat};
pub use connection::{Connection, ConnectionId};
pub use frames::{BroadcastFrame, Meta, PkgId, RequestFrame, ResponseFrame, RspCode};
pub use registry::ConnectionRegistry;
pub use router::{HandlerContext, PackageHandler, PackageRouter};
