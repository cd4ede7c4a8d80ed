//! Wire codec (§4.1): two framings sharing one command/response payload schema.

pub mod message;
pub mod serial_frame;
pub mod space_packet;

pub use message::{CommandPayload, Request, Response, ResponsePayload};
