//! Fleet link layer.
//!
//! Chunked datagram transport for large payloads and the UDP command
//! channel used to reach vehicles.

pub mod blob;
pub mod channel;
pub mod transport;
pub mod wire;

pub use blob::{ArrayBlob, BlobError};
pub use channel::{
    discover, CommandChannel, LinkError, PacketSender, Uplink, DEFAULT_COMMAND_PORT,
    DEFAULT_DATA_PORT, DEFAULT_DISCOVERY_WINDOW, DEFAULT_TELEMETRY_PORT,
};
pub use transport::{fragment, next_transfer_id, Chunk, ChunkError, Reassembler, MAX_CHUNK_PAYLOAD};
pub use wire::{decode_datagram, encode_command, encode_control, encode_telemetry, ControlMessage, Inbound, WireError};
