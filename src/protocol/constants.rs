// Message types
pub const MSG_TYPE_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_TYPE_ABORT: u8 = 2;
pub const MSG_TYPE_ACK: u8 = 3;
pub const MSG_TYPE_USER_CONTROL: u8 = 4;
pub const MSG_TYPE_WINDOW_ACK: u8 = 5;
pub const MSG_TYPE_SET_PEER_BW: u8 = 6;
pub const MSG_TYPE_AUDIO: u8 = 8;
pub const MSG_TYPE_VIDEO: u8 = 9;
pub const MSG_TYPE_COMMAND_AMF3: u8 = 17;
pub const MSG_TYPE_COMMAND_AMF0: u8 = 20;

// Handshake
pub const RTMP_VERSION: u8 = 0x03;
pub const HANDSHAKE_PACKET_SIZE: usize = 1536; // C1/S1 and C2/S2

// Chunking
pub const DEFAULT_CHUNK_SIZE: u32 = 128;
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;
