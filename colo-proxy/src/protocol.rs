//! Wire protocol spoken with the COLO proxy kernel module.

pub mod message;

pub use message::{
    CHECKPOINT_PAYLOAD_SIZE, ERROR_PAYLOAD_SIZE, HEADER_SIZE, Header, Inbound, OperationCode,
    ProtocolError, decode_checkpoint, decode_frame, encode_request, flags, msg_type,
};
