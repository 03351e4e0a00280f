mod envelope;
mod framing;

pub use envelope::{
    BridgeMessage, READY_TYPE, REQUEST_TYPE, RESULT_TYPE, ReadyEvent, RequestData,
    RequestEnvelope, ResponseEnvelope, SignResult,
};
pub use framing::{read_message, try_read_message, write_message};
