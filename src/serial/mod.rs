pub mod link;
pub mod protocol;

pub use link::{
    ConnectionStatus, LinkState, PortOpener, ReconnectOutcome, SerialLink, SystemPorts,
    READ_TIMEOUT,
};
pub use protocol::{Decoded, LineDecoder, LINE_BUFFER_SIZE};
