//! LoRaWAN node session and downlink-command core.
//! Host-driven: no file or radio I/O; the host passes timer ticks and MAC events and supplies
//! the store, decryptor, sink, data source and MAC implementations.

pub mod command;
pub mod connection;
pub mod downlink;
pub mod mac;
pub mod record;
pub mod session;
pub mod uplink;
pub mod wire;

pub use command::{ValidatedCommand, ValidationRejected, Verb};
pub use connection::{ConnectionConfig, ConnectionError};
pub use downlink::{
    CommandSink, DecryptError, Decryptor, DownlinkEnvelope, DownlinkOutcome, DownlinkProcessor,
    Plaintext, SinkError,
};
pub use mac::{MacError, MacEvent, MacLayer, SessionParams, TxComplete};
pub use node::{NodeCore, NodeError};
pub use session::{MemoryStore, Session, SessionKeys, SessionStore, StoreError};
pub use uplink::{CycleOutcome, DataSource, PayloadEncoding, Reading, SourceError, UplinkScheduler};
pub use wire::{decode_event, encode_command, MacCommand, WireError};

pub mod ffi;
pub mod integrity;
pub mod node;
