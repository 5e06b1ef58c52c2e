use qw_messages::CodecError;
use thiserror::Error;

/// Only transport-level problems are typed errors; everything
/// domain-level round-trips as a [`qw_messages::Reply`] value and is
/// unwrapped here (spec.md §7).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid worker address: {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("no live workers available")]
    NoWorkersAvailable,
    #[error("registry error: {0}")]
    Registry(anyhow::Error),
    #[error("worker queue is full: {0}")]
    QueueFull(String),
    #[error("worker rejected the request: {0}")]
    RemoteDecode(String),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("remote handler raised {type_tag}: {message}")]
    Remote { type_tag: String, message: String },
}
