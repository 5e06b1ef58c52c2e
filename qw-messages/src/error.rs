use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to decode envelope: {0}")]
    Decode(String),
    #[error("failed to encode reply: {0}")]
    Encode(String),
}
