//! Wire types shared by the worker, the client, the registry and discovery
//! crates: the task envelope, the reply envelope, the dynamic argument
//! value, worker identity and the codec that turns all of the above into
//! bytes.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod value;

pub use codec::{decode_control_reply, decode_envelope, decode_reply, decode_request};
pub use codec::{encode_control_reply, encode_envelope, encode_reply};
pub use envelope::{ControlReply, DomainTaskCall, Envelope, FuncCall, QueueCall, QueueStatus};
pub use envelope::{Reply, WorkerStatus};
pub use error::CodecError;
pub use identity::WorkerIdentity;
pub use value::ArgValue;
