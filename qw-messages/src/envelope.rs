use std::collections::BTreeMap;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

use crate::value::ArgValue;

/// The single request carried by a connection (spec.md §3 "Task envelope").
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Envelope {
    /// `"health"` or any other control string; treated as a liveness probe.
    Control(String),
    /// An opaque callable reference run immediately, off the accept loop.
    Func(FuncCall),
    /// Same payload, routed to the immediate or queued path by `queued`.
    Queue(QueueCall),
    /// A descriptor resolved by an external collaborator at execution
    /// time. Always routed through the queue (spec.md §4.E).
    DomainTask(DomainTaskCall),
}

/// A callable reference plus its positional and keyword arguments.
///
/// `handler_id` replaces the source's opaque pickled callable with a short
/// string key resolved against a [`qw_handlers`]-style registry (spec.md
/// REDESIGN FLAGS, "Dynamic callable transport").
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FuncCall {
    pub handler_id: String,
    pub args: Vec<ArgValue>,
    pub kwargs: BTreeMap<String, ArgValue>,
    pub debug: bool,
    /// Assigned by the server before dispatch (spec.md invariant 1);
    /// absent on the wire from the client.
    pub correlation_id: Option<Uuid>,
}

impl FuncCall {
    pub fn new(handler_id: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            handler_id: handler_id.into(),
            args,
            kwargs: BTreeMap::new(),
            debug: false,
            correlation_id: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QueueCall {
    pub call: FuncCall,
    pub queued: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DomainTaskCall {
    pub program: String,
    pub task: String,
    pub extra_args: Vec<ArgValue>,
    pub kwargs: BTreeMap<String, ArgValue>,
    pub host: String,
    pub debug: bool,
    pub correlation_id: Option<Uuid>,
}

/// The reply to a `Func`/`Queue`/`DomainTask` request. Exceptions are
/// encoded as values, never as a transport failure (spec.md §7).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Reply {
    Value(ArgValue),
    Exception { type_tag: String, message: String },
    Queued { task_id: Uuid },
    QueueFull { message: String },
    DecodeError { message: String },
}

impl Reply {
    pub fn exception(type_tag: impl Into<String>, message: impl Into<String>) -> Self {
        Reply::Exception {
            type_tag: type_tag.into(),
            message: message.into(),
        }
    }
}

/// The textual-JSON reply to a `Control` request (spec.md §4.E / §6).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
    Health {
        queue: QueueStatus,
        worker: WorkerStatus,
    },
    Pong {
        pong: String,
        worker: WorkerStatus,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub full: bool,
    pub empty: bool,
    pub consumers: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub serving: Vec<String>,
}
