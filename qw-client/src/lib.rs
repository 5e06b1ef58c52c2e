//! Client-side dispatch (spec.md §4.G).
//!
//! Turns a handler id + arguments into a wire envelope, picks a worker,
//! connects, writes, half-closes, reads to EOF, decodes and either
//! returns the value or re-raises the remote exception. No cross-worker
//! retry: a transport or decode failure surfaces directly to the caller.

pub mod error;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use qw_messages::envelope::ControlReply;
use qw_messages::envelope::Envelope;
use qw_messages::envelope::FuncCall;
use qw_messages::envelope::QueueCall;
use qw_messages::envelope::Reply;
use qw_messages::ArgValue;
use qw_registry::RegistryClient;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

pub use error::ClientError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerAddr {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl WorkerAddr {
    fn socket_addr(&self) -> Result<SocketAddr, ClientError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ClientError::InvalidAddress(self.host.clone(), self.port))
    }
}

/// How the client selects among an equally-live set of workers: the
/// design only requires "some live worker is chosen" (spec.md §4.G).
/// `WORKER_HIGH_LIST` routing is an undecided Open Question upstream
/// (spec.md §9); this rewrite exposes `Priority::High` as a hint that
/// only changes *which list* is consulted first, not a full scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

pub struct Client {
    registry: Option<RegistryClient>,
    static_workers: Vec<WorkerAddr>,
    static_high_workers: Vec<WorkerAddr>,
    next: AtomicUsize,
}

impl Client {
    pub fn new(static_workers: Vec<WorkerAddr>, static_high_workers: Vec<WorkerAddr>) -> Self {
        Self {
            registry: None,
            static_workers,
            static_high_workers,
            next: AtomicUsize::new(0),
        }
    }

    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Current registry snapshot, falling back to the statically
    /// configured lists if no registry is attached.
    pub async fn get_servers(&self) -> Result<Vec<WorkerAddr>, ClientError> {
        if let Some(registry) = &self.registry {
            let workers = registry.list().await.map_err(ClientError::Registry)?;
            return Ok(workers
                .into_iter()
                .map(|(name, host, port)| WorkerAddr { name, host, port })
                .collect());
        }
        Ok(self.static_workers.clone())
    }

    async fn pick_worker(&self, priority: Priority) -> Result<WorkerAddr, ClientError> {
        let candidates = match priority {
            Priority::Normal => self.get_servers().await?,
            Priority::High => {
                if self.static_high_workers.is_empty() {
                    self.get_servers().await?
                } else {
                    self.static_high_workers.clone()
                }
            },
        };
        if candidates.is_empty() {
            return Err(ClientError::NoWorkersAvailable);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(candidates[index].clone())
    }

    /// Run `handler_id(args, kwargs)` on some live worker and return its
    /// result, or `Err(ClientError::Remote(..))` if the handler raised.
    pub async fn run(
        &self,
        handler_id: &str,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<ArgValue, ClientError> {
        self.run_with_priority(handler_id, args, kwargs, Priority::Normal)
            .await
    }

    pub async fn run_with_priority(
        &self,
        handler_id: &str,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
        priority: Priority,
    ) -> Result<ArgValue, ClientError> {
        let worker = self.pick_worker(priority).await?;
        let envelope = Envelope::Queue(QueueCall {
            call: FuncCall {
                handler_id: handler_id.to_string(),
                args,
                kwargs,
                debug: false,
                correlation_id: None,
            },
            queued: false,
        });

        let bytes = qw_messages::encode_envelope(&envelope).map_err(ClientError::Codec)?;
        let reply_bytes = self.send_and_receive(&worker, &bytes).await?;
        let reply = qw_messages::decode_reply(&reply_bytes).map_err(ClientError::Codec)?;

        match reply {
            Reply::Value(value) => Ok(value),
            Reply::Exception { type_tag, message } => Err(ClientError::Remote { type_tag, message }),
            Reply::Queued { task_id } => Err(ClientError::UnexpectedReply(format!(
                "immediate call was queued unexpectedly, task_id={task_id}"
            ))),
            Reply::QueueFull { message } => Err(ClientError::QueueFull(message)),
            Reply::DecodeError { message } => Err(ClientError::RemoteDecode(message)),
        }
    }

    /// Enqueue `handler_id(args, kwargs)` for background execution;
    /// returns the server-assigned correlation id without waiting for the
    /// handler to run.
    pub async fn enqueue(
        &self,
        handler_id: &str,
        args: Vec<ArgValue>,
        kwargs: BTreeMap<String, ArgValue>,
    ) -> Result<uuid::Uuid, ClientError> {
        let worker = self.pick_worker(Priority::Normal).await?;
        let envelope = Envelope::Queue(QueueCall {
            call: FuncCall {
                handler_id: handler_id.to_string(),
                args,
                kwargs,
                debug: false,
                correlation_id: None,
            },
            queued: true,
        });
        let bytes = qw_messages::encode_envelope(&envelope).map_err(ClientError::Codec)?;
        let reply_bytes = self.send_and_receive(&worker, &bytes).await?;
        match qw_messages::decode_reply(&reply_bytes).map_err(ClientError::Codec)? {
            Reply::Queued { task_id } => Ok(task_id),
            Reply::QueueFull { message } => Err(ClientError::QueueFull(message)),
            other => Err(ClientError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Sends the literal control string `"health"` and parses the
    /// textual JSON status reply (spec.md §4.G, §8 S4).
    pub async fn health(&self, worker: &WorkerAddr) -> Result<ControlReply, ClientError> {
        let reply_bytes = self.send_and_receive(worker, b"health").await?;
        qw_messages::decode_control_reply(&reply_bytes).map_err(ClientError::Codec)
    }

    async fn send_and_receive(
        &self,
        worker: &WorkerAddr,
        request: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let addr = worker.socket_addr()?;
        debug!(worker = %worker.name, %addr, "connecting to worker");
        let mut stream = TcpStream::connect(addr).await.map_err(ClientError::Transport)?;
        stream.write_all(request).await.map_err(ClientError::Transport)?;
        stream.shutdown().await.map_err(ClientError::Transport)?;

        let mut reply_bytes = Vec::new();
        stream
            .read_to_end(&mut reply_bytes)
            .await
            .map_err(ClientError::Transport)?;
        Ok(reply_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_workers() {
        let workers = vec![
            WorkerAddr { name: "a".into(), host: "127.0.0.1".into(), port: 1 },
            WorkerAddr { name: "b".into(), host: "127.0.0.1".into(), port: 2 },
        ];
        let client = Client::new(workers.clone(), vec![]);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let picked: Vec<_> = (0..4)
            .map(|_| rt.block_on(client.pick_worker(Priority::Normal)).unwrap().name)
            .collect();
        assert_eq!(picked, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn no_workers_is_an_error() {
        let client = Client::new(vec![], vec![]);
        let err = client.pick_worker(Priority::Normal).await.unwrap_err();
        assert!(matches!(err, ClientError::NoWorkersAvailable));
    }
}
