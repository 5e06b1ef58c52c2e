//! TCP server (spec.md §4.E): accepts one request per connection,
//! dispatches it by `Envelope` variant, and replies on the same
//! connection before half-closing it — mirroring the source's
//! `connection_handler`/`closing_writer` pair.

use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use qw_handlers::domain::DomainTaskResolver;
use qw_handlers::HandlerRegistry;
use qw_messages::codec;
use qw_messages::envelope::Envelope;
use qw_messages::envelope::QueueCall;
use qw_messages::ControlReply;
use qw_messages::Reply;
use qw_messages::WorkerIdentity;
use qw_messages::{QueueStatus, WorkerStatus};
use socket2::Domain;
use socket2::Socket;
use socket2::Type;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tracing::debug;
use tracing::warn;

use crate::engine::execute_func_isolated;
use crate::engine::new_task_id;
use crate::engine::BoundedQueue;
use crate::engine::ConsumerPool;
use crate::engine::QueuedWork;
use crate::metrics::Metrics;

/// Lifecycle of a [`WorkerServer`] (spec.md §4.E invariant: state only
/// moves forward, `Draining` never accepts new connections).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Init = 0,
    Bound = 1,
    Serving = 2,
    Draining = 3,
    Closed = 4,
}

impl From<u8> for ServerState {
    fn from(value: u8) -> Self {
        match value {
            0 => ServerState::Init,
            1 => ServerState::Bound,
            2 => ServerState::Serving,
            3 => ServerState::Draining,
            _ => ServerState::Closed,
        }
    }
}

pub struct WorkerServer {
    identity: WorkerIdentity,
    addr: SocketAddr,
    queue: BoundedQueue,
    consumers: ConsumerPool,
    handlers: Arc<HandlerRegistry>,
    resolver: Arc<dyn DomainTaskResolver>,
    metrics: Arc<Metrics>,
    state: AtomicU8,
}

impl WorkerServer {
    pub fn new(
        identity: WorkerIdentity,
        addr: SocketAddr,
        queue_size: usize,
        consumer_count: u32,
        handlers: Arc<HandlerRegistry>,
        resolver: Arc<dyn DomainTaskResolver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (queue, receiver) = BoundedQueue::new(queue_size);
        let depth = queue_depth_handle(&queue);
        let consumers = ConsumerPool::spawn(
            consumer_count,
            receiver,
            depth,
            handlers.clone(),
            resolver.clone(),
            metrics.clone(),
        );
        Self {
            identity,
            addr,
            queue,
            consumers,
            handlers,
            resolver,
            metrics,
            state: AtomicU8::new(ServerState::Init as u8),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Binds the listening socket with `SO_REUSEPORT` so multiple worker
    /// processes can share one port, the way the source's
    /// `asyncio.start_server(..., reuse_port=True)` does.
    pub fn bind(&self) -> anyhow::Result<TcpListener> {
        let domain = match self.addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.addr.into())?;
        socket.listen(1024)?;
        let std_listener: StdTcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        self.set_state(ServerState::Bound);
        Ok(listener)
    }

    /// Runs the accept loop until `shutdown` flips the state to
    /// `Draining`. Each connection is handled on its own task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        self.set_state(ServerState::Serving);
        loop {
            if self.state() != ServerState::Serving {
                break;
            }
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_connection(stream).await {
                            debug!(%peer, error = %err, "connection closed with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    }

    /// Stops accepting new connections. Existing connections and queued
    /// work are left to finish; the caller drops the server once the
    /// queue drains to move to `Closed`.
    pub fn begin_draining(&self) {
        self.set_state(ServerState::Draining);
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;

        let reply_bytes = match codec::decode_request(&buf) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(err) => codec::encode_reply(&Reply::DecodeError {
                message: err.to_string(),
            })?,
        };

        stream.write_all(&reply_bytes).await?;
        stream.shutdown().await?;
        Ok(())
    }

    async fn dispatch(&self, envelope: Envelope) -> Vec<u8> {
        match envelope {
            Envelope::Control(text) => self.control_reply(&text),
            Envelope::Func(mut call) => {
                self.metrics.increment_tasks_received(&call.handler_id);
                let handler_id = call.handler_id.clone();
                let correlation_id = new_task_id();
                call.correlation_id = Some(correlation_id);
                debug!(%correlation_id, handler_id = %handler_id, "dispatching immediate func call");
                let reply = match execute_func_isolated(self.handlers.clone(), call).await {
                    Ok(reply) => reply,
                    Err(err) => Reply::exception("JoinError", err.to_string()),
                };
                if matches!(reply, Reply::Exception { .. }) {
                    self.metrics.increment_tasks_failed(&handler_id);
                } else {
                    self.metrics.increment_tasks_processed(&handler_id);
                }
                codec::encode_reply(&reply).unwrap_or_default()
            }
            Envelope::Queue(queue_call) => self.dispatch_queue_call(queue_call).await,
            Envelope::DomainTask(mut task_call) => {
                let correlation_id = new_task_id();
                task_call.correlation_id = Some(correlation_id);
                let task_repr = format!("{task_call:?}");
                match self.queue.try_enqueue(QueuedWork::DomainTask(task_call)) {
                    Ok(()) => {
                        self.metrics.set_queue_depth(self.queue.len());
                        debug!(%correlation_id, "domain task queued");
                        codec::encode_reply(&Reply::Queued {
                            task_id: correlation_id,
                        })
                        .unwrap_or_default()
                    }
                    Err(_) => {
                        self.metrics.increment_queue_full();
                        warn!(%correlation_id, "domain task queue full, discarding task");
                        codec::encode_reply(&Reply::QueueFull {
                            message: format!(
                                "Worker {} Queue is Full, discarding Task {}",
                                self.identity.name, task_repr
                            ),
                        })
                        .unwrap_or_default()
                    }
                }
            }
        }
    }

    async fn dispatch_queue_call(&self, queue_call: QueueCall) -> Vec<u8> {
        let QueueCall { mut call, queued } = queue_call;
        self.metrics.increment_tasks_received(&call.handler_id);
        let correlation_id = new_task_id();
        call.correlation_id = Some(correlation_id);
        if queued {
            let call_repr = format!("{call:?}");
            match self.queue.try_enqueue(QueuedWork::Func(call)) {
                Ok(()) => {
                    self.metrics.set_queue_depth(self.queue.len());
                    debug!(%correlation_id, "func call queued");
                    codec::encode_reply(&Reply::Queued {
                        task_id: correlation_id,
                    })
                    .unwrap_or_default()
                }
                Err(_) => {
                    self.metrics.increment_queue_full();
                    warn!(%correlation_id, "func queue full, discarding task");
                    codec::encode_reply(&Reply::QueueFull {
                        message: format!(
                            "Worker {} Queue is Full, discarding Task {}",
                            self.identity.name, call_repr
                        ),
                    })
                    .unwrap_or_default()
                }
            }
        } else {
            let handler_id = call.handler_id.clone();
            debug!(%correlation_id, handler_id = %handler_id, "dispatching immediate func call");
            let reply = match execute_func_isolated(self.handlers.clone(), call).await {
                Ok(reply) => reply,
                Err(err) => Reply::exception("JoinError", err.to_string()),
            };
            if matches!(reply, Reply::Exception { .. }) {
                self.metrics.increment_tasks_failed(&handler_id);
            } else {
                self.metrics.increment_tasks_processed(&handler_id);
            }
            codec::encode_reply(&reply).unwrap_or_default()
        }
    }

    fn control_reply(&self, text: &str) -> Vec<u8> {
        let worker = WorkerStatus {
            name: self.identity.name.clone(),
            serving: vec![self.addr.to_string()],
        };
        let control = if text == "health" {
            ControlReply::Health {
                queue: QueueStatus {
                    size: self.queue.len(),
                    full: self.queue.is_full(),
                    empty: self.queue.is_empty(),
                    consumers: self.consumers.len(),
                },
                worker,
            }
        } else {
            ControlReply::Pong {
                pong: "Empty data".to_string(),
                worker,
            }
        };
        codec::encode_control_reply(&control).unwrap_or_default()
    }
}

fn queue_depth_handle(queue: &BoundedQueue) -> Arc<std::sync::atomic::AtomicUsize> {
    queue.depth_handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qw_handlers::domain::shell::ShellDomainTaskResolver;
    use qw_handlers::examples::default_registry;
    use qw_messages::ArgValue;

    fn test_server(addr: SocketAddr) -> Arc<WorkerServer> {
        let identity = WorkerIdentity::new("qw", "127.0.0.1".to_string(), addr.port(), 0, 1);
        Arc::new(WorkerServer::new(
            identity,
            addr,
            4,
            2,
            Arc::new(default_registry()),
            Arc::new(ShellDomainTaskResolver::new(vec![])),
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn health_control_reports_queue_status() {
        let server = test_server("127.0.0.1:0".parse().unwrap());
        let bytes = server.control_reply("health");
        let reply: ControlReply = codec::decode_control_reply(&bytes).unwrap();
        match reply {
            ControlReply::Health { queue, .. } => assert!(queue.empty),
            ControlReply::Pong { .. } => panic!("expected health reply"),
        }
    }

    #[tokio::test]
    async fn immediate_func_dispatch_returns_value() {
        let server = test_server("127.0.0.1:0".parse().unwrap());
        let call = qw_messages::envelope::FuncCall::new("increment", vec![ArgValue::Int(1)]);
        let bytes = server.dispatch(Envelope::Func(call)).await;
        let reply = codec::decode_reply(&bytes).unwrap();
        assert_eq!(reply, Reply::Value(ArgValue::Int(2)));
    }

    #[tokio::test]
    async fn queued_domain_task_is_accepted() {
        let server = test_server("127.0.0.1:0".parse().unwrap());
        let call = qw_messages::envelope::DomainTaskCall {
            program: "sh".to_string(),
            task: "run".to_string(),
            extra_args: vec![],
            kwargs: Default::default(),
            host: "localhost".to_string(),
            debug: false,
            correlation_id: None,
        };
        let bytes = server.dispatch(Envelope::DomainTask(call)).await;
        let reply = codec::decode_reply(&bytes).unwrap();
        assert!(matches!(reply, Reply::Queued { .. }));
    }
}
