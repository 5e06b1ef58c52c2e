//! Execution engine (spec.md §4.F): a bounded FIFO queue feeding a fixed
//! pool of consumers for queued and domain-task work, plus an isolated
//! executor for immediate `Func` calls.
//!
//! Grounded on the teacher's worker-pool shape in
//! `lgn-worker/src/manager/mod.rs` (a fixed set of long-lived consumer
//! tasks draining a shared channel), generalized from gRPC job messages
//! to the spec's `Envelope` variants.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use qw_handlers::domain::run_domain_task;
use qw_handlers::domain::DomainTaskResolver;
use qw_handlers::HandlerRegistry;
use qw_messages::envelope::DomainTaskCall;
use qw_messages::envelope::FuncCall;
use qw_messages::Reply;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::metrics::Metrics;

/// A unit of work accepted onto the bounded queue.
pub enum QueuedWork {
    Func(FuncCall),
    DomainTask(DomainTaskCall),
}

impl QueuedWork {
    fn label(&self) -> &str {
        match self {
            QueuedWork::Func(call) => &call.handler_id,
            QueuedWork::DomainTask(call) => &call.program,
        }
    }
}

/// Wraps `mpsc::channel` with the depth accounting spec.md §6.1's
/// `queue_size` and the health reply's `QueueStatus` need.
#[derive(Clone)]
pub struct BoundedQueue {
    tx: mpsc::Sender<QueuedWork>,
    capacity: usize,
    depth: Arc<AtomicUsize>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedWork>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                capacity,
                depth: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Exposes the shared depth counter so a [`ConsumerPool`] can
    /// decrement it as work is dequeued.
    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        self.depth.clone()
    }

    /// Attempts to enqueue without blocking. Returns the work back on
    /// failure so the caller can reply `Reply::QueueFull`.
    pub fn try_enqueue(&self, work: QueuedWork) -> Result<(), QueuedWork> {
        match self.tx.try_send(work) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(work)) => Err(work),
            Err(mpsc::error::TrySendError::Closed(work)) => Err(work),
        }
    }
}

/// A fixed pool of consumer tasks draining a [`BoundedQueue`]'s receiver.
/// Dropping the pool aborts every consumer, matching the server's
/// Draining -> Closed shutdown (spec.md §4.E).
pub struct ConsumerPool {
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn spawn(
        count: u32,
        receiver: mpsc::Receiver<QueuedWork>,
        depth: Arc<AtomicUsize>,
        handlers: Arc<HandlerRegistry>,
        resolver: Arc<dyn DomainTaskResolver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(count as usize);
        for _ in 0..count.max(1) {
            let receiver = receiver.clone();
            let depth = depth.clone();
            let handlers = handlers.clone();
            let resolver = resolver.clone();
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let work = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(work) = work else {
                        break;
                    };
                    depth.fetch_sub(1, Ordering::Relaxed);
                    run_queued(work, &handlers, resolver.as_ref(), &metrics).await;
                }
            }));
        }
        Self { handles }
    }
}

impl Drop for ConsumerPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_queued(
    work: QueuedWork,
    handlers: &HandlerRegistry,
    resolver: &dyn DomainTaskResolver,
    metrics: &Metrics,
) {
    let label = work.label().to_string();
    metrics.increment_tasks_received(&label);
    let started = Instant::now();
    let failed = match work {
        QueuedWork::Func(call) => {
            let correlation_id = call.correlation_id;
            match handlers.call(&call.handler_id, call.args, call.kwargs).await {
                Ok(_) => false,
                Err(err) => {
                    warn!(?correlation_id, handler_id = %call.handler_id, error = %err, "queued func call failed");
                    true
                }
            }
        }
        QueuedWork::DomainTask(call) => {
            let correlation_id = call.correlation_id;
            match run_domain_task(resolver, &call).await {
                Ok(_) => false,
                Err(err) => {
                    warn!(?correlation_id, program = %call.program, task = %call.task, error = %err, "queued domain task failed");
                    true
                }
            }
        }
    };
    metrics.observe_task_processing_duration(&label, started.elapsed().as_secs_f64());
    if failed {
        metrics.increment_tasks_failed(&label);
    } else {
        metrics.increment_tasks_processed(&label);
    }
}

/// Runs a `Func` call to completion, turning handler errors into
/// `Reply::Exception` rather than surfacing them as transport failures
/// (spec.md §7).
pub async fn execute_func(handlers: &HandlerRegistry, call: FuncCall) -> Reply {
    match handlers.call(&call.handler_id, call.args, call.kwargs).await {
        Ok(value) => Reply::Value(value),
        Err(err) => Reply::exception("HandlerError", err.to_string()),
    }
}

/// Runs a `Func` call on a freshly built single-threaded runtime inside
/// `spawn_blocking`, isolating it from the accept loop the way the
/// source isolates each immediate call in its own process (spec.md §4.F,
/// "isolated execution context").
pub fn execute_func_isolated(
    handlers: Arc<HandlerRegistry>,
    call: FuncCall,
) -> JoinHandle<Reply> {
    tokio::task::spawn_blocking(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                return Reply::exception("RuntimeError", format!("failed to isolate call: {err}"))
            }
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runtime.block_on(execute_func(&handlers, call))
        }));
        match result {
            Ok(reply) => reply,
            Err(_) => Reply::exception("PanicError", "handler panicked"),
        }
    })
}

/// Generates the id surfaced to the client as `Reply::Queued { task_id }`.
pub fn new_task_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qw_handlers::examples::default_registry;
    use qw_messages::ArgValue;

    #[tokio::test]
    async fn isolated_execution_runs_the_handler() {
        let handlers = Arc::new(default_registry());
        let call = FuncCall::new("increment", vec![ArgValue::Int(41)]);
        let reply = execute_func_isolated(handlers, call).await.unwrap();
        assert_eq!(reply, Reply::Value(ArgValue::Int(42)));
    }

    #[test]
    fn bounded_queue_rejects_past_capacity() {
        let (queue, _rx) = BoundedQueue::new(1);
        assert!(queue
            .try_enqueue(QueuedWork::Func(FuncCall::new("echo", vec![])))
            .is_ok());
        assert!(queue.is_full());
        assert!(queue
            .try_enqueue(QueuedWork::Func(FuncCall::new("echo", vec![])))
            .is_err());
    }
}
