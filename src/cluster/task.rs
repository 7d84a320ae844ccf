use crate::rpc::{AdminTask, NodeTransport, TaskReply, TaskResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub(crate) fn create(logger: slog::Logger, transport: Arc<dyn NodeTransport>) -> (NodeTaskQueues, mpsc::UnboundedReceiver<TaskReply>) {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let queues = NodeTaskQueues {
        logger,
        transport,
        senders: Mutex::new(HashMap::new()),
        pending: Mutex::new(HashMap::new()),
        replies: reply_tx,
    };

    (queues, reply_rx)
}

/// A task that was handed to a node worker and has not been answered yet.
#[derive(Clone, Debug)]
pub struct PendingTask {
    pub node_addr: String,
    pub partition_id: u64,
    pub name: &'static str,
    pub enqueued_at: Instant,
}

/// One send queue per node. Each queue is drained by its own worker, whose responses all flow
/// into the single reply channel returned by [`create`].
pub(crate) struct NodeTaskQueues {
    logger: slog::Logger,
    transport: Arc<dyn NodeTransport>,
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<AdminTask>>>,
    pending: Mutex<HashMap<u64, PendingTask>>,
    replies: mpsc::UnboundedSender<TaskReply>,
}

impl NodeTaskQueues {
    /// Starts the worker for `addr`. The worker ends once its queue is dropped.
    pub(crate) fn register_node(&self, addr: &str) {
        let mut senders = self.senders.lock().expect("NodeTaskQueues.senders lock guard poison");
        if senders.contains_key(addr) {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = NodeTaskWorker {
            logger: self.logger.new(slog::o!("NodeAddr" => addr.to_string())),
            addr: addr.to_string(),
            transport: self.transport.clone(),
            receiver: rx,
            replies: self.replies.clone(),
        };
        tokio::spawn(worker.run_event_loop());
        senders.insert(addr.to_string(), tx);
    }

    /// Fire-and-forget. The response arrives later on the reply channel.
    pub(crate) fn enqueue(&self, addr: &str, task: AdminTask) -> bool {
        let sender = self
            .senders
            .lock()
            .expect("NodeTaskQueues.senders lock guard poison")
            .get(addr)
            .cloned();
        let sender = match sender {
            Some(sender) => sender,
            None => {
                slog::warn!(self.logger, "No task queue for {}, dropping {}", addr, task.request.name());
                return false;
            }
        };

        let task_id = task.id;
        self.pending().insert(
            task_id,
            PendingTask {
                node_addr: addr.to_string(),
                partition_id: task.partition_id,
                name: task.request.name(),
                enqueued_at: Instant::now(),
            },
        );
        if sender.send(task).is_err() {
            self.pending().remove(&task_id);
            slog::warn!(self.logger, "Task queue for {} is closed", addr);
            return false;
        }
        true
    }

    /// Removes the pending entry for an answered task.
    pub(crate) fn complete(&self, task_id: u64) -> Option<PendingTask> {
        self.pending().remove(&task_id)
    }

    pub(crate) fn pending_tasks(&self) -> Vec<PendingTask> {
        self.pending().values().cloned().collect()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingTask>> {
        self.pending.lock().expect("NodeTaskQueues.pending lock guard poison")
    }
}

struct NodeTaskWorker {
    logger: slog::Logger,
    addr: String,
    transport: Arc<dyn NodeTransport>,
    receiver: mpsc::UnboundedReceiver<AdminTask>,
    replies: mpsc::UnboundedSender<TaskReply>,
}

impl NodeTaskWorker {
    async fn run_event_loop(mut self) {
        while let Some(task) = self.receiver.recv().await {
            let response = match self.transport.send_admin_task(&self.addr, &task).await {
                Ok(response) => response,
                Err(e) => {
                    slog::warn!(self.logger, "{} task {} not delivered: {}", task.request.name(), task.id, e);
                    TaskResponse::failure_for(&task.request, e.to_string())
                }
            };

            let reply = TaskReply {
                node_addr: self.addr.clone(),
                task_id: task.id,
                partition_id: task.partition_id,
                response,
            };
            if self.replies.send(reply).is_err() {
                slog::debug!(self.logger, "Reply channel closed, stopping task worker");
                return;
            }
        }
    }
}
