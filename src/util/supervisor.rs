use std::future::Future;
use tokio::task::JoinHandle;

/// A supervised task panicked or was cancelled before producing a value.
#[derive(Debug, thiserror::Error)]
#[error("Task '{label}' did not complete: {reason}")]
pub struct TaskPanicked {
    pub label: String,
    pub reason: String,
}

/// Runs `future` on its own tokio task and waits for it. A panic inside the task is caught by
/// the runtime and reported as an error to the caller instead of unwinding through it.
pub(crate) async fn supervised<F, T>(logger: &slog::Logger, label: &str, future: F) -> Result<T, TaskPanicked>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    join_supervised(logger, label, tokio::spawn(future)).await
}

/// Waits for an already spawned task, with the same panic handling as [`supervised`]. Lets a
/// caller spawn many tasks first and collect them afterwards.
pub(crate) async fn join_supervised<T>(logger: &slog::Logger, label: &str, handle: JoinHandle<T>) -> Result<T, TaskPanicked> {
    match handle.await {
        Ok(value) => Ok(value),
        Err(join_error) => {
            let reason = if join_error.is_panic() {
                "panicked".to_string()
            } else {
                "cancelled".to_string()
            };
            slog::error!(logger, "Supervised task '{}' {}", label, reason);
            Err(TaskPanicked {
                label: label.to_string(),
                reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn value_is_passed_through() {
        let result = supervised(&logger(), "ok", async { 7 }).await;
        assert_eq!(7, result.unwrap());
    }

    #[tokio::test]
    async fn panic_becomes_error() {
        let result: Result<(), _> = supervised(&logger(), "boom", async { panic!("boom") }).await;
        let err = result.unwrap_err();
        assert_eq!("boom", err.label);
        assert_eq!("panicked", err.reason);
    }

    #[tokio::test]
    async fn aborted_task_is_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = join_supervised(&logger(), "sleepy", handle).await.unwrap_err();
        assert_eq!("cancelled", err.reason);
    }
}
