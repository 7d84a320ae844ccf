use crate::util::supervised;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

/// Keeps a background ticker alive. Dropping the handle stops the loop before its next tick.
pub(crate) struct TickerHandle {
    stop_signal: Arc<AtomicBool>,
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
    }
}

/// Spawns a loop that calls `on_tick` every `period`, passing a monotonically increasing tick
/// number. Each tick runs supervised, so an iteration that panics is logged and the loop moves on
/// to the next tick.
pub(crate) fn spawn_ticker<F, Fut>(logger: slog::Logger, name: &'static str, period: Duration, on_tick: F) -> TickerHandle
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let stop_signal = Arc::new(AtomicBool::new(false));
    let stop_check = stop_signal.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick of a tokio interval completes immediately.
        interval.tick().await;

        let mut tick: u64 = 0;
        loop {
            interval.tick().await;
            if stop_check.load(Ordering::Acquire) {
                slog::debug!(logger, "Ticker '{}' stopped", name);
                return;
            }

            tick = tick.wrapping_add(1);
            let _ = supervised(&logger, name, on_tick(tick)).await;
        }
    });

    TickerHandle { stop_signal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn ticks_until_handle_dropped() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = counter.clone();
        let handle = spawn_ticker(logger(), "test", Duration::from_millis(10), move |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(counter.load(Ordering::SeqCst) >= 2);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(after_stop, counter.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_tick_does_not_kill_loop() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = counter.clone();
        let _handle = spawn_ticker(logger(), "flaky", Duration::from_millis(10), move |tick| {
            let counter = counter_clone.clone();
            async move {
                if tick == 1 {
                    panic!("first tick fails");
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
