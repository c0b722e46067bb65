use std::{sync::Arc, time::Duration};

use rama::{graceful::ShutdownGuard, telemetry::tracing};
use tokio::time::sleep;

use crate::flag::ControlFlag;

use super::executor::RequestExecutor;

/// Slack granted after the stop signal is seen, so that requests still in
/// flight get a chance to complete before control returns.
const STOP_GRACE: Duration = Duration::from_secs(60);

/// Launches a fixed-size batch of concurrent requests every tick, forever,
/// until the stop flag is raised.
///
/// The loop never waits for request completion before scheduling the next
/// tick: requests from tick N may still be in flight when tick N+1 starts,
/// so burst concurrency can exceed `batch_size` whenever the backend is
/// slow. There is deliberately no backpressure; a sustained slow backend
/// grows the in-flight set without bound.
pub(super) struct Dispatcher<F> {
    executor: Arc<RequestExecutor>,
    stop: F,
    batch_size: u32,
    tick: Duration,
    grace: Duration,

    /// Next request identifier. The dispatch loop is the only writer and
    /// increments before each hand-off, which keeps rids unique and
    /// strictly increasing under concurrent batch fan-out.
    next_rid: u64,
}

impl<F: ControlFlag> Dispatcher<F> {
    pub(super) fn new(
        executor: RequestExecutor,
        stop: F,
        batch_size: u32,
        tick: Duration,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            stop,
            batch_size: batch_size.max(1),
            tick,
            grace: STOP_GRACE,
            next_rid: 1,
        }
    }

    #[cfg(test)]
    fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub(super) async fn run(mut self, guard: ShutdownGuard) {
        while !self.stop.is_raised() {
            for _ in 0..self.batch_size {
                let rid = self.next_rid;
                self.next_rid += 1;

                let executor = self.executor.clone();
                guard.spawn_task_fn(async move |_guard| {
                    let _ = executor.execute(rid).await;
                });
            }

            tokio::select! {
                _ = guard.cancelled() => {
                    tracing::error!("exit dispatch loop early: guard shutdown");
                    return;
                }
                _ = sleep(self.tick) => {}
            }
        }

        tracing::warn!(
            "stop signal detected; wait {:?} for in-flight requests to complete",
            self.grace,
        );
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::error!("exit stop grace period early: guard shutdown");
            }
            _ = sleep(self.grace) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::StaticFlag;
    use rama::{
        Service as _,
        error::OpaqueError,
        graceful::Shutdown,
        http::{
            Request, Response,
            service::web::response::{IntoResponse, Json},
        },
        service::{BoxService, service_fn},
    };
    use std::sync::Mutex;
    use tokio::{task::yield_now, time};

    const TICK: Duration = Duration::from_secs(10);
    const GRACE: Duration = Duration::from_secs(60);

    /// Client that records the rid of every request it receives.
    fn capture_client(
        rids: Arc<Mutex<Vec<u64>>>,
    ) -> BoxService<Request, Response, OpaqueError> {
        service_fn(move |req: Request| {
            let rids = rids.clone();
            async move {
                let rid = req
                    .uri()
                    .query()
                    .and_then(|q| q.strip_prefix("rid="))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default();
                rids.lock().unwrap().push(rid);
                Ok::<_, OpaqueError>(Json(serde_json::json!({"rid": rid})).into_response())
            }
        })
        .boxed()
    }

    fn dispatcher(
        rids: Arc<Mutex<Vec<u64>>>,
        stop: StaticFlag,
        batch_size: u32,
    ) -> Dispatcher<StaticFlag> {
        let executor = RequestExecutor::new(capture_client(rids), "http://localhost/status");
        Dispatcher::new(executor, stop, batch_size, TICK).with_grace(GRACE)
    }

    async fn settle() {
        for _ in 0..16 {
            yield_now().await;
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn launches_exact_batch_per_tick_until_stopped() {
        time::pause();

        let rids = Arc::new(Mutex::new(Vec::new()));
        let stop = StaticFlag::default();

        let shutdown = Shutdown::new(std::future::pending::<()>());
        let h = tokio::spawn(dispatcher(rids.clone(), stop.clone(), 5).run(shutdown.guard()));

        settle().await;
        assert_eq!(rids.lock().unwrap().len(), 5);

        time::advance(TICK).await;
        settle().await;
        assert_eq!(rids.lock().unwrap().len(), 10);

        stop.raise();
        time::advance(TICK).await;
        settle().await;

        // stop observed at the top of the tick: no new batch, grace pending
        assert_eq!(rids.lock().unwrap().len(), 10);
        assert!(!h.is_finished());

        time::advance(GRACE).await;
        h.await.expect("task join");
        assert_eq!(rids.lock().unwrap().len(), 10);

        // rids are unique and strictly increasing per assignment order
        let mut seen = rids.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn raised_stop_flag_skips_all_batches() {
        time::pause();

        let rids = Arc::new(Mutex::new(Vec::new()));
        let stop = StaticFlag::default();
        stop.raise();

        let shutdown = Shutdown::new(std::future::pending::<()>());
        let h = tokio::spawn(dispatcher(rids.clone(), stop, 5).run(shutdown.guard()));

        settle().await;
        assert!(!h.is_finished());

        time::advance(GRACE).await;
        h.await.expect("task join");
        assert!(rids.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn batch_size_is_normalized_to_at_least_one() {
        time::pause();

        let rids = Arc::new(Mutex::new(Vec::new()));
        let stop = StaticFlag::default();

        let shutdown = Shutdown::new(std::future::pending::<()>());
        let h = tokio::spawn(dispatcher(rids.clone(), stop.clone(), 0).run(shutdown.guard()));

        settle().await;
        assert_eq!(rids.lock().unwrap().len(), 1);

        stop.raise();
        time::advance(TICK).await;
        settle().await;
        time::advance(GRACE).await;
        h.await.expect("task join");
    }
}
