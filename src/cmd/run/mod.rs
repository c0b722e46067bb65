use std::time::Duration;

use rama::{
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    http::Uri,
    telemetry::tracing,
};

use clap::Args;

use crate::{config::ClientConfig, flag::FileFlag};

mod client;
mod dispatcher;
mod executor;

use self::{dispatcher::Dispatcher, executor::RequestExecutor};

#[derive(Debug, Clone, Args)]
/// drive rate-controlled request batches against a target endpoint
pub struct RunCommand {
    #[clap(flatten)]
    config: ClientConfig,
}

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), OpaqueError> {
    let cfg = args.config;

    // refuse to start with an unusable target instead of
    // logging network errors forever
    cfg.target
        .parse::<Uri>()
        .with_context(|| format!("parse target URL '{}'", cfg.target))?;

    if !(cfg.tick.is_finite() && cfg.tick > 0.) {
        return Err(OpaqueError::from_display(
            "tick must be a positive number of seconds",
        ));
    }
    let tick = Duration::from_secs_f64(cfg.tick);
    let batch_size = cfg.batch_size.max(1);

    tracing::info!(
        url = %cfg.target,
        %batch_size,
        ?tick,
        stop_file = %cfg.stop_file.display(),
        "start sending request batches",
    );

    let web_client = self::client::new_web_client();
    let executor = RequestExecutor::new(web_client, cfg.target);
    let stop = FileFlag::new(cfg.stop_file);

    Dispatcher::new(executor, stop, batch_size, tick)
        .run(guard)
        .await;

    tracing::info!("dispatch loop done: return control");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::mock::ResponseEngine,
        config::{EndpointEntry, EndpointTable},
        flag::StaticFlag,
    };
    use rama::{
        graceful::Shutdown,
        http::server::HttpServer,
        net::socket::Interface,
        rt::Executor,
        tcp::server::TcpListener,
    };
    use rand::{SeedableRng as _, rngs::SmallRng};
    use std::sync::Arc;

    /// Full loopback round trip: real listener, real web client.
    #[tokio::test]
    async fn round_trip_against_live_mock_server() {
        let engine = ResponseEngine::new_with_rng(
            "1.2.3".to_owned(),
            "mock-host".to_owned(),
            EndpointTable::try_from_entries(vec![EndpointEntry {
                path: "/status".to_owned(),
                delay: 0.,
                http_500_probability: 0.,
                response_code: 200,
            }])
            .expect("validate endpoints"),
            StaticFlag::default(),
            SmallRng::seed_from_u64(1),
        );

        let shutdown = Shutdown::new(std::future::pending::<()>());
        let exec = Executor::graceful(shutdown.guard());

        let listener = TcpListener::bind(
            "127.0.0.1:0".parse::<Interface>().expect("parse interface"),
            exec.clone(),
        )
        .await
        .expect("bind loopback listener");
        let addr = listener.local_addr().expect("bound address");

        let http_server = HttpServer::auto(exec).service(Arc::new(engine));
        shutdown
            .guard()
            .spawn_task_fn(async move |_guard| listener.serve(http_server).await);

        let web_client = super::client::new_web_client();
        let executor = RequestExecutor::new(web_client, format!("http://{addr}/status"));

        match executor.execute(42).await {
            executor::RequestOutcome::Success { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(body["version"], "1.2.3");
                assert_eq!(body["hostname"], "mock-host");
                assert_eq!(body["rid"], "42");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
