use std::{convert::Infallible, sync::Arc};

use rama::{
    Layer as _, Service,
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    http::{
        HeaderValue, Request, Response, StatusCode,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::{
            extract::Query,
            response::{IntoResponse, Json},
        },
    },
    net::socket::Interface,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use clap::Args;
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    config::{Endpoint, EndpointTable, ServerConfig},
    flag::{ControlFlag, FileFlag},
};

#[derive(Debug, Clone, Args)]
/// run the mock api server
pub struct MockCommand {
    #[clap(flatten)]
    config: ServerConfig,

    /// network interface to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:8080"
    )]
    pub bind: Interface,
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> Result<(), OpaqueError> {
    let endpoints = EndpointTable::load(&args.config.config).await?;
    tracing::info!(
        version = %args.config.version,
        hostname = %args.config.hostname,
        error_file = %args.config.error_file.display(),
        "endpoint configuration loaded: {} endpoint(s)",
        endpoints.len(),
    );

    let engine = ResponseEngine::new(
        args.config.version,
        args.config.hostname,
        endpoints,
        FileFlag::new(args.config.error_file),
    );

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static("dynbench-mock")),
    )
        .into_layer(Arc::new(engine));

    let exec = Executor::graceful(guard);
    let tcp_listener = TcpListener::bind(args.bind, exec.clone())
        .await
        .map_err(OpaqueError::from_boxed)
        .context("bind mock api server")?;

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock api server")?;
    tracing::info!("mock api server bound to: {server_addr}");

    let http_server = HttpServer::auto(exec).service(Arc::new(http_svc));
    tcp_listener.serve(http_server).await;

    Ok(())
}

/// Decides the simulated response for one inbound request.
///
/// Selection is a short pipeline: forced-error override first, then route
/// lookup, then the configured delay, then one probability draw, then the
/// configured response. The override short-circuits everything, including
/// the 404 for unconfigured paths.
pub(crate) struct ResponseEngine<F> {
    version: String,
    hostname: String,
    endpoints: EndpointTable,
    forced_error: F,
    rng: Mutex<SmallRng>,
}

impl<F: ControlFlag> ResponseEngine<F> {
    pub(crate) fn new(
        version: String,
        hostname: String,
        endpoints: EndpointTable,
        forced_error: F,
    ) -> Self {
        Self::new_with_rng(
            version,
            hostname,
            endpoints,
            forced_error,
            SmallRng::from_os_rng(),
        )
    }

    pub(crate) fn new_with_rng(
        version: String,
        hostname: String,
        endpoints: EndpointTable,
        forced_error: F,
        rng: SmallRng,
    ) -> Self {
        Self {
            version,
            hostname,
            endpoints,
            forced_error,
            rng: Mutex::new(rng),
        }
    }

    /// One uniform draw in `[0, 1)`; each request draws independently.
    async fn draw(&self) -> f64 {
        self.rng.lock().await.random()
    }

    fn forced_error_response(&self, rid: &str) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": format!("Internal Server Error (forced) - {}", self.version),
                "hostname": self.hostname,
                "rid": rid,
            })),
        )
            .into_response()
    }

    fn dynamic_error_response(&self, rid: &str) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": format!("Dynamic Internal Server Error - {}", self.version),
                "hostname": self.hostname,
                "rid": rid,
            })),
        )
            .into_response()
    }

    fn not_found_response(path: &str) -> Response {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "Endpoint not found",
                "path": path,
            })),
        )
            .into_response()
    }

    fn normal_response(&self, endpoint: &Endpoint, rid: &str) -> Response {
        (
            endpoint.status,
            Json(serde_json::json!({
                "version": self.version,
                "hostname": self.hostname,
                "rid": rid,
            })),
        )
            .into_response()
    }
}

impl<F: ControlFlag> Service<Request> for ResponseEngine<F> {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        let rid = rid_label(&req);

        if self.forced_error.is_raised() {
            return Ok(self.forced_error_response(&rid));
        }

        let path = req.uri().path();
        let Some(endpoint) = self.endpoints.lookup(path) else {
            return Ok(Self::not_found_response(path));
        };

        if !endpoint.delay.is_zero() {
            tokio::time::sleep(endpoint.delay).await;
        }

        if self.draw().await < endpoint.http_500_probability {
            return Ok(self.dynamic_error_response(&rid));
        }

        Ok(self.normal_response(endpoint, &rid))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RidQuery {
    rid: Option<String>,
}

/// The `rid` query parameter echoed verbatim, or `"NONE"` when absent.
fn rid_label(req: &Request) -> String {
    req.uri()
        .query()
        .and_then(|query| Query::<RidQuery>::parse_query_str(query).ok())
        .and_then(|Query(RidQuery { rid })| rid)
        .unwrap_or_else(|| "NONE".to_owned())
}
