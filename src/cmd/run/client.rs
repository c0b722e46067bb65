use std::time::Duration;

use rama::{
    Layer as _, Service as _,
    error::OpaqueError,
    http::{
        Body, Request, Response,
        client::EasyHttpWebClient,
        layer::{
            map_request_body::MapRequestBodyLayer, map_response_body::MapResponseBodyLayer,
            timeout::TimeoutLayer,
        },
    },
    layer::MapErrLayer,
    service::BoxService,
};

/// Create the web client used to drive traffic against the target.
///
/// Transport concerns (TLS, connection pooling, timeouts) live entirely in
/// this stack; the dispatch loop treats the client as an opaque service.
/// An elapsed timeout surfaces as a regular transport error on the request
/// that hit it, it never affects other in-flight requests.
pub(super) fn new_web_client() -> BoxService<Request, Response, OpaqueError> {
    let inner_https_client = EasyHttpWebClient::default();
    (
        MapResponseBodyLayer::new(Body::new),
        MapErrLayer::new(OpaqueError::from_std),
        TimeoutLayer::new(Duration::from_secs(60)),
        MapRequestBodyLayer::new(Body::new),
    )
        .into_layer(inner_https_client)
        .boxed()
}
