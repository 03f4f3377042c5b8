// HTTP middleware
// Author: kelexine (https://github.com/kelexine)

use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Create request ID layers for the application
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

/// Inbound body cap. Image-heavy requests arrive base64-encoded.
pub fn body_limit_layer(limit_mb: usize) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(limit_mb.max(1) * 1024 * 1024)
}
