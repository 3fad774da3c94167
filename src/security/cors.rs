//! CORS policy from configuration.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{CorsOptions, ValidationError};

/// Build the CORS layer.
///
/// A wildcard origin never allows credentials; browsers reject that combination.
pub fn cors_layer(opts: &CorsOptions) -> Result<CorsLayer, ValidationError> {
    let methods = opts
        .methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| ValidationError::new("methods", format!("'{}' is not a valid method", m)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let headers = opts
        .allowed_headers
        .iter()
        .map(|h| {
            HeaderName::from_bytes(h.trim().as_bytes())
                .map_err(|_| ValidationError::new("allowed_headers", format!("'{}' is not a valid header name", h)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layer = CorsLayer::new().allow_methods(methods).allow_headers(headers);

    if opts.origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = HeaderValue::from_str(opts.origin.trim())
        .map_err(|_| ValidationError::new("origin", format!("'{}' is not a valid origin", opts.origin)))?;

    Ok(layer
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(opts.credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn preflight(opts: CorsOptions, origin: &str) -> axum::response::Response {
        let app = Router::new()
            .route("/orders", get(|| async { "ok" }))
            .layer(cors_layer(&opts).unwrap());
        app.oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/orders")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_wildcard_origin_without_credentials() {
        let response = preflight(CorsOptions::default(), "https://anywhere.test").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .is_none());
    }

    #[tokio::test]
    async fn test_exact_origin_with_credentials() {
        let opts = CorsOptions {
            origin: "https://app.example.com".to_string(),
            ..CorsOptions::default()
        };
        let response = preflight(opts, "https://app.example.com").await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[test]
    fn test_invalid_method() {
        let opts = CorsOptions {
            methods: vec!["GET POST".to_string()],
            ..CorsOptions::default()
        };
        assert_eq!(cors_layer(&opts).unwrap_err().field, "methods");
    }
}
