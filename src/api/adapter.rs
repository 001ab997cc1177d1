//! Translation between API Gateway proxy events and HTTP requests/responses.

use aws_lambda_events::encodings::Body as EventBody;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde_json::Value;
use tower::util::ServiceExt;
use tracing::{debug, error, warn};

use crate::utils::error::{RdsPoolError, Result};

pub use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    /// Every header pair, duplicates kept
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Decode a platform event into a request.
pub fn decode(event: ApiGatewayProxyRequest) -> Result<HttpRequest> {
    let path = match event.path {
        Some(path) if path.starts_with('/') => path,
        other => return Err(RdsPoolError::Decode(format!("invalid path {:?}", other))),
    };

    let body = match event.body {
        None => Bytes::new(),
        Some(body) if event.is_base64_encoded => STANDARD
            .decode(body.as_bytes())
            .map(Bytes::from)
            .map_err(|e| RdsPoolError::Decode(format!("invalid base64 body: {}", e)))?,
        Some(body) => Bytes::from(body),
    };

    // multiValueHeaders is a superset of headers when the platform sends both.
    let headers = if event.multi_value_headers.is_empty() {
        event.headers
    } else {
        event.multi_value_headers
    };

    Ok(HttpRequest {
        method: event.http_method,
        path,
        headers,
        body,
    })
}

/// Encode a response as the platform's response event.
pub fn encode(response: HttpResponse) -> ApiGatewayProxyResponse {
    let mut headers = HeaderMap::new();
    for name in response.headers.keys() {
        if let Some(value) = response.headers.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    ApiGatewayProxyResponse {
        status_code: i64::from(response.status.as_u16()),
        headers,
        multi_value_headers: response.headers,
        body: Some(EventBody::Text(
            String::from_utf8_lossy(&response.body).into_owned(),
        )),
        is_base64_encoded: false,
    }
}

impl HttpRequest {
    pub fn into_http(self) -> Result<Request<Body>> {
        let mut builder = Request::builder().method(self.method).uri(&self.path);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }

        builder
            .body(Body::from(self.body))
            .map_err(|e| RdsPoolError::Decode(e.to_string()))
    }
}

impl HttpResponse {
    pub async fn from_http(response: Response<Body>) -> Result<Self> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| RdsPoolError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    fn from_error(err: &RdsPoolError) -> Self {
        let body = match serde_json::to_vec(&err.error_response()) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize error response: {}", e);
                Vec::new()
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Self {
            status: err.status_code(),
            headers,
            body: Bytes::from(body),
        }
    }
}

/// Run one platform event through the router.
///
/// Never fails: malformed events and routing errors become error responses.
pub async fn handle_event(router: Router, event: Value) -> ApiGatewayProxyResponse {
    match dispatch(router, event).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request failed: {}", e);
            encode(HttpResponse::from_error(&e))
        }
    }
}

async fn dispatch(router: Router, event: Value) -> Result<ApiGatewayProxyResponse> {
    let event: ApiGatewayProxyRequest = serde_json::from_value(event)
        .map_err(|e| RdsPoolError::Decode(format!("not a proxy event: {}", e)))?;
    let request = decode(event)?;
    debug!(method = %request.method, path = %request.path, "Dispatching request");

    let response = match router.oneshot(request.into_http()?).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let response = HttpResponse::from_http(response).await?;
    if response.status.is_server_error() {
        error!(status = response.status.as_u16(), "Handler failed");
    }
    Ok(encode(response))
}
