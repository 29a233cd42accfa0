//! Response status handling shared by the OpenAI endpoints.

use prism::{Error, Result};
use reqwest::{Response, StatusCode};

/// Map a non-success response to the matching error variant, keeping the
/// response body as context. Server errors map to [`Error::Http`] so the
/// retry layer treats them as transient.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("OpenAI API error {status}: {body}");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit(message),
        _ if status.is_server_error() => Error::Http(message),
        _ => Error::api(message),
    })
}
