//! Response checks shared by the HTTP adapters.

use std::time::Duration;

use outreach_shared::ProviderError;

/// User-Agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("outreach/", env!("CARGO_PKG_VERSION"));

/// Map a transport failure to a [`ProviderError`].
pub(crate) fn transport_error(context: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::from_transport(context, err, err.is_timeout())
}

/// Check an HTTP response for common error conditions.
///
/// - 429 becomes [`ProviderError::RateLimited`], honoring `Retry-After`
///   when it holds a number of seconds
/// - 404 becomes [`ProviderError::NotFound`]
/// - any other non-success status becomes [`ProviderError::Network`]
pub(crate) async fn check_response(
    resp: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            retry_after: parse_retry_after(&resp),
        });
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(context.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(ProviderError::Network(format!("{context}: HTTP {status}: {body}")));
    }
    Ok(resp)
}

fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
