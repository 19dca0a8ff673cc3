mod oauth;
mod proxy;

pub use oauth::OauthError;
pub use proxy::{ApiErrorBody, ApiErrorObject, ProxyError};

/// Whether a failure is worth an automatic retry by the caller (adapter `forward`
/// loop, OAuth refresh-once retry). Distinct from the `Retry/Reroute Engine`'s own
/// 429/401 state machine, which inspects HTTP status directly rather than this trait.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
