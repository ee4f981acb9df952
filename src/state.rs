use crate::client::EiaClient;

/// Shared application state passed to all request handlers.
///
/// Nothing is cached between requests; every handler goes back to the API
/// through the shared client, which owns the pooled HTTP connections.
pub struct AppState {
    pub client: EiaClient,
}

impl AppState {
    pub fn new(client: EiaClient) -> Self {
        Self { client }
    }
}
