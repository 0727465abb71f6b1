use std::sync::Arc;

use pushmon_storage::MetricStore;

/// Shared handles reachable from every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricStore>,
    /// Shared HMAC secret; `None` disables signature checks and response
    /// signing.
    pub hash_key: Option<Arc<String>>,
}
