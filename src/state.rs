use crate::auth::ApiAuth;
use crate::push::Engine;
use crate::push::registry::SubscriptionRegistry;
use crate::push::vapid::VapidConfigStatus;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub(crate) auth: Option<ApiAuth>,
}

impl AppState {
    pub(crate) fn registry(&self) -> &SubscriptionRegistry {
        self.engine.dispatcher().registry()
    }

    pub(crate) fn vapid(&self) -> &VapidConfigStatus {
        self.engine.dispatcher().vapid()
    }
}
