use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::conversation::ConversationEngine;
use crate::services::messaging::MessagingProvider;

pub struct AppState {
    pub config: AppConfig,
    pub engine: ConversationEngine,
    pub messaging: Arc<dyn MessagingProvider>,
}
