pub mod dispatch;
pub mod handlers;

pub use dispatch::IntentDispatcher;
pub use handlers::{CORE_HANDLER, CoreHandler, compose_capabilities};

use std::sync::Arc;

use lisa_core::HandlerUid;
use lisa_hooks::default_answer_rule;
use lisa_plugins::HandlerRegistry;

/// Register the core handler, its capability intents and the default
/// answer rule. Store records of the same names still take precedence.
pub async fn register_core(registry: &HandlerRegistry, core: CoreHandler) -> anyhow::Result<HandlerUid> {
    let uid = registry.register(CoreHandler::manifest(), Arc::new(core)).await?;
    registry.ensure_rule(default_answer_rule()).await;
    Ok(uid)
}
