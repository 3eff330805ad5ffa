//! Startup wiring: one explicitly constructed server context, passed to
//! every component.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lisa_config::ServerConfig;
use lisa_core::Catalog;
use lisa_dialog::{DialogEngine, DialogSettings};
use lisa_gateway::{build_acceptor, run_line_server, start_web_server, GatewayState, SessionRegistry, WebBridge};
use lisa_hooks::{register_builtin_actions, ActionRegistry};
use lisa_intents::{register_core, CoreHandler, IntentDispatcher};
use lisa_plugins::{FileStore, HandlerRegistry, MemoryStore, RegistrationStore};
use lisa_scheduler::CronScheduler;

pub struct Server {
    config: ServerConfig,
    catalog: Arc<Catalog>,
    sessions: SessionRegistry,
    handlers: HandlerRegistry,
    engine: DialogEngine,
    dispatcher: Arc<IntentDispatcher>,
    store: Arc<dyn RegistrationStore>,
}

impl Server {
    pub async fn build(config: ServerConfig) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(config.lang_short(), &config.translations));
        let sessions = SessionRegistry::new();
        let handlers = HandlerRegistry::new();

        let settings = DialogSettings {
            confidence_threshold: config.confidence_threshold(),
            question_timeout: config.question_timeout(),
            handler_faults: config.debug.handler_faults,
        };
        let engine = DialogEngine::new(
            sessions.clone(),
            Arc::new(handlers.clone()),
            catalog.clone(),
            settings,
        );

        register_core(&handlers, CoreHandler::new(handlers.clone(), catalog.clone())).await?;

        let store: Arc<dyn RegistrationStore> = match &config.store.path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::default()),
        };
        handlers
            .reload(store.as_ref())
            .await
            .context("Failed to load registration store")?;

        let mut actions = ActionRegistry::new();
        register_builtin_actions(&mut actions);
        let nlu = lisa_nlu::from_config(&config.nlu)?;
        let dispatcher = IntentDispatcher::new(engine.clone(), handlers.clone(), actions, nlu)
            .with_tracing(config.debug.rules, config.debug.nlu);
        dispatcher.declare_global_vars().await;
        let rules = dispatcher
            .sync_rules()
            .await
            .context("Invalid dispatch rule")?;
        info!(rules, "Dispatch rules ready");

        Ok(Self {
            config,
            catalog,
            sessions,
            handlers,
            engine,
            dispatcher: Arc::new(dispatcher),
            store,
        })
    }

    fn gateway(&self) -> GatewayState {
        GatewayState {
            registry: self.sessions.clone(),
            handler: self.dispatcher.clone(),
            catalog: self.catalog.clone(),
            bot_name: self.config.bot_name().to_string(),
            log_frames: self.config.debug.output,
        }
    }

    /// Serve until Ctrl-C, then tear everything down.
    pub async fn run(self) -> Result<()> {
        let tls = &self.config.tls;
        let acceptor = if tls.enabled {
            let cert = tls.cert.as_deref().context("tls.cert is required")?;
            let key = tls.key.as_deref().context("tls.key is required")?;
            Some(build_acceptor(cert, key, tls.client_ca.as_deref())?)
        } else {
            None
        };

        let port = self.config.server.port.context("server.port is required")?;
        let listener = TcpListener::bind((self.config.host(), port))
            .await
            .with_context(|| format!("Cannot bind {}:{}", self.config.host(), port))?;
        let gateway = self.gateway();

        let shutdown = CancellationToken::new();
        tokio::spawn(CronScheduler::new(self.handlers.clone(), self.engine.clone()).run(shutdown.clone()));

        if let Some(web_port) = self.config.server.web_port {
            let addr: SocketAddr = format!("{}:{}", self.config.host(), web_port)
                .parse()
                .context("Invalid web bridge address")?;
            let bridge = WebBridge {
                gateway: gateway.clone(),
                client_name: self.config.web_client_name().to_string(),
                zone: self.config.web_zone().to_string(),
            };
            tokio::spawn(async move {
                if let Err(e) = start_web_server(addr, bridge).await {
                    error!(error = %e, "Web bridge failed");
                }
            });
        }

        self.spawn_reload_on_hangup();

        info!(bot = %self.config.bot_name(), lang = %self.config.lang(), "Lisa server started");
        tokio::select! {
            result = run_line_server(listener, acceptor, gateway) => {
                if let Err(e) = result {
                    error!(error = %e, "Line server stopped");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                }
                info!("Shutdown requested");
            }
        }

        shutdown.cancel();
        self.engine.shutdown().await;
        self.sessions.clear().await;
        info!("Lisa server stopped");
        Ok(())
    }

    /// Reload the registration store on SIGHUP.
    #[cfg(unix)]
    fn spawn_reload_on_hangup(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGHUP; reload disabled");
                return;
            }
        };
        let dispatcher = self.dispatcher.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("SIGHUP received, reloading registrations");
                if let Err(e) = dispatcher.reload(store.as_ref()).await {
                    error!(error = %e, "Reload failed; keeping previous registrations");
                }
            }
        });
    }

    #[cfg(not(unix))]
    fn spawn_reload_on_hangup(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use lisa_config::prepare;
    use serde_json::json;
    use std::io::Write;

    fn config(extra: serde_json::Value) -> ServerConfig {
        let mut raw = json!({
            "botName": "Lisa",
            "lang": "en-US",
            "server": { "port": 10042 },
            "nlu": { "provider": "keyword", "keywords": { "core_intents_list": ["what can you do"] } }
        });
        if let (Some(base), serde_json::Value::Object(extra)) = (raw.as_object_mut(), extra) {
            base.extend(extra);
        }
        prepare(raw).unwrap()
    }

    #[tokio::test]
    async fn test_build_registers_core() {
        let server = Server::build(config(json!({}))).await.unwrap();
        assert!(server.handlers.intent("core_intents_list").await.is_some());
        assert!(server.dispatcher.rules().contains("DefaultAnswer").await);
        assert_eq!(server.gateway().bot_name, "Lisa");
    }

    #[tokio::test]
    async fn test_build_reads_store_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "rules:\n  - name: trace\n    order: 1\n    before: log\n"
        )
        .unwrap();
        let server = Server::build(config(json!({ "store": { "path": file.path() } })))
            .await
            .unwrap();
        assert!(server.dispatcher.rules().contains("trace").await);
    }

    #[tokio::test]
    async fn test_unknown_rule_action_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "rules:\n  - name: evil\n    before: exec_python\n").unwrap();
        let result = Server::build(config(json!({ "store": { "path": file.path() } }))).await;
        assert!(result.is_err());
    }
}
