use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

use api_key::ApiKeyConfig;
use pingora::prelude::*;
use pingora::server::RunArgs;
use pingora::server::Server as PingoraServer;
use pingora::server::configuration::Opt;

use crate::auth::Authenticator;
use crate::configuration::GatewayConfig;
use crate::gateway::Gateway;
use crate::metric::Metrics;
use crate::registration::Registrar;
use crate::store::SqliteAccountStore;

pub struct Server {
    server: PingoraServer,
}

impl Server {
    pub fn new(opt: Option<Opt>) -> Result<Self> {
        let server = PingoraServer::new(opt)?;
        Ok(Server { server })
    }

    pub fn bootstrap(
        &mut self,
        conf: GatewayConfig,
        config_base_path: &Path,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        self.bootstrap_with_key_config(conf, config_base_path, metrics, ApiKeyConfig::default())
    }

    /// Like [`Server::bootstrap`], with a non-default key derivation setting.
    pub fn bootstrap_with_key_config(
        &mut self,
        conf: GatewayConfig,
        config_base_path: &Path,
        metrics: Arc<Metrics>,
        key_config: ApiKeyConfig,
    ) -> Result<()> {
        self.server.bootstrap();

        conf.validate().map_err(|e| {
            Error::explain(
                ErrorType::InternalError,
                format!("invalid gateway config: {e}"),
            )
        })?;

        let accounts_db_path = conf.accounts_db_path(config_base_path);
        let store = SqliteAccountStore::open(&accounts_db_path).map_err(|e| {
            Error::explain(
                ErrorType::InternalError,
                format!("failed to open accounts DB {}: {e}", accounts_db_path.display()),
            )
        })?;
        log::info!("Using accounts database {:?}", accounts_db_path);
        let store = Arc::new(store);

        let upstream = resolve_upstream(&conf.upstream)?;
        log::info!("Forwarding authenticated traffic to {}", upstream);

        let gateway = Gateway::new(
            Authenticator::with_config(store.clone(), key_config),
            Registrar::with_config(store, key_config),
            upstream,
            metrics,
        );
        let mut gateway_service = http_proxy_service(&self.server.configuration, gateway);

        gateway_service.add_tcp(&conf.listen);
        self.server.add_service(gateway_service);

        Ok(())
    }

    pub fn run_forever(self) {
        self.server.run_forever();
    }

    pub fn run(self, args: RunArgs) {
        self.server.run(args);
    }
}

fn resolve_upstream(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| {
            Error::explain(
                ErrorType::InternalError,
                format!("failed to resolve upstream {addr}: {e}"),
            )
        })?
        .next()
        .ok_or_else(|| {
            Error::explain(
                ErrorType::InternalError,
                format!("upstream {addr} resolved to no addresses"),
            )
        })
}
