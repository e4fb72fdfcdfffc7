use std::path::Path;
use std::sync::Arc;

use climateguard::configuration::GatewayConfig;
use climateguard::metric::Metrics;
use climateguard::server::Server;
use pingora::server::configuration::Opt;

fn main() {
    // Enable basic logging; set RUST_LOG=info for visibility.
    env_logger::init();

    let opt = Opt::parse_args();

    // Pingora and the gateway share one YAML file.
    let conf_path = opt.conf.clone().unwrap_or_else(|| "conf.yaml".to_string());

    let mut server = Server::new(Some(opt)).expect("Failed to create server");

    let conf_path = Path::new(&conf_path);
    let gateway_conf = GatewayConfig::load(conf_path).expect("Failed to load gateway config");
    let base_path = conf_path.parent().unwrap_or(Path::new("."));

    server
        .bootstrap(gateway_conf, base_path, Arc::new(Metrics::default()))
        .expect("Failed to bootstrap server");

    server.run_forever();
}
