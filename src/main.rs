use clap::Parser;

use coderunner::config::CliArgs;
use coderunner::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config().expect("Failed to load configuration");

    let bind_address = config
        .server
        .bind_address
        .clone()
        .unwrap_or("127.0.0.1".to_string());
    let bind_port = config.server.bind_port.unwrap_or(8000);

    let server = build_server(config).expect("Failed to build server");
    log::info!("code runner service listening on {bind_address}:{bind_port}");

    server.await
}
