use actix_web::{App, HttpServer, dev::Server, middleware, web};
use anyhow::Result;

use crate::config::Config;
use crate::routes::{health_handler, json_error_handler, root_handler, run_handler};
use crate::sandbox::Sandbox;
use crate::stats::ServiceStats;

pub fn build_server(config: Config) -> Result<Server> {
    let Config {
        server: server_config,
        sandbox: sandbox_config,
    } = config;

    let sandbox = web::Data::new(Sandbox::new(&sandbox_config)?);
    let stats = web::Data::new(ServiceStats::new());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(sandbox.clone())
            .app_data(stats.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(run_handler)
            .service(health_handler)
            .service(root_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(8000),
    ))?
    .run();

    Ok(server)
}
