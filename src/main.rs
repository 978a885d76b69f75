use actix_web::{middleware, web, App, HttpServer};

use tourist_safety_engine::config::AppConfig;
use tourist_safety_engine::handlers;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let bind_addr = config.bind_addr.clone();
    let ctx = tourist_safety_engine::initialize(config);

    log::info!("tourist safety engine listening on {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ctx.clone()))
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
