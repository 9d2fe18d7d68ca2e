mod cors;

use academy_backend::{api_media, api_pay, api_subs, auth, common::env_config::Config, db, logger};
use actix_web::{App, HttpServer, web};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    let logger_enabled = config.console_logging_enabled;
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if logger_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to connect to database");

    HttpServer::new(move || {
        App::new()
            .wrap(logger::middleware(logger_enabled))
            .wrap(cors::default(&origin))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .service(
                web::scope("/api")
                    .service(api_pay::mount::mount_webhook())
                    .service(
                        web::scope("/secured")
                            .wrap(auth::AuthMiddleware::new(config_data.jwt_secret.clone()))
                            .service(api_pay::mount::mount_pay())
                            .service(api_subs::mount::mount_subs())
                            .service(api_media::mount::mount_media()),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
