mod accounts;
mod catalog;
mod database;
mod error;
mod handlers;
mod model;
mod policy;
mod session;
mod settings;

use actix_identity::IdentityMiddleware;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use settings::Settings;
use std::io;

fn fatal<E: std::fmt::Display>(err: E, message: &'static str) -> io::Error {
    error!("{}: {}", message, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", message, err))
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    let settings = Settings::load().map_err(|err| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("Configuration error: {}", err))
    })?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.filter))
        .init();

    let db = settings
        .open_database()
        .map_err(|err| fatal(err, "Could not open database"))?;
    let tera = tera::Tera::new(&settings.templates).map_err(|err| fatal(err, "Template error"))?;
    if settings.session.secret.is_none() {
        warn!("No session secret configured, sessions will not survive a restart");
    }
    let key = session::session_key(settings.session.secret.as_deref())
        .map_err(|err| fatal(err, "Configuration error"))?;
    let sessions =
        session::SledSessionStore::open(&db).map_err(|err| fatal(err, "Could not open session store"))?;

    let db = web::Data::new(db);
    let tera = web::Data::new(tera);
    let address = settings.bind_address();
    info!("Listening on http://{}:{}", address.0, address.1);

    HttpServer::new(move || {
        App::new()
            .wrap(IdentityMiddleware::default())
            .wrap(session::session_middleware(sessions.clone(), key.clone()))
            .wrap(Logger::default())
            .app_data(tera.clone())
            .app_data(db.clone())
            .configure(handlers::configure)
    })
    .bind(address)?
    .run()
    .await
}
