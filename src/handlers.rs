use crate::accounts;
use crate::catalog;
use crate::error::CatalogError;
use crate::model::*;
use crate::policy::is_owner;
use crate::session::{redirect, SignedIn, Viewer};
use actix_identity::Identity;
use actix_web::{error, web, HttpMessage, HttpRequest, HttpResponse};
use log::{debug, error, info};
use serde::Deserialize;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    error!("{}: {:?}", message, err);
    error::ErrorInternalServerError(message)
}

fn plain(message: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(message.to_owned())
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

/// Turns a catalog error into the response a user sees: store failures are
/// logged and answered with `failure`, rejected requests get `rejected`.
fn respond(err: CatalogError, failure: &'static str, rejected: &str) -> actix_web::Result<HttpResponse> {
    if err.is_internal() {
        return Err(log_error(err, failure));
    }
    debug!("Rejected request: {}", err);
    Ok(plain(rejected))
}

fn login_session(req: &HttpRequest, id: u64) -> actix_web::Result<()> {
    Identity::login(&req.extensions(), id.to_string())
        .map(|_| ())
        .map_err(|err| log_error(err, "Session error"))
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

fn listing(
    tera: &tera::Tera,
    template: &str,
    user: Option<Profile>,
    movies: &[MovieEntry],
    query: &str,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &user);
    ctx.insert("movies", movies);
    ctx.insert("query", query);
    render(tera, template, &ctx)
}

pub async fn index(
    viewer: Viewer,
    params: web::Query<SearchParams>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let movies = catalog::list_all(db.get_ref())
        .map_err(|err| log_error(err, "Error loading movies"))?;
    listing(&tera, "index.html", viewer.profile(), &movies, &params.q)
}

pub async fn secret(
    user: SignedIn,
    params: web::Query<SearchParams>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let movies = catalog::list_all(db.get_ref())
        .map_err(|err| log_error(err, "Error loading movies"))?;
    listing(&tera, "secret.html", Some(user.profile()), &movies, &params.q)
}

pub async fn search(
    viewer: Viewer,
    params: web::Query<SearchParams>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let movies = catalog::search(db.get_ref(), &params.q)
        .map_err(|err| log_error(err, "Error searching movies"))?;
    listing(&tera, "busqueda.html", viewer.profile(), &movies, &params.q)
}

pub async fn login(viewer: Viewer, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &viewer.profile());
    render(&tera, "login.html", &ctx)
}

pub async fn register(viewer: Viewer, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &viewer.profile());
    render(&tera, "register.html", &ctx)
}

#[derive(Deserialize, Debug)]
pub struct LoginParams {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn login_post(
    req: HttpRequest,
    params: web::Form<LoginParams>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    match accounts::authenticate(db.get_ref(), &params.username, &params.password) {
        Ok((id, _)) => {
            login_session(&req, id)?;
            Ok(redirect("/secret"))
        }
        Err(CatalogError::InvalidCredentials) => {
            info!("Failed login for {:?}", params.username);
            Ok(redirect("/login"))
        }
        Err(err) => Err(log_error(err, "Login error")),
    }
}

#[derive(Deserialize, Debug)]
pub struct RegisterParams {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    email: String,
}

pub async fn register_post(
    req: HttpRequest,
    params: web::Form<RegisterParams>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    match accounts::register(
        db.get_ref(),
        &params.username,
        &params.email,
        &params.password,
        false,
    ) {
        Ok((id, _)) => {
            login_session(&req, id)?;
            Ok(redirect("/secret"))
        }
        Err(err) => {
            if err.is_internal() {
                error!("Registering {:?}: {}", params.username, err);
            } else {
                info!("Registration of {:?} rejected: {}", params.username, err);
            }
            Ok(redirect("/register"))
        }
    }
}

pub async fn logout(id: Option<Identity>) -> HttpResponse {
    if let Some(id) = id {
        id.logout();
    }
    redirect("/")
}

pub async fn add_movie(user: SignedIn, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user", &user.profile());
    render(&tera, "agregar.html", &ctx)
}

pub async fn add_movie_post(
    user: SignedIn,
    form: web::Form<MovieForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let fields = match form.into_inner().validate() {
        Ok(fields) => fields,
        Err(err) => return respond(err, "Error adding movie", "Error adding movie."),
    };
    match catalog::create(db.get_ref(), user.id, fields) {
        Ok((id, movie)) => {
            debug!("{} added movie {} ({})", user.account.username, movie.title, id);
            Ok(redirect("/secret"))
        }
        Err(err) => respond(err, "Error adding movie", "Error adding movie."),
    }
}

const EDIT_FORBIDDEN: &str = "You do not have permission to edit this movie.";
const DELETE_FORBIDDEN: &str = "Only the administrator can delete movies.";

pub async fn edit_movie(
    user: SignedIn,
    path: web::Path<u64>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let entry = match catalog::find_by_id(db.get_ref(), path.into_inner()) {
        Ok(entry) => entry,
        Err(err) => return respond(err, "Error loading movie", "Movie not found."),
    };
    if !is_owner(user.id, &entry.movie) {
        info!("{} may not edit movie {}", user.account.username, entry.id);
        return Ok(plain(EDIT_FORBIDDEN));
    }
    let mut ctx = tera::Context::new();
    ctx.insert("user", &user.profile());
    ctx.insert("movie", &entry);
    render(&tera, "editar.html", &ctx)
}

pub async fn edit_movie_post(
    user: SignedIn,
    path: web::Path<u64>,
    form: web::Form<MovieForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    let result = catalog::find_by_id(db.get_ref(), id).and_then(|entry| {
        if !is_owner(user.id, &entry.movie) {
            return Err(CatalogError::Forbidden);
        }
        let fields = form.into_inner().validate()?;
        catalog::update(db.get_ref(), id, user.id, fields)
    });
    match result {
        Ok(_) => Ok(redirect("/secret")),
        Err(CatalogError::Forbidden) => {
            info!("{} may not edit movie {}", user.account.username, id);
            Ok(plain(EDIT_FORBIDDEN))
        }
        Err(CatalogError::NotFound) => Ok(plain("Movie not found.")),
        Err(err) => respond(err, "Error editing movie", "Error editing movie."),
    }
}

pub async fn delete_movie(
    user: SignedIn,
    path: web::Path<u64>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    match catalog::delete(db.get_ref(), id, &user.account) {
        Ok(movie) => {
            info!("{} deleted movie {} ({})", user.account.username, movie.title, id);
            Ok(redirect("/secret"))
        }
        Err(CatalogError::Forbidden) => {
            info!("{} may not delete movie {}", user.account.username, id);
            Ok(plain(DELETE_FORBIDDEN))
        }
        Err(err) => respond(err, "Error deleting movie", "Movie not found."),
    }
}

pub async fn create_admin(db: Db) -> actix_web::Result<HttpResponse> {
    match accounts::bootstrap_admin(db.get_ref()) {
        Ok(_) => Ok(plain("Administrator created.")),
        Err(CatalogError::AlreadyExists) => Ok(plain("Administrator already exists.")),
        Err(err) => Err(log_error(err, "Error creating administrator")),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/login", web::get().to(login))
        .route("/login", web::post().to(login_post))
        .route("/register", web::get().to(register))
        .route("/register", web::post().to(register_post))
        .route("/secret", web::get().to(secret))
        .route("/logout", web::get().to(logout))
        .route("/peliculas/agregar", web::get().to(add_movie))
        .route("/peliculas/agregar", web::post().to(add_movie_post))
        .route("/peliculas/{id}/editar", web::get().to(edit_movie))
        .route("/peliculas/{id}/editar", web::post().to(edit_movie_post))
        .route("/peliculas/{id}/eliminar", web::post().to(delete_movie))
        .route("/crear-admin", web::get().to(create_admin))
        .route("/buscar", web::get().to(search));
}
