//! Request-scoped view of who is acting.
//!
//! Sessions live server-side in the `sessions` sled tree; the cookie only
//! holds a random session key, and the session only the account id. Every
//! request resolves that id again against the account store, so a handler
//! receives the acting account explicitly through one of the two extractors
//! below.

use crate::database::AccountDb;
use crate::error::CatalogError;
use crate::model::{Account, Profile};
use actix_identity::IdentityExt;
use actix_session::storage::{LoadError, SaveError, SessionKey, SessionStore, UpdateError};
use actix_session::SessionMiddleware;
use actix_web::cookie::{time::Duration, Key};
use actix_web::{dev::Payload, error, web, FromRequest, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, error};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::{ready, Ready};

pub const COOKIE_NAME: &str = "filmoteca-session";

/// Minimum length of a configured session secret.
pub const MIN_SECRET_LEN: usize = 32;

pub fn session_key(secret: Option<&str>) -> Result<Key, CatalogError> {
    match secret {
        Some(secret) if secret.len() >= MIN_SECRET_LEN => Ok(Key::derive_from(secret.as_bytes())),
        Some(_) => Err(CatalogError::Invalid(format!(
            "session secret must be at least {} bytes",
            MIN_SECRET_LEN
        ))),
        None => Ok(Key::generate()),
    }
}

const SESSIONS: &[u8] = b"sessions";

#[derive(Serialize, Deserialize, Debug)]
struct StoredSession {
    state: HashMap<String, String>,
    /// Unix timestamp in seconds.
    expires_at: i64,
}

impl StoredSession {
    fn encode(state: HashMap<String, String>, ttl: &Duration) -> bincode::Result<Vec<u8>> {
        bincode::serialize(&StoredSession {
            state,
            expires_at: Utc::now().timestamp() + ttl.whole_seconds(),
        })
    }

    fn expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

fn generate_session_key() -> Result<SessionKey, anyhow::Error> {
    let value: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    Ok(SessionKey::try_from(value)?)
}

/// Session state kept in the database, keyed by the token the client holds.
/// Deleting an entry revokes the session for every copy of the cookie.
#[derive(Clone)]
pub struct SledSessionStore {
    sessions: sled::Tree,
}

impl SledSessionStore {
    pub fn open(db: &sled::Db) -> sled::Result<Self> {
        Ok(SledSessionStore {
            sessions: db.open_tree(SESSIONS)?,
        })
    }

    fn insert(&self, key: &SessionKey, data: Vec<u8>) -> sled::Result<()> {
        self.sessions.insert(key.as_ref(), data)?;
        Ok(())
    }
}

impl SessionStore for SledSessionStore {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<HashMap<String, String>>, LoadError> {
        let data = match self
            .sessions
            .get(session_key.as_ref())
            .map_err(|err| LoadError::Other(err.into()))?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        let stored: StoredSession =
            bincode::deserialize(&data).map_err(|err| LoadError::Deserialization(err.into()))?;
        if stored.expired() {
            self.sessions
                .remove(session_key.as_ref())
                .map_err(|err| LoadError::Other(err.into()))?;
            return Ok(None);
        }
        Ok(Some(stored.state))
    }

    async fn save(
        &self,
        session_state: HashMap<String, String>,
        ttl: &Duration,
    ) -> Result<SessionKey, SaveError> {
        let data = StoredSession::encode(session_state, ttl)
            .map_err(|err| SaveError::Serialization(err.into()))?;
        let key = generate_session_key().map_err(SaveError::Other)?;
        self.insert(&key, data)
            .map_err(|err| SaveError::Other(err.into()))?;
        Ok(key)
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: HashMap<String, String>,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let exists = self
            .sessions
            .contains_key(session_key.as_ref())
            .map_err(|err| UpdateError::Other(err.into()))?;
        if !exists {
            // Expired or revoked meanwhile: start over under a fresh key.
            return self
                .save(session_state, ttl)
                .await
                .map_err(|err| UpdateError::Other(err.into()));
        }
        let data = StoredSession::encode(session_state, ttl)
            .map_err(|err| UpdateError::Serialization(err.into()))?;
        self.insert(&session_key, data)
            .map_err(|err| UpdateError::Other(err.into()))?;
        Ok(session_key)
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        if let Some(data) = self.sessions.get(session_key.as_ref())? {
            let stored: StoredSession = bincode::deserialize(&data)?;
            self.insert(session_key, StoredSession::encode(stored.state, ttl)?)?;
        }
        Ok(())
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        self.sessions.remove(session_key.as_ref())?;
        Ok(())
    }
}

pub fn session_middleware(store: SledSessionStore, key: Key) -> SessionMiddleware<SledSessionStore> {
    SessionMiddleware::builder(store, key)
        .cookie_name(COOKIE_NAME.to_owned())
        .cookie_secure(false)
        .build()
}

/// The acting account, if the session names one that exists.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<(u64, Account)>);

/// Like `Viewer` but redirects anonymous requests to `/login`.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub id: u64,
    pub account: Account,
}

impl Viewer {
    pub fn profile(&self) -> Option<Profile> {
        self.0
            .as_ref()
            .map(|(id, account)| Profile::new(*id, account))
    }
}

impl SignedIn {
    pub fn profile(&self) -> Profile {
        Profile::new(self.id, &self.account)
    }
}

fn resolve(req: &HttpRequest) -> Result<Option<(u64, Account)>, CatalogError> {
    let identity = match req.get_identity() {
        Ok(identity) => identity,
        Err(_) => return Ok(None),
    };
    let id = match identity.id().ok().and_then(|id| id.parse::<u64>().ok()) {
        Some(id) => id,
        None => return Ok(None),
    };
    let db = match req.app_data::<web::Data<sled::Db>>() {
        Some(db) => db,
        None => return Err(CatalogError::Invalid("database not configured".to_owned())),
    };
    match db.get_account(id)? {
        Some(account) => Ok(Some((id, account))),
        None => {
            debug!("Session refers to unknown account {}", id);
            Ok(None)
        }
    }
}

fn internal(err: CatalogError) -> actix_web::Error {
    error!("Resolving session: {}", err);
    error::ErrorInternalServerError("Session error")
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("location", location))
        .finish()
}

impl FromRequest for Viewer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve(req).map(Viewer).map_err(internal))
    }
}

impl FromRequest for SignedIn {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(match resolve(req) {
            Ok(Some((id, account))) => Ok(SignedIn { id, account }),
            Ok(None) => {
                Err(error::InternalError::from_response("Login required", redirect("/login")).into())
            }
            Err(err) => Err(internal(err)),
        })
    }
}
