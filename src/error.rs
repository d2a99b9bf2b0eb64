use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Username is already taken")]
    DuplicateUsername,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Not found")]
    NotFound,
    #[error("Forbidden")]
    Forbidden,
    #[error("Already exists")]
    AlreadyExists,
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Store(#[from] sled::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl CatalogError {
    /// True for failures of the underlying store rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CatalogError::Store(_) | CatalogError::Encoding(_) | CatalogError::Hash(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
