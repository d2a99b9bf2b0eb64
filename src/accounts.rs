use crate::database::AccountDb;
use crate::error::{CatalogError, Result};
use crate::model::Account;
use chrono::Utc;
use log::{debug, info};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const ADMIN_EMAIL: &str = "admin@email.com";

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

pub fn register<D: AccountDb>(
    db: &D,
    username: &str,
    email: &str,
    password: &str,
    is_admin: bool,
) -> Result<(u64, Account)> {
    let username = username.trim();
    if username.is_empty() {
        return Err(CatalogError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(CatalogError::MissingField("password"));
    }
    let account = Account {
        username: username.to_owned(),
        password_hash: bcrypt::hash(password, HASH_COST)?,
        email: email.trim().to_owned(),
        is_admin,
        registered_at: Utc::now(),
    };
    let id = db
        .add_account(&account)?
        .ok_or(CatalogError::DuplicateUsername)?;
    debug!("Registered account {} ({})", account.username, id);
    Ok((id, account))
}

/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub fn authenticate<D: AccountDb>(db: &D, username: &str, password: &str) -> Result<(u64, Account)> {
    match find_by_username(db, username.trim()) {
        Ok((id, account)) if bcrypt::verify(password, &account.password_hash)? => {
            Ok((id, account))
        }
        Ok(_) | Err(CatalogError::NotFound) => Err(CatalogError::InvalidCredentials),
        Err(err) => Err(err),
    }
}

pub fn find_by_username<D: AccountDb>(db: &D, username: &str) -> Result<(u64, Account)> {
    db.get_account_by_username(username)?
        .ok_or(CatalogError::NotFound)
}

/// Creates the well-known administrator account unless its username is taken.
pub fn bootstrap_admin<D: AccountDb>(db: &D) -> Result<(u64, Account)> {
    if db.get_account_by_username(ADMIN_USERNAME)?.is_some() {
        return Err(CatalogError::AlreadyExists);
    }
    match register(db, ADMIN_USERNAME, ADMIN_EMAIL, ADMIN_PASSWORD, true) {
        Ok(admin) => {
            info!("Created administrator account {}", admin.0);
            Ok(admin)
        }
        // Lost a race against a concurrent bootstrap.
        Err(CatalogError::DuplicateUsername) => Err(CatalogError::AlreadyExists),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let (_, account) = register(&db, "foo", "foo@example.com", "1234", false).unwrap();
        assert!(!account.is_admin);
        assert_ne!(account.password_hash, "1234");
        assert!(matches!(
            register(&db, "foo", "other@example.com", "5678", false),
            Err(CatalogError::DuplicateUsername)
        ));
        assert_eq!(find_by_username(&db, "foo").unwrap().1.email, "foo@example.com");
    }

    #[test]
    fn missing_fields() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        assert!(matches!(
            register(&db, " ", "", "1234", false),
            Err(CatalogError::MissingField("username"))
        ));
        assert!(matches!(
            register(&db, "foo", "", "", false),
            Err(CatalogError::MissingField("password"))
        ));
    }

    #[test]
    fn authenticate_checks_password() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let (id, _) = register(&db, "foo", "foo@example.com", "1234", false).unwrap();
        assert_eq!(authenticate(&db, "foo", "1234").unwrap().0, id);
        assert!(matches!(
            authenticate(&db, "foo", "12345"),
            Err(CatalogError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&db, "nobody", "1234"),
            Err(CatalogError::InvalidCredentials)
        ));
    }

    #[test]
    fn find_missing() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        assert!(matches!(find_by_username(&db, "foo"), Err(CatalogError::NotFound)));
    }

    #[test]
    fn bootstrap_admin_once() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let (id, admin) = bootstrap_admin(&db).unwrap();
        assert!(admin.is_admin);
        assert!(matches!(bootstrap_admin(&db), Err(CatalogError::AlreadyExists)));
        let (found_id, _) = authenticate(&db, ADMIN_USERNAME, ADMIN_PASSWORD).unwrap();
        assert_eq!(found_id, id);
    }

    #[test]
    fn bootstrap_admin_does_not_promote() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        register(&db, ADMIN_USERNAME, "squatter@example.com", "pw", false).unwrap();
        assert!(matches!(bootstrap_admin(&db), Err(CatalogError::AlreadyExists)));
        assert!(!find_by_username(&db, ADMIN_USERNAME).unwrap().1.is_admin);
    }
}
