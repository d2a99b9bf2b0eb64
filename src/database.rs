use crate::error::{CatalogError, Result};
use crate::model::*;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

// Big endian, so that iterating a tree yields records in creation order.
fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64> {
    let bytes: [u8; 8] = id
        .as_ref()
        .try_into()
        .map_err(|_| CatalogError::Invalid("malformed record id".to_owned()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn flatten(err: TransactionError<CatalogError>) -> CatalogError {
    match err {
        TransactionError::Storage(e) => e.into(),
        TransactionError::Abort(e) => e,
    }
}

pub trait AccountDb {
    /// Returns `None` if the username is already taken.
    fn add_account(&self, account: &Account) -> Result<Option<u64>>;
    fn get_account(&self, id: u64) -> Result<Option<Account>>;
    fn get_account_by_username(&self, username: &str) -> Result<Option<(u64, Account)>>;
}

pub trait MovieDb {
    fn add_movie(&self, movie: &Movie) -> Result<u64>;
    fn get_movie(&self, id: u64) -> Result<Option<Movie>>;
    fn movies(&self) -> Result<Vec<(u64, Movie)>>;
    /// Atomically replaces the movie with whatever `change` derives from the
    /// stored record. `change` may run more than once.
    fn update_movie<F>(&self, id: u64, change: F) -> Result<Movie>
    where
        F: Fn(&Movie) -> Result<Movie>;
    fn remove_movie(&self, id: u64) -> Result<Option<Movie>>;
}

const ACCOUNTS: &[u8] = b"accounts";
const ACCOUNTS_USERNAME: &[u8] = b"accounts_username";
const MOVIES: &[u8] = b"movies";

impl AccountDb for sled::Db {
    fn add_account(&self, account: &Account) -> Result<Option<u64>> {
        let accounts = self.open_tree(ACCOUNTS)?;
        let accounts_username = self.open_tree(ACCOUNTS_USERNAME)?;
        let id = self.generate_id()?;
        let data = bincode::serialize(account)?;
        let result = (&accounts, &accounts_username).transaction(|(accounts, accounts_username)| {
            if accounts_username
                .insert(account.username.as_bytes(), &serialize_id(id))?
                .is_some()
            {
                sled::transaction::abort(())?;
            }
            accounts.insert(&serialize_id(id), data.as_slice())?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(Some(id)),
            Err(TransactionError::Abort(())) => Ok(None),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn get_account(&self, id: u64) -> Result<Option<Account>> {
        let accounts = self.open_tree(ACCOUNTS)?;
        match accounts.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn get_account_by_username(&self, username: &str) -> Result<Option<(u64, Account)>> {
        let accounts_username = self.open_tree(ACCOUNTS_USERNAME)?;
        let accounts = self.open_tree(ACCOUNTS)?;
        if let Some(id) = accounts_username.get(username)? {
            let data = accounts
                .get(&id)?
                .ok_or_else(|| CatalogError::Invalid("bad index accounts_username".to_owned()))?;
            Ok(Some((deserialize_id(id)?, bincode::deserialize(&data)?)))
        } else {
            Ok(None)
        }
    }
}

impl MovieDb for sled::Db {
    fn add_movie(&self, movie: &Movie) -> Result<u64> {
        let movies = self.open_tree(MOVIES)?;
        let id = self.generate_id()?;
        movies.insert(serialize_id(id), bincode::serialize(movie)?)?;
        Ok(id)
    }

    fn get_movie(&self, id: u64) -> Result<Option<Movie>> {
        let movies = self.open_tree(MOVIES)?;
        match movies.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn movies(&self) -> Result<Vec<(u64, Movie)>> {
        let movies = self.open_tree(MOVIES)?;
        movies
            .iter()
            .map(|entry| -> Result<(u64, Movie)> {
                let (key, data) = entry?;
                Ok((deserialize_id(key)?, bincode::deserialize(&data)?))
            })
            .collect()
    }

    fn update_movie<F>(&self, id: u64, change: F) -> Result<Movie>
    where
        F: Fn(&Movie) -> Result<Movie>,
    {
        let movies = self.open_tree(MOVIES)?;
        let key = serialize_id(id);
        movies
            .transaction(|movies| {
                let data = movies
                    .get(key)?
                    .ok_or(ConflictableTransactionError::Abort(CatalogError::NotFound))?;
                let old: Movie = bincode::deserialize(&data)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                let new = change(&old).map_err(ConflictableTransactionError::Abort)?;
                let data = bincode::serialize(&new)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                movies.insert(&key, data)?;
                Ok(new)
            })
            .map_err(flatten)
    }

    fn remove_movie(&self, id: u64) -> Result<Option<Movie>> {
        let movies = self.open_tree(MOVIES)?;
        match movies.remove(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(username: &str) -> Account {
        Account {
            username: username.to_owned(),
            password_hash: "x".to_owned(),
            email: format!("{}@example.com", username),
            is_admin: false,
            registered_at: Utc::now(),
        }
    }

    fn movie(title: &str, owner: u64) -> Movie {
        Movie {
            title: title.to_owned(),
            year: 2000,
            category: "Drama".to_owned(),
            actors: vec![],
            synopsis: String::new(),
            image: None,
            owner,
        }
    }

    #[test]
    fn username_index() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let id = db.add_account(&account("foo")).unwrap().unwrap();
        assert_eq!(db.add_account(&account("foo")).unwrap(), None);
        let (found_id, found) = db.get_account_by_username("foo").unwrap().unwrap();
        assert_eq!(found_id, id);
        assert_eq!(found.email, "foo@example.com");
        assert_eq!(db.get_account(id).unwrap().unwrap(), found);
        assert!(db.get_account_by_username("bar").unwrap().is_none());
    }

    #[test]
    fn movies_in_creation_order() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let titles = ["a", "b", "c"];
        let ids = titles
            .iter()
            .map(|title| db.add_movie(&movie(title, 1)).unwrap())
            .collect::<Vec<_>>();
        let listed = db.movies().unwrap();
        assert_eq!(listed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids);
        assert_eq!(db.remove_movie(ids[1]).unwrap().unwrap().title, "b");
        assert_eq!(db.remove_movie(ids[1]).unwrap(), None);
        assert_eq!(db.movies().unwrap().len(), 2);
    }

    #[test]
    fn update_movie() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let id = db.add_movie(&movie("Pulp Fiction", 1)).unwrap();
        let updated = db
            .update_movie(id, |old| {
                let mut new = old.clone();
                new.year = 1994;
                Ok(new)
            })
            .unwrap();
        assert_eq!(updated.year, 1994);
        assert_eq!(db.get_movie(id).unwrap().unwrap().year, 1994);

        assert!(matches!(
            db.update_movie(id, |_| Err(CatalogError::Forbidden)),
            Err(CatalogError::Forbidden)
        ));
        assert_eq!(db.get_movie(id).unwrap().unwrap().year, 1994);
        assert!(matches!(
            db.update_movie(id + 100, |old| Ok(old.clone())),
            Err(CatalogError::NotFound)
        ));
    }
}
