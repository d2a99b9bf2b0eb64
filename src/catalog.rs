use crate::database::{AccountDb, MovieDb};
use crate::error::{CatalogError, Result};
use crate::model::*;
use crate::policy::{is_admin, is_owner};
use std::collections::HashMap;

fn resolve<D: AccountDb>(db: &D, movies: Vec<(u64, Movie)>) -> Result<Vec<MovieEntry>> {
    let mut owners: HashMap<u64, Option<Owner>> = HashMap::new();
    movies
        .into_iter()
        .map(|(id, movie)| -> Result<MovieEntry> {
            let owner_account = match owners.get(&movie.owner) {
                Some(owner) => owner.clone(),
                None => {
                    let owner = db.get_account(movie.owner)?.map(|account| Owner {
                        id: movie.owner,
                        username: account.username,
                    });
                    owners.insert(movie.owner, owner.clone());
                    owner
                }
            };
            Ok(MovieEntry {
                id,
                movie,
                owner_account,
            })
        })
        .collect()
}

fn matches_term(movie: &Movie, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    contains(movie.title.as_str())
        || movie.actors.iter().any(|actor| contains(actor.as_str()))
        || contains(movie.category.as_str())
        || contains(movie.synopsis.as_str())
}

pub fn list_all<D: AccountDb + MovieDb>(db: &D) -> Result<Vec<MovieEntry>> {
    resolve(db, db.movies()?)
}

/// Case-insensitive substring search over title, actors, category and synopsis.
pub fn search<D: AccountDb + MovieDb>(db: &D, term: &str) -> Result<Vec<MovieEntry>> {
    let needle = term.to_lowercase();
    let found = db
        .movies()?
        .into_iter()
        .filter(|(_, movie)| matches_term(movie, &needle))
        .collect();
    resolve(db, found)
}

pub fn find_by_id<D: AccountDb + MovieDb>(db: &D, id: u64) -> Result<MovieEntry> {
    let movie = db.get_movie(id)?.ok_or(CatalogError::NotFound)?;
    resolve(db, vec![(id, movie)])?
        .pop()
        .ok_or(CatalogError::NotFound)
}

pub fn create<D: MovieDb>(db: &D, owner: u64, fields: MovieFields) -> Result<(u64, Movie)> {
    let movie = Movie::new(owner, fields);
    let id = db.add_movie(&movie)?;
    Ok((id, movie))
}

/// Only the owner may edit; the owner itself is never changed.
pub fn update<D: MovieDb>(db: &D, id: u64, acting: u64, fields: MovieFields) -> Result<Movie> {
    db.update_movie(id, |old| {
        if !is_owner(acting, old) {
            return Err(CatalogError::Forbidden);
        }
        let mut new = old.clone();
        new.apply(fields.clone());
        Ok(new)
    })
}

/// Only administrators may delete, whoever owns the movie.
pub fn delete<D: MovieDb>(db: &D, id: u64, acting: &Account) -> Result<Movie> {
    if !is_admin(acting) {
        return Err(CatalogError::Forbidden);
    }
    db.remove_movie(id)?.ok_or(CatalogError::NotFound)
}
