use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub is_admin: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub title: String,
    pub year: i32,
    pub category: String,
    pub actors: Vec<String>,
    pub synopsis: String,
    pub image: Option<String>,
    /// Id of the creating account. Set once in `Movie::new`.
    pub owner: u64,
}

impl Movie {
    pub fn new(owner: u64, fields: MovieFields) -> Movie {
        let mut movie = Movie {
            title: String::new(),
            year: 0,
            category: String::new(),
            actors: Vec::new(),
            synopsis: String::new(),
            image: None,
            owner,
        };
        movie.apply(fields);
        movie
    }

    /// Overwrites the editable fields, leaving `owner` untouched.
    pub fn apply(&mut self, fields: MovieFields) {
        self.title = fields.title;
        self.year = fields.year;
        self.category = fields.category;
        self.actors = fields.actors;
        self.synopsis = fields.synopsis;
        self.image = fields.image;
    }
}

/// The user-editable part of a movie, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieFields {
    pub title: String,
    pub year: i32,
    pub category: String,
    pub actors: Vec<String>,
    pub synopsis: String,
    pub image: Option<String>,
}

/// Raw movie form as submitted by the add and edit views.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct MovieForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub actors: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub image: String,
}

pub fn split_actors(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|actor| !actor.is_empty())
        .map(str::to_owned)
        .collect()
}

impl MovieForm {
    pub fn validate(self) -> Result<MovieFields> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CatalogError::MissingField("title"));
        }
        let year = self
            .year
            .trim()
            .parse()
            .map_err(|_| CatalogError::Invalid(format!("year: {:?}", self.year)))?;
        let image = self.image.trim();
        Ok(MovieFields {
            title: title.to_owned(),
            year,
            category: self.category.trim().to_owned(),
            actors: split_actors(&self.actors),
            synopsis: self.synopsis,
            image: if image.is_empty() {
                None
            } else {
                Some(image.to_owned())
            },
        })
    }
}

/// What views get to see of an account.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl Profile {
    pub fn new(id: u64, account: &Account) -> Profile {
        Profile {
            id,
            username: account.username.clone(),
            email: account.email.clone(),
            is_admin: account.is_admin,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Owner {
    pub id: u64,
    pub username: String,
}

/// A stored movie with its id and owning account resolved. Views see the
/// movie fields flattened, `owner` as the account id and `owner_account` as
/// `{id, username}` (null if the account is gone).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MovieEntry {
    pub id: u64,
    #[serde(flatten)]
    pub movie: Movie,
    pub owner_account: Option<Owner>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, year: &str, actors: &str) -> MovieForm {
        MovieForm {
            title: title.to_owned(),
            year: year.to_owned(),
            actors: actors.to_owned(),
            ..MovieForm::default()
        }
    }

    #[test]
    fn actors_are_split_and_trimmed() {
        assert_eq!(
            split_actors("Tom Hanks, Robin Wright"),
            vec!["Tom Hanks".to_owned(), "Robin Wright".to_owned()]
        );
        assert_eq!(split_actors("  Keanu Reeves  "), vec!["Keanu Reeves"]);
        assert!(split_actors("").is_empty());
        assert_eq!(split_actors("a,,b, "), vec!["a", "b"]);
    }

    #[test]
    fn validate() {
        let fields = form(" Forrest Gump ", "1994", "Tom Hanks, Robin Wright")
            .validate()
            .unwrap();
        assert_eq!(fields.title, "Forrest Gump");
        assert_eq!(fields.year, 1994);
        assert_eq!(fields.actors, vec!["Tom Hanks", "Robin Wright"]);
        assert_eq!(fields.image, None);

        assert!(matches!(
            form("  ", "1994", "").validate(),
            Err(CatalogError::MissingField("title"))
        ));
        assert!(matches!(
            form("Forrest Gump", "nineteen", "").validate(),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn apply_keeps_owner() {
        let fields = form("Matrix", "1999", "Keanu Reeves").validate().unwrap();
        let mut movie = Movie::new(7, fields);
        let mut other = form("Matrix Reloaded", "2003", "").validate().unwrap();
        other.image = Some("matrix.jpg".to_owned());
        movie.apply(other);
        assert_eq!(movie.owner, 7);
        assert_eq!(movie.title, "Matrix Reloaded");
        assert_eq!(movie.image.as_deref(), Some("matrix.jpg"));
    }

    #[test]
    fn entry_as_seen_by_views() {
        let fields = form("Matrix", "1999", "Keanu Reeves").validate().unwrap();
        let entry = MovieEntry {
            id: 12,
            movie: Movie::new(3, fields),
            owner_account: Some(Owner {
                id: 3,
                username: "foo".to_owned(),
            }),
        };
        let json = tera::Context::from_serialize(&entry).unwrap().into_json();
        assert_eq!(json["id"], 12);
        assert_eq!(json["title"], "Matrix");
        assert_eq!(json["owner"], 3);
        assert_eq!(json["owner_account"]["id"], 3);
        assert_eq!(json["owner_account"]["username"], "foo");
        assert!(json.get("password_hash").is_none());
    }
}
