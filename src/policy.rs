use crate::model::{Account, Movie};

pub fn is_owner(account_id: u64, movie: &Movie) -> bool {
    movie.owner == account_id
}

pub fn is_admin(account: &Account) -> bool {
    account.is_admin
}
