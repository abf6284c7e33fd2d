use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::models::{
    BookRecord, BookTable, Metadata, MergedRecord, MergedTable, OrderTable, UserRecord, UserTable,
};

/// Joins cleaned orders with their users and books.
pub struct RecordMerger;

/// Drop metadata whose column name mentions `price`, so only the order's
/// `unit_price` and `paid_price` carry pricing after the join.
fn without_price_columns(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(name, _)| !name.contains("price"))
        .cloned()
        .collect()
}

impl RecordMerger {
    pub fn new() -> Self {
        RecordMerger
    }

    /// Keep the first user for every `user_id`. At most one user without
    /// an id survives, and it never matches an order.
    pub fn dedup_users(&self, users: UserTable) -> UserTable {
        let mut seen = HashSet::new();
        let before = users.len();
        let records: Vec<UserRecord> = users
            .records
            .into_iter()
            .filter(|u| seen.insert(u.user_id.clone()))
            .collect();

        if records.len() < before {
            info!("Removed {} duplicate users", before - records.len());
        }
        UserTable { records }
    }

    /// Keep the first book for every `book_id`.
    pub fn dedup_books(&self, books: BookTable) -> BookTable {
        let mut seen = HashSet::new();
        let before = books.len();
        let records: Vec<BookRecord> = books
            .records
            .into_iter()
            .filter(|b| seen.insert(b.book_id.clone()))
            .collect();

        if records.len() < before {
            info!("Removed {} duplicate books", before - records.len());
        }
        BookTable {
            records,
            has_author_column: books.has_author_column,
        }
    }

    /// Left join orders → users on `user_id`, then → books on `book_id`.
    ///
    /// Every order yields exactly one merged row. If any input is empty the
    /// result is empty.
    pub fn merge(&self, orders: &OrderTable, users: &UserTable, books: &BookTable) -> MergedTable {
        if orders.is_empty() || users.is_empty() || books.is_empty() {
            warn!(
                "Skipping merge: {} orders, {} users, {} books",
                orders.len(),
                users.len(),
                books.len()
            );
            return MergedTable::default();
        }

        let mut users_by_id: HashMap<&str, &UserRecord> = HashMap::new();
        for user in &users.records {
            if let Some(id) = user.user_id.as_deref() {
                users_by_id.entry(id).or_insert(user);
            }
        }

        let mut books_by_id: HashMap<&str, &BookRecord> = HashMap::new();
        for book in &books.records {
            if let Some(id) = book.book_id.as_deref() {
                books_by_id.entry(id).or_insert(book);
            }
        }

        let mut unmatched_users = 0;
        let mut unmatched_books = 0;

        let records: Vec<MergedRecord> = orders
            .records
            .iter()
            .map(|order| {
                let user = order
                    .user_id
                    .as_deref()
                    .and_then(|id| users_by_id.get(id).copied());
                let book = order
                    .book_id
                    .as_deref()
                    .and_then(|id| books_by_id.get(id).copied());

                if user.is_none() {
                    unmatched_users += 1;
                }
                if book.is_none() {
                    unmatched_books += 1;
                }

                let mut order = order.clone();
                order.extra = without_price_columns(&order.extra);

                MergedRecord {
                    order,
                    name: user.and_then(|u| u.name.clone()),
                    email: user.and_then(|u| u.email.clone()),
                    phone: user.and_then(|u| u.phone.clone()),
                    address: user.and_then(|u| u.address.clone()),
                    author: book.and_then(|b| b.author.clone()),
                    user_extra: user.map(|u| without_price_columns(&u.extra)).unwrap_or_default(),
                    book_extra: book.map(|b| without_price_columns(&b.extra)).unwrap_or_default(),
                }
            })
            .collect();

        info!(
            "Merged {} orders ({} without user, {} without book)",
            records.len(),
            unmatched_users,
            unmatched_books
        );

        MergedTable {
            records,
            has_author_column: books.has_author_column,
        }
    }
}

impl Default for RecordMerger {
    fn default() -> Self {
        Self::new()
    }
}
