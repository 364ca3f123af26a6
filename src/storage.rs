pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{Alert, NewAlert, UserAlert, UserId};

/// Durable store of price alerts, shared between the conversation engine
/// (writer) and the evaluation loop (reader + deleter).
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn AlertStore`).
pub trait AlertStore: Send + Sync {
    /// Append a new alert and return the stored row with its generated id.
    /// Duplicate (user, coin) pairs may coexist.
    fn insert(&self, alert: &NewAlert) -> BoxFuture<'_, Result<Alert, Report<StorageError>>>;

    /// Every stored alert, in no particular order.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>>;

    /// All alerts belonging to `user_id`.
    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<UserAlert>, Report<StorageError>>>;

    /// Delete a single alert by its id. Returns `false` when no row matched
    /// (e.g. it was already removed).
    fn remove_by_id(&self, id: i64) -> BoxFuture<'_, Result<bool, Report<StorageError>>>;

    /// Delete every alert matching (user, coin) and return the count.
    /// A no-op (count 0) when nothing matches.
    fn remove(
        &self,
        user_id: UserId,
        coin: &str,
    ) -> BoxFuture<'_, Result<u64, Report<StorageError>>>;
}
