use std::future::Future;

use mongodb::Client;
use tokio::sync::OnceCell;

/// A value initialized at most once per process.
///
/// Concurrent first callers all await the same in-flight initialization
/// instead of starting their own. A failed initialization leaves the cell
/// empty so a later caller can retry.
pub struct Memoized<T> {
    cell: OnceCell<T>,
}

impl<T> Memoized<T> {
    pub fn new() -> Memoized<T> {
        Memoized {
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }
}

impl<T> Default for Memoized<T> {
    fn default() -> Self {
        Memoized::new()
    }
}

lazy_static! {
    static ref MONGO_CLIENT: Memoized<Client> = Memoized::new();
}

/// The process-wide MongoDB client. The URI of the first successful call wins.
pub async fn mongo_client(uri: &str) -> Result<&'static Client, mongodb::error::Error> {
    MONGO_CLIENT
        .get_or_try_init(|| async move {
            tracing::info!("Connecting to MongoDB: {}", uri);
            Client::with_uri_str(uri).await
        })
        .await
}
