use std::path::PathBuf;

use rocket::fs::NamedFile;
use rocket::State;

use crate::config::Config;

async fn app_index_file(c: &Config) -> Option<NamedFile> {
    let index = c.public_content.join("index.html");
    match NamedFile::open(&index).await {
        Ok(it) => Some(it),
        Err(e) => {
            tracing::warn!("Unable to open '{}': {}", index.display(), e);
            None
        }
    }
}

#[get("/")]
pub async fn app(c: &State<Config>) -> Option<NamedFile> {
    app_index_file(c).await
}

/// Static files, falling back to the SPA entry point for client-side routes.
#[get("/<path..>", rank = 10)]
pub async fn app_path(path: PathBuf, c: &State<Config>) -> Option<NamedFile> {
    if path.starts_with("api") {
        return None;
    }
    match NamedFile::open(c.public_content.join(path)).await {
        Ok(it) => Some(it),
        Err(_) => app_index_file(c).await,
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    use crate::config::Config;
    use crate::services::Services;
    use crate::store::{MemoryStore, SharedStore};

    #[rocket::async_test]
    async fn unknown_paths_fall_back_to_index() {
        let public = std::env::temp_dir().join(format!("lingua-public-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(public.join("robots.txt"), "User-agent: *").unwrap();

        let mut config = Config::default();
        config.public_content = public.clone();
        let store: SharedStore = std::sync::Arc::new(MemoryStore::new());
        let client = Client::tracked(crate::build(config, store, Services::default()).unwrap())
            .await
            .expect("valid rocket");

        let robots = client.get("/robots.txt").dispatch().await;
        assert_eq!(robots.status(), Status::Ok);
        assert_eq!(robots.into_string().await.unwrap(), "User-agent: *");

        let route = client.get("/classes/level-3").dispatch().await;
        assert_eq!(route.status(), Status::Ok);
        assert_eq!(route.into_string().await.unwrap(), "<html>app</html>");

        let api = client.get("/api/v1/nothing-here").dispatch().await;
        assert_eq!(api.status(), Status::NotFound);

        let _ = std::fs::remove_dir_all(public);
    }
}
