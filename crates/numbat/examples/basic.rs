//! A small JSON service wired from configuration.
//!
//! ```text
//! NUMBAT__SERVER__ADDR=127.0.0.1:3000 cargo run -p numbat --example basic
//! ```

use std::sync::Arc;
use std::time::Duration;

use numbat::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct CreateNote {
    title: String,
}

#[derive(Debug, Serialize)]
struct Note {
    id: String,
    title: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_development()
        .with_optional_file("numbat.toml")?
        .with_dotenv()?
        .with_env_prefix("NUMBAT")
        .load()?;
    let _guard = init_logging(&LogConfig::from(&config.logging))?;

    let router = Router::new();
    configure_router(&router, &config);
    router.use_middleware(Timeout::new(Duration::from_secs(10)));

    router.get(
        "/health",
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "ok") })),
    );

    let mut api = router.group("/api");
    api.use_middleware(Cors::new(CorsConfig::new().allow_origins(["http://localhost:5173"])));
    api.post(
        "/notes/:id",
        handler_fn(|ctx| {
            Box::pin(async move {
                let input: CreateNote = match ctx.bind_json() {
                    Ok(input) => input,
                    Err(err) => {
                        let status = err.status_code();
                        ctx.json(status, &ErrorResponse::new(err.to_string()));
                        return;
                    }
                };
                let note = Note {
                    id: ctx.param("id").unwrap_or_default().to_string(),
                    title: input.title,
                };
                tracing::info!(id = %note.id, "note created");
                ctx.json(StatusCode::CREATED, &note);
            })
        }),
    );

    let server = Server::new(ServerConfig::from(&config.server), Arc::new(router));
    server.run().await?;
    Ok(())
}
