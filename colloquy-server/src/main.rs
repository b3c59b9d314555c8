use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod handlers;

pub use error::Error;
use extractors::{AppState, Config, PgPool};

#[derive(Debug, StructOpt)]
#[structopt(name = "colloquy-server", about = "Article comment and like backend")]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Reject new comments whose parent does not exist on the same article
    #[structopt(long)]
    validate_parents: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = sqlx::postgres::PgPoolOptions::new()
        .connect(&db_url)
        .await
        .with_context(|| format!("Error opening database {:?}", db_url))?;

    let app = Router::new()
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/article/:article/comments",
            get(handlers::fetch_comment_tree),
        )
        .route("/api/comment", post(handlers::create_comment))
        .route("/api/comment/:comment", delete(handlers::delete_comment))
        .route(
            "/api/comment/:comment/like",
            post(handlers::create_like).delete(handlers::delete_like),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState {
            db: PgPool::new(db),
            config: Config {
                validate_parents: opt.validate_parents,
            },
        });

    tracing::info!("listening on {}", opt.bind);
    axum::Server::bind(&opt.bind)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
