use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pubfinder::{
    average_rating, router, AppState, Backend, Config, JsonStore, NewPub, PostgresStore,
    PubOrder, PubService, Store, TokenIssuer, Transaction,
};

#[derive(Parser)]
#[command(name = "pubfinder")]
#[command(about = "Pub review backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(long, default_value = "pubfinder.yml")]
    config: PathBuf,

    /// PostgreSQL connection string (postgres backend only)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Token signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,

    /// Apply database migrations (postgres backend only)
    Migrate,

    /// Add a pub
    AddPub {
        /// Pub title
        #[arg(long)]
        title: String,

        #[arg(long)]
        short_description: Option<String>,

        #[arg(long)]
        long_description: Option<String>,

        #[arg(long)]
        menu_url: Option<String>,

        #[arg(long)]
        image_url: Option<String>,
    },

    /// Delete a pub with all of its reviews and likes
    DeletePub {
        /// Pub ID
        id: Uuid,
    },

    /// Check stored like counts and ratings against the underlying rows
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pubfinder=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match config.storage.backend {
        Backend::Json => {
            if matches!(cli.command, Commands::Migrate) {
                info!("JSON backend has no migrations");
                return Ok(());
            }
            let store = JsonStore::open(&config.storage.json_path).await?;
            run(store, cli, &config).await
        }
        Backend::Postgres => {
            let url = cli
                .database_url
                .clone()
                .context("DATABASE_URL not set")?;
            let store = PostgresStore::connect(&url, config.database.max_connections).await?;
            store.migrate().await?;
            if matches!(cli.command, Commands::Migrate) {
                return Ok(());
            }
            run(store, cli, &config).await
        }
    }
}

async fn run<S: Store>(store: S, cli: Cli, config: &Config) -> Result<()> {
    match cli.command {
        Commands::Serve => {
            let secret = config.jwt_secret(cli.jwt_secret)?;
            let tokens = TokenIssuer::new(&secret, config.auth.token_ttl_secs);
            serve(store, tokens, config).await
        }
        Commands::Migrate => Ok(()),
        Commands::AddPub {
            title,
            short_description,
            long_description,
            menu_url,
            image_url,
        } => {
            let pubs = PubService::new(store.into());
            let venue = pubs
                .add_pub(NewPub {
                    title,
                    short_description,
                    long_description,
                    menu_url,
                    image_url,
                })
                .await?;
            println!("Added pub {} ({})", venue.title, venue.id);
            Ok(())
        }
        Commands::DeletePub { id } => {
            let pubs = PubService::new(store.into());
            pubs.delete_pub(id).await?;
            println!("Deleted pub {}", id);
            Ok(())
        }
        Commands::Audit => audit(&store).await,
    }
}

async fn serve<S: Store>(store: S, tokens: TokenIssuer, config: &Config) -> Result<()> {
    let app = router(AppState::new(store, tokens));

    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!(addr = %config.server.bind, "Listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Read-only consistency check. Fails if any derived value has drifted.
async fn audit<S: Store>(store: &S) -> Result<()> {
    let mut tx = store.begin().await?;
    let mut problems = 0usize;

    let reviews = tx.list_reviews().await?;
    for details in &reviews {
        let review = &details.review;
        let actual = tx.count_likes(review.id).await?;
        if u64::from(review.like_count) != actual {
            warn!(review_id = %review.id, stored = review.like_count, actual, "Like count drift");
            println!(
                "review {}: like_count {} but {} likes recorded",
                review.id, review.like_count, actual
            );
            problems += 1;
        }
    }

    let pubs = tx.list_pubs(PubOrder::Native).await?;
    for venue in &pubs {
        let rates = tx.list_reviews_by_pub(venue.id).await?;
        let expected = average_rating(rates.iter().map(|d| d.review.rate));
        if venue.rating != expected {
            warn!(pub_id = %venue.id, stored = %venue.rating, expected = %expected, "Rating drift");
            println!(
                "pub {} ({}): rating {} but reviews average {}",
                venue.id, venue.title, venue.rating, expected
            );
            problems += 1;
        }
    }

    tx.commit().await?;

    println!(
        "Audited {} pubs and {} reviews: {} problem(s)",
        pubs.len(),
        reviews.len(),
        problems
    );

    if problems > 0 {
        anyhow::bail!("Audit found {} inconsistencies", problems);
    }

    Ok(())
}
