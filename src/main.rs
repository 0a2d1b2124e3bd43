use std::time::Duration;

use anyhow::Context;
use app::database::{self, run_migrations};
#[cfg(debug_assertions)]
use app::database::seed_development_data;
use rocket::{launch, Build, Rocket};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct Config {
    database_url: Url,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    rate_limit: RateLimitConfig,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct RateLimitConfig {
    limit: usize,
    span: Duration,
}

impl RateLimitConfig {
    fn into_rate_limit(self) -> api::RateLimit {
        api::RateLimit::new(self.limit, self.span)
    }
}

#[launch]
async fn rocket() -> _ {
    match start_server().await {
        Ok(rocket) => rocket,
        Err(e) => {
            log::error!("failed to start the wallet server: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn start_server() -> anyhow::Result<Rocket<Build>> {
    env_logger::init();

    let rocket = Rocket::build();
    let config: Config = rocket
        .figment()
        .extract()
        .context("invalid configuration")?;

    let db = database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to the database")?;

    run_migrations(&db)
        .await
        .context("failed to run migrations")?;
    #[cfg(debug_assertions)]
    seed_development_data(&db)
        .await
        .context("failed to seed development data")?;

    Ok(api::register(
        rocket,
        db,
        config.rate_limit.into_rate_limit(),
    ))
}
