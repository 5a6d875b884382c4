mod app;
mod auth;
mod config;
mod db;
mod labels;
mod recipes;
mod state;
mod storage;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "recipebox=debug,axum=info,tower_http=info,sqlx=warn";

/// `RUST_LOG` wins over the default filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.with_target(false).json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve,
    CreateSuperuser,
}

impl Command {
    fn parse(arg: Option<&str>) -> anyhow::Result<Self> {
        match arg {
            None | Some("serve") => Ok(Self::Serve),
            Some("create-superuser") => Ok(Self::CreateSuperuser),
            Some(other) => anyhow::bail!(
                "unknown command {:?} (expected `serve` or `create-superuser`)",
                other
            ),
        }
    }
}

async fn create_superuser(state: &state::AppState) -> anyhow::Result<()> {
    let email = std::env::var("SUPERUSER_EMAIL").unwrap_or_default();
    let password = std::env::var("SUPERUSER_PASSWORD").context("SUPERUSER_PASSWORD is not set")?;
    let user = auth::services::create_superuser(state.users.as_ref(), &email, &password)
        .await
        .context("create superuser")?;
    tracing::info!(user_id = %user.id, email = %user.email, "superuser created");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = Command::parse(std::env::args().nth(1).as_deref())?;
    let state = state::AppState::init().await?;

    match command {
        Command::Serve => {
            let server = state.config.server.clone();
            app::serve(app::build_app(state), &server).await
        }
        Command::CreateSuperuser => create_superuser(&state).await,
    }
}
