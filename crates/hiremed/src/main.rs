use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hiremed::transport::http::AppState;
use hiremed::{BotEnv, ConsoleLog, ServerConfig};

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("hiremed=info")
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    let _ = subscriber.try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let env = BotEnv::from_env();
    let server = ServerConfig::from_env();

    tracing::info!(
        workdir = %env.workdir.display(),
        python = %env.python,
        "starting hiremed"
    );

    let console = Arc::new(ConsoleLog::new());
    let state = Arc::new(AppState::new(env, console));

    hiremed::serve(server, state).await
}
