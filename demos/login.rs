//! Login Example
//!
//! Username/password and phone/verification-code tabs. Sending a code is
//! simulated; the button stays disabled for the resend countdown.
//!
//! Run with: cargo run --example login
//! Then open http://127.0.0.1:3000 in your browser

use std::sync::Arc;

use schemaform::Settings;
use schemaform::pages::{self, login::SimulatedSender};
use schemaform::runtime::FormRuntime;
use schemaform::ui::{AppState, start_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("schemaform=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env();
    let state = AppState::new();
    let runtime = FormRuntime::new().with_max_passes(settings.max_reaction_passes);
    pages::login::mount(
        state.clone(),
        &runtime,
        Arc::new(SimulatedSender::default()),
        settings.resend_seconds,
    );

    let config = pages::login::router_config(state).static_dir(&settings.static_dir);
    start_server(config, &settings.addr).await?;
    Ok(())
}
