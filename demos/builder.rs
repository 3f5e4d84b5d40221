//! Form Builder Example
//!
//! Pick a template or start from the default form, edit fields, fill in the
//! live preview and export the schema.
//!
//! Run with: cargo run --example builder
//! Then open http://127.0.0.1:3000 in your browser

use schemaform::Settings;
use schemaform::pages::{self, FormBuilder};
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
    pages::builder::mount(state.clone(), FormBuilder::new(runtime));

    let config = pages::builder::router_config(state).static_dir(&settings.static_dir);
    start_server(config, &settings.addr).await?;
    Ok(())
}
