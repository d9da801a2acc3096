mod app;
mod clipboard;
mod config;
mod generate;
mod hotkey;
mod pipeline;

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ghostwrite=info,warn")),
        )
        .init();

    if let Err(err) = app::run() {
        eprintln!("Ghostwrite failed: {err}");
    }
}
