//! PageTurner server
//!
//! Brokers account linking between browser sessions and the upstream
//! automation service: one authenticated connector per session, a sign-in
//! negotiator over HTTP, and reverse-proxy passthroughs for the hand-off
//! pages.

mod config;
mod handlers;
mod location;
mod logging;
mod proxy;
mod routes;
mod session;
mod state;

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing::info;

use crate::config::Settings;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "pageturner", about = "Account-linking broker for the PageTurner storefront")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Bind address
    #[arg(long, env = "PAGETURNER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = logging::init_logging()?;

    let settings = Settings::from_env();
    info!(
        component = "server",
        upstream = %settings.upstream_url,
        environment = %settings.environment,
        "starting PageTurner server"
    );

    let state = AppState::new(settings)?;
    let app = routes::router(state);

    let addr = SocketAddr::from((args.bind, args.port));
    info!(component = "server", %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
