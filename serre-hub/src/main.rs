/**
 * SERRE HUB - Point d'entrée principal du daemon de supervision des serres
 *
 * RÔLE : Orchestration de tous les modules : config, radio broadcast, sync
 * cloud, persistance réglages, API REST. Bootstrap complet avec restauration
 * des réglages avant toute activité réseau.
 *
 * ARCHITECTURE : Event-driven via télémétrie UDP + cycle de réconciliation
 * périodique + API REST. Le hub est le seul composant qui voit à la fois la
 * radio locale et le store distant.
 */

mod codec;
mod config;
mod control;
mod http;
mod models;
mod registry;
mod remote;
mod settings_store;
mod state;
mod sync;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::load_config;
use crate::registry::NodeRegistry;
use crate::remote::RtdbClient;
use crate::settings_store::SettingsStore;
use crate::state::{new_state, Clock};
use crate::sync::{spawn_sync_loop, SyncEngine};
use crate::transport::UdpBroadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;
    let clock = Clock::new();

    // restauration des réglages persistés AVANT toute activité réseau
    let store = SettingsStore::new(&cfg.settings_file);
    let restored = store.load_all().await;
    let registry = new_state(NodeRegistry::with_settings(restored));
    info!("restored settings for {} node slots", crate::models::MAX_NODES);

    // radio : émetteur broadcast + écoute télémétrie
    let tx: Arc<dyn transport::BroadcastSender> =
        match UdpBroadcast::new(&cfg.broadcast_addr, cfg.broadcast_port) {
            Ok(udp) => Arc::new(udp),
            Err(e) => {
                error!("failed to open broadcast socket: {e}");
                return Err(e.into());
            }
        };
    transport::spawn_telemetry_listener(registry.clone(), clock.clone(), cfg.telemetry_port);

    // store distant + boucle de réconciliation
    let remote: Arc<dyn remote::RemoteStore> = Arc::new(RtdbClient::new(
        &cfg.remote.base_url,
        cfg.remote.auth_token.clone(),
        Duration::from_secs(cfg.remote.timeout_secs.max(1)),
    ));
    let engine = SyncEngine::new(
        registry.clone(),
        remote.clone(),
        tx.clone(),
        store.clone(),
        clock.clone(),
    );
    spawn_sync_loop(engine, cfg.sync_interval_secs);

    // API REST
    let app_state = http::AppState {
        registry,
        clock,
        tx,
        remote,
        store,
    };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    info!("listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
