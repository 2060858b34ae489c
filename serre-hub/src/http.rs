/**
 * API REST SERRE-HUB - Surface de pilotage du hub
 *
 * RÔLE :
 * Ce module expose l'API REST du hub pour interactions humaines : le menu
 * embarqué de l'ancien matériel devient un dashboard/CLI qui lit l'état des
 * nœuds et écrit les réglages via le même contrat mutate_settings que le
 * moteur de réconciliation.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes /health, /system/health, /nodes, /control
 * - Vues annotées de staleness (live recalculé à la lecture, jamais caché)
 * - Écriture réglages : validation de plage, envoi contrôle, persistance
 *
 * SÉCURITÉ :
 * - Header x-api-key exigé quand SERRE_HUB_API_KEY est posée ; /health
 *   reste toujours accessible.
 */

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::control;
use crate::models::{ManualCommand, NodeId, NodeRecord, NodeSettings, ScheduleSettings};
use crate::registry::{NodeRegistry, SharedRegistry};
use crate::remote::RemoteStore;
use crate::settings_store::SettingsStore;
use crate::state::Clock;
use crate::transport::BroadcastSender;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub clock: Clock,
    pub tx: Arc<dyn BroadcastSender>,
    pub remote: Arc<dyn RemoteStore>,
    pub store: SettingsStore,
}

#[derive(serde::Serialize)]
struct NodeView {
    node_id: NodeId,
    live: bool,
    is_online: bool,
    stale_for_ms: u64,
    temperature: Option<f32>,
    humidity: Option<f32>,
    pressure: Option<f32>,
    vent: Option<&'static str>,
    settings: NodeSettings,
}

fn to_view(id: NodeId, rec: &NodeRecord, live: bool, now_ms: u64) -> NodeView {
    NodeView {
        node_id: id,
        live,
        is_online: rec.is_online,
        stale_for_ms: if rec.is_online {
            now_ms.saturating_sub(rec.last_seen_ms)
        } else {
            0
        },
        temperature: rec.sensor.map(|s| s.temperature),
        humidity: rec.sensor.map(|s| s.humidity),
        pressure: rec.sensor.map(|s| s.pressure),
        vent: rec.sensor.map(|s| s.vent.as_str()),
        settings: rec.settings,
    }
}

#[derive(serde::Serialize)]
struct HubHealth {
    uptime_seconds: u64,
    nodes_tracked: usize,
    nodes_live: usize,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    // clé absente = instance non protégée (réseau local de confiance)
    let expected = std::env::var("SERRE_HUB_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/nodes", get(get_nodes))
        .route("/nodes/{id}", get(get_node))
        .route("/nodes/{id}/settings", post(update_settings))
        .route("/control/all", post(control_all))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

async fn get_system_health(State(app): State<AppState>) -> Json<HubHealth> {
    let now = app.clock.now_ms();
    let reg = app.registry.lock();
    Json(HubHealth {
        uptime_seconds: now / 1000,
        nodes_tracked: reg.tracked_count(),
        nodes_live: reg.live_count(now),
    })
}

// GET /nodes (liste)
async fn get_nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    let now = app.clock.now_ms();
    let reg = app.registry.lock();
    let list = NodeRegistry::node_ids()
        .filter_map(|id| {
            let live = reg.is_live(id, now);
            reg.record(id).map(|r| to_view(id, r, live, now))
        })
        .collect();
    Json(list)
}

// GET /nodes/:id (détail)
async fn get_node(
    State(app): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<NodeView>, StatusCode> {
    let now = app.clock.now_ms();
    let reg = app.registry.lock();
    let live = reg.is_live(id, now);
    let Some(rec) = reg.record(id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(to_view(id, rec, live, now)))
}

/// Mise à jour partielle : seuls les champs présents sont appliqués, après
/// validation de plage (mêmes bornes physiques que le store durable).
#[derive(Debug, Deserialize)]
struct SettingsUpdate {
    temperature_threshold: Option<f32>,
    hysteresis: Option<f32>,
    auto_mode: Option<bool>,
    manual_command: Option<String>,
    schedule: Option<ScheduleSettings>,
}

fn validate_update(upd: &SettingsUpdate) -> Result<Option<ManualCommand>, &'static str> {
    if let Some(t) = upd.temperature_threshold {
        if !t.is_finite() || !(0.0..=50.0).contains(&t) {
            return Err("temperature_threshold out of range [0,50]");
        }
    }
    if let Some(h) = upd.hysteresis {
        if !h.is_finite() || !(0.0..=5.0).contains(&h) {
            return Err("hysteresis out of range [0,5]");
        }
    }
    match upd.manual_command.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => ManualCommand::from_remote(s).map(Some).ok_or("unknown manual_command"),
    }
}

// POST /nodes/:id/settings
async fn update_settings(
    State(app): State<AppState>,
    Path(id): Path<NodeId>,
    Json(upd): Json<SettingsUpdate>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let command = validate_update(&upd)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let now = app.clock.now_ms();
    let settings = {
        let mut reg = app.registry.lock();
        let applied = reg.mutate_settings(id, |s| {
            if let Some(t) = upd.temperature_threshold {
                s.temperature_threshold = t;
            }
            if let Some(h) = upd.hysteresis {
                s.hysteresis = h;
            }
            if let Some(auto) = upd.auto_mode {
                s.auto_mode = auto;
            }
            if let Some(cmd) = command {
                s.manual_command = Some(cmd);
            }
            if let Some(sched) = upd.schedule {
                s.schedule = sched;
            }
        });
        if !applied {
            return Err((StatusCode::NOT_FOUND, format!("unknown node {id}")));
        }
        control::send_control(&mut reg, app.tx.as_ref(), id, now);
        reg.settings_snapshot()
    };

    if let Err(e) = app.store.save_all(&settings).await {
        tracing::warn!("failed to persist settings after update: {e}");
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct ControlAllParams {
    action: String,
}

// POST /control/all {"action": "open"|"close"|"stop"}
async fn control_all(
    State(app): State<AppState>,
    Json(params): Json<ControlAllParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(command) = ManualCommand::from_remote(&params.action) else {
        return Err((StatusCode::BAD_REQUEST, format!("unknown action {}", params.action)));
    };
    let now = app.clock.now_ms();
    control::broadcast_to_all(&app.registry, app.tx.as_ref(), app.remote.as_ref(), command, now)
        .await;
    Ok(Json(serde_json::json!({ "ok": true, "action": params.action })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_update_rejects_out_of_range() {
        let upd = SettingsUpdate {
            temperature_threshold: Some(999.0),
            hysteresis: None,
            auto_mode: None,
            manual_command: None,
            schedule: None,
        };
        assert!(validate_update(&upd).is_err());

        let upd = SettingsUpdate {
            temperature_threshold: None,
            hysteresis: Some(-1.0),
            auto_mode: None,
            manual_command: None,
            schedule: None,
        };
        assert!(validate_update(&upd).is_err());
    }

    #[test]
    fn test_validate_update_maps_command() {
        let upd = SettingsUpdate {
            temperature_threshold: Some(26.0),
            hysteresis: None,
            auto_mode: None,
            manual_command: Some("stop".into()),
            schedule: None,
        };
        assert_eq!(validate_update(&upd).unwrap(), Some(ManualCommand::Stop));

        let upd = SettingsUpdate {
            temperature_threshold: None,
            hysteresis: None,
            auto_mode: None,
            manual_command: Some("explode".into()),
            schedule: None,
        };
        assert!(validate_update(&upd).is_err());
    }
}
