/**
 * MOTEUR DE RÉCONCILIATION - Cycle push/pull entre registre local et store distant
 *
 * RÔLE : Garder le store distant cohérent avec les mesures locales, et
 * accepter les éditions distantes comme overrides des réglages locaux.
 *
 * FONCTIONNEMENT, dans l'ordre à chaque cycle :
 * 1. PUSH : pour chaque nœud live, écrase currentData (la télémétrie est
 *    toujours "dernier gagne, poussé par le hub") ; le miroir settings n'est
 *    réécrit que s'il diffère du dernier état poussé, et en fusion (patch)
 *    pour ne jamais écraser un manualControl en attente côté store.
 * 2. PULL : pour chaque nœud, lit le document settings distant, applique
 *    champ par champ ce qui diffère, consomme manualControl (one-shot :
 *    effacé côté store après lecture), puis envoie la trame contrôle et
 *    persiste les réglages si quelque chose a changé.
 *
 * Le push précède toujours le pull : la télémétrie publiée reflète l'état
 * d'avant pull. Un document absent ou un store injoignable = rien à
 * réconcilier pour ce nœud ce cycle, le prochain cycle rattrapera.
 */

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::control;
use crate::models::{ManualCommand, NodeId, NodeSettings, SensorSnapshot, MAX_NODES};
use crate::registry::{NodeRegistry, SharedRegistry};
use crate::remote::{current_data_path, settings_path, RemoteStore};
use crate::settings_store::SettingsStore;
use crate::state::Clock;
use crate::transport::BroadcastSender;

pub struct SyncEngine {
    registry: SharedRegistry,
    remote: Arc<dyn RemoteStore>,
    tx: Arc<dyn BroadcastSender>,
    store: SettingsStore,
    clock: Clock,
    /// Dernier état settings poussé par nœud ; un miroir identique n'est
    /// pas réécrit (pas d'écriture store inutile, et surtout pas de course
    /// avec une édition distante pas encore tirée).
    last_pushed: Mutex<[Option<NodeSettings>; MAX_NODES as usize]>,
}

/// Résultat du diff pull pour un nœud.
#[derive(Debug, Default, PartialEq)]
struct PullOutcome {
    /// Au moins un champ a changé : trame contrôle à envoyer + persistance.
    dirty: bool,
    /// Une commande manualControl a été appliquée : le champ distant doit
    /// être effacé pour ne pas la rejouer au prochain cycle.
    manual_consumed: bool,
}

/// Applique sur les réglages locaux les champs reconnus du document distant.
/// Un champ absent ou d'un mauvais type est ignoré ; une chaîne manualControl
/// inconnue est ignorée et laissée telle quelle côté store.
fn apply_remote_settings(registry: &mut NodeRegistry, id: NodeId, doc: &Value) -> PullOutcome {
    let mut outcome = PullOutcome::default();

    registry.mutate_settings(id, |s| {
        if let Some(threshold) = doc.get("temperatureThreshold").and_then(Value::as_f64) {
            let threshold = threshold as f32;
            if threshold != s.temperature_threshold {
                s.temperature_threshold = threshold;
                outcome.dirty = true;
            }
        }

        if let Some(hysteresis) = doc.get("hysteresis").and_then(Value::as_f64) {
            let hysteresis = hysteresis as f32;
            if hysteresis != s.hysteresis {
                s.hysteresis = hysteresis;
                outcome.dirty = true;
            }
        }

        if let Some(mode) = doc.get("mode").and_then(Value::as_str) {
            let auto = mode == "auto";
            if auto != s.auto_mode {
                s.auto_mode = auto;
                outcome.dirty = true;
            }
        }

        if let Some(cmd) = doc
            .get("manualControl")
            .and_then(Value::as_str)
            .and_then(ManualCommand::from_remote)
        {
            s.manual_command = Some(cmd);
            outcome.dirty = true;
            outcome.manual_consumed = true;
        }
    });

    outcome
}

fn current_data_json(sensor: &SensorSnapshot) -> Value {
    json!({
        "nodeId": sensor.node_id,
        "temperature": sensor.temperature,
        "humidity": sensor.humidity,
        "pressure": sensor.pressure,
        "ventStatus": sensor.vent.as_str(),
        "timestamp": sensor.timestamp,
    })
}

fn settings_json(settings: &NodeSettings, sensor: &SensorSnapshot) -> Value {
    json!({
        "temperatureThreshold": settings.temperature_threshold,
        "hysteresis": settings.hysteresis,
        "mode": if settings.auto_mode { "auto" } else { "manual" },
        "ventStatus": sensor.vent.as_str(),
        "scheduleOpenHour": settings.schedule.open_hour,
        "scheduleOpenMinute": settings.schedule.open_minute,
        "scheduleCloseHour": settings.schedule.close_hour,
        "scheduleCloseMinute": settings.schedule.close_minute,
        "scheduleEnabled": settings.schedule.enabled,
    })
}

impl SyncEngine {
    pub fn new(
        registry: SharedRegistry,
        remote: Arc<dyn RemoteStore>,
        tx: Arc<dyn BroadcastSender>,
        store: SettingsStore,
        clock: Clock,
    ) -> Self {
        Self {
            registry,
            remote,
            tx,
            store,
            clock,
            last_pushed: Mutex::new([None; MAX_NODES as usize]),
        }
    }

    /// Un cycle complet : push puis pull. Jamais d'erreur remontée, tout
    /// échec dégrade en "on réessaiera au prochain cycle".
    pub async fn run_cycle(&self) {
        self.push_phase().await;
        self.pull_phase().await;
    }

    /// Push local → distant, uniquement pour les nœuds live : la fraîcheur
    /// se re-vérifie ici, pas via le flag is_online seul.
    async fn push_phase(&self) {
        let now = self.clock.now_ms();
        for id in NodeRegistry::node_ids() {
            // snapshot sous lock, lock relâché avant tout await
            let snapshot = {
                let reg = self.registry.lock();
                if !reg.is_live(id, now) {
                    None
                } else {
                    reg.record(id).and_then(|r| r.sensor.map(|sensor| (sensor, r.settings)))
                }
            };
            let Some((sensor, settings)) = snapshot else {
                continue;
            };

            if let Err(e) = self
                .remote
                .put(&current_data_path(id), &current_data_json(&sensor))
                .await
            {
                warn!("push currentData for node {id} failed: {e}");
                continue;
            }

            let slot = usize::from(id) - 1;
            if self.last_pushed.lock()[slot] == Some(settings) {
                continue;
            }
            match self
                .remote
                .patch(&settings_path(id), &settings_json(&settings, &sensor))
                .await
            {
                Ok(()) => {
                    self.last_pushed.lock()[slot] = Some(settings);
                    debug!("pushed settings mirror for node {id}");
                }
                Err(e) => warn!("push settings for node {id} failed: {e}"),
            }
        }
    }

    /// Pull distant → local : diff champ par champ, consommation one-shot
    /// de manualControl, envoi contrôle + persistance si dirty.
    async fn pull_phase(&self) {
        for id in NodeRegistry::node_ids() {
            let doc = match self.remote.get(&settings_path(id)).await {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(e) => {
                    debug!("pull settings for node {id} unavailable: {e}");
                    continue;
                }
            };

            let outcome = {
                let mut reg = self.registry.lock();
                apply_remote_settings(&mut reg, id, &doc)
            };

            if outcome.manual_consumed {
                // effacement côté store dès la consommation : une trame radio
                // perdue ensuite ne sera pas rejouée depuis le distant (assumé)
                if let Err(e) = self
                    .remote
                    .patch(&settings_path(id), &json!({ "manualControl": Value::Null }))
                    .await
                {
                    warn!("failed to clear manualControl for node {id}: {e}");
                }
            }

            if outcome.dirty {
                info!("remote settings changed for node {id}, sending control");
                let now = self.clock.now_ms();
                let settings = {
                    let mut reg = self.registry.lock();
                    control::send_control(&mut reg, self.tx.as_ref(), id, now);
                    reg.settings_snapshot()
                };
                if let Err(e) = self.store.save_all(&settings).await {
                    warn!("failed to persist settings: {e}");
                }
            }
        }
    }
}

/// Boucle de réconciliation à intervalle fixe. Le corps est awaité dans la
/// même tâche : deux cycles ne peuvent jamais se chevaucher.
pub fn spawn_sync_loop(engine: SyncEngine, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("reconciliation loop started (every {interval_secs}s)");
        loop {
            interval.tick().await;
            engine.run_cycle().await;
        }
    });
}
