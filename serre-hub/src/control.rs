/**
 * ENVOI CONTRÔLE - Chemin hub → nœud sur le lien radio
 *
 * RÔLE : Encoder et broadcaster les messages contrôle, et garantir le
 * contrat one-shot : manual_command repasse à None après chaque tentative,
 * que la trame soit partie ou non.
 *
 * CONTRAT : jamais d'émission vers un nœud non live (jamais vu ou stale) ;
 * une trame perdue n'est pas rejouée, c'est le diff du prochain cycle de
 * réconciliation qui rattrape.
 */

use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::codec;
use crate::models::{ManualCommand, NodeId};
use crate::registry::{NodeRegistry, SharedRegistry};
use crate::remote::{RemoteStore, LAST_CONTROL_ALL_PATH};
use crate::transport::BroadcastSender;

/// Encode et broadcast le message contrôle du nœud si celui-ci est live.
/// Dans tous les cas la commande manuelle locale est consommée : la laisser
/// en place rejouerait la commande au prochain envoi.
pub fn send_control(
    registry: &mut NodeRegistry,
    tx: &dyn BroadcastSender,
    id: NodeId,
    now_ms: u64,
) {
    if registry.is_live(id, now_ms) {
        if let Some(rec) = registry.record(id) {
            let pkt = codec::encode_control(id, &rec.settings);
            match tx.send(&pkt) {
                Ok(()) => info!("control sent to node {id}"),
                Err(e) => warn!("control send to node {id} failed: {e}"),
            }
        }
    }
    registry.mutate_settings(id, |s| s.manual_command = None);
}

/// Applique une commande à tous les nœuds live : pose la commande one-shot,
/// bascule en manuel pour Open/Close (ouvrir/fermer "tout" est une intention
/// explicite qui prime sur l'automatique), puis envoie nœud par nœud.
/// Trace ensuite l'action en best-effort dans le store distant.
pub async fn broadcast_to_all(
    registry: &SharedRegistry,
    tx: &dyn BroadcastSender,
    remote: &dyn RemoteStore,
    command: ManualCommand,
    now_ms: u64,
) {
    let mut touched = 0u32;
    {
        let mut reg = registry.lock();
        for id in NodeRegistry::node_ids() {
            if !reg.is_live(id, now_ms) {
                continue;
            }
            reg.mutate_settings(id, |s| {
                s.manual_command = Some(command);
                if matches!(command, ManualCommand::Open | ManualCommand::Close) {
                    s.auto_mode = false;
                }
            });
            send_control(&mut reg, tx, id, now_ms);
            touched += 1;
        }
    }
    info!("broadcast command {command:?} to {touched} live node(s)");

    let action = if command == ManualCommand::Open { "open" } else { "close" };
    let record = json!({
        "action": action,
        "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
    });
    if let Err(e) = remote.put(LAST_CONTROL_ALL_PATH, &record).await {
        warn!("failed to record lastControlAll: {e}");
    }
}
