/**
 * REGISTRE NŒUDS - Table en mémoire de l'état des nœuds serre
 *
 * RÔLE : Source de vérité unique "ce nœud est-il joignable" + dernier
 * snapshot capteur + réglages courants, un slot par id (1..=MAX_NODES).
 *
 * INVARIANT : is_online est collant (déjà vu au moins une fois) et n'est
 * jamais repassé à false ; la vivacité réelle se re-vérifie à chaque usage
 * via is_live(id, now_ms) et la fenêtre de 300s. Les consommateurs ne
 * doivent jamais faire confiance au flag seul.
 */

use crate::codec::TelemetryMessage;
use crate::models::{NodeId, NodeRecord, NodeSettings, MAX_NODES, STALE_TIMEOUT_MS};
use crate::state::Shared;

pub struct NodeRegistry {
    nodes: [NodeRecord; MAX_NODES as usize],
}

pub type SharedRegistry = Shared<NodeRegistry>;

fn slot(id: NodeId) -> Option<usize> {
    if (1..=MAX_NODES).contains(&id) {
        Some(usize::from(id) - 1)
    } else {
        None
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: [NodeRecord::default(); MAX_NODES as usize],
        }
    }

    /// Registre pré-chargé avec les réglages restaurés du store durable.
    pub fn with_settings(settings: [NodeSettings; MAX_NODES as usize]) -> Self {
        let mut reg = Self::new();
        for (rec, s) in reg.nodes.iter_mut().zip(settings) {
            rec.settings = s;
        }
        reg
    }

    /// Ingestion d'une trame télémétrie décodée. Un id hors plage est jeté
    /// en silence : sur un médium partagé, voir du trafic étranger est
    /// routinier, pas une erreur à remonter.
    pub fn ingest_telemetry(&mut self, msg: TelemetryMessage, now_ms: u64) -> bool {
        let Some(i) = slot(msg.node_id) else {
            return false;
        };
        self.nodes[i].sensor = Some(msg.into_snapshot());
        self.nodes[i].is_online = true;
        self.nodes[i].last_seen_ms = now_ms;
        true
    }

    /// Vivacité en deux temps : déjà vu ET vu récemment.
    pub fn is_live(&self, id: NodeId, now_ms: u64) -> bool {
        let Some(i) = slot(id) else { return false };
        let rec = &self.nodes[i];
        rec.is_online && now_ms.saturating_sub(rec.last_seen_ms) < STALE_TIMEOUT_MS
    }

    pub fn record(&self, id: NodeId) -> Option<&NodeRecord> {
        slot(id).map(|i| &self.nodes[i])
    }

    /// Seul point d'écriture des réglages, partagé par le moteur de sync et
    /// l'API. Retourne false pour un id hors plage.
    pub fn mutate_settings(&mut self, id: NodeId, f: impl FnOnce(&mut NodeSettings)) -> bool {
        let Some(i) = slot(id) else { return false };
        f(&mut self.nodes[i].settings);
        true
    }

    pub fn node_ids() -> impl Iterator<Item = NodeId> {
        1..=MAX_NODES
    }

    pub fn live_count(&self, now_ms: u64) -> usize {
        Self::node_ids().filter(|&id| self.is_live(id, now_ms)).count()
    }

    pub fn tracked_count(&self) -> usize {
        self.nodes.iter().filter(|r| r.is_online).count()
    }

    /// Copie point-in-time de tous les réglages, pour la persistance.
    pub fn settings_snapshot(&self) -> [NodeSettings; MAX_NODES as usize] {
        core::array::from_fn(|i| self.nodes[i].settings)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VentState;

    fn telemetry(node_id: u8) -> TelemetryMessage {
        TelemetryMessage {
            node_id,
            temperature: 21.0,
            humidity: 55.0,
            pressure: 1008.0,
            vent: VentState::Closed,
            timestamp: 42,
        }
    }

    #[test]
    fn test_ingest_updates_record() {
        let mut reg = NodeRegistry::new();
        assert!(reg.ingest_telemetry(telemetry(2), 1_000));
        let rec = reg.record(2).unwrap();
        assert!(rec.is_online);
        assert_eq!(rec.last_seen_ms, 1_000);
        assert_eq!(rec.sensor.unwrap().temperature, 21.0);
    }

    #[test]
    fn test_ingest_out_of_range_is_noop() {
        let mut reg = NodeRegistry::new();
        assert!(!reg.ingest_telemetry(telemetry(0), 1_000));
        assert!(!reg.ingest_telemetry(telemetry(MAX_NODES + 1), 1_000));
        for id in NodeRegistry::node_ids() {
            let rec = reg.record(id).unwrap();
            assert!(!rec.is_online);
            assert!(rec.sensor.is_none());
        }
    }

    #[test]
    fn test_liveness_window() {
        let mut reg = NodeRegistry::new();
        reg.ingest_telemetry(telemetry(3), 0);
        assert!(reg.is_live(3, 250_000));
        assert!(!reg.is_live(3, 350_000));
        // le flag reste collant même une fois stale
        assert!(reg.record(3).unwrap().is_online);
    }

    #[test]
    fn test_never_seen_is_not_live() {
        let reg = NodeRegistry::new();
        assert!(!reg.is_live(1, 0));
        assert!(!reg.is_live(0, 0));
    }

    #[test]
    fn test_mutate_settings() {
        let mut reg = NodeRegistry::new();
        assert!(reg.mutate_settings(1, |s| s.temperature_threshold = 30.0));
        assert_eq!(reg.record(1).unwrap().settings.temperature_threshold, 30.0);
        assert!(!reg.mutate_settings(0, |s| s.temperature_threshold = 30.0));
    }
}
