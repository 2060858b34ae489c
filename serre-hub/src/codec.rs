/**
 * CODEC RADIO - Trames binaires fixes échangées sur le broadcast UDP
 *
 * RÔLE : Sérialisation/désérialisation des deux formes de trame :
 * télémétrie (nœud → hub, 18 octets) et contrôle (hub → nœud, 11 octets).
 *
 * CONTRAT : layout little-endian figé, identique au décodeur embarqué côté
 * nœud. Toute trame dont la taille ne correspond pas est jetée sans décodage
 * partiel : le médium est partagé, du trafic étranger y est routinier.
 */

use crate::models::{ManualCommand, NodeId, NodeSettings, SensorSnapshot, VentState};

/// node_id u8 | temperature f32 | humidity f32 | pressure f32 | vent u8 | timestamp u32
pub const TELEMETRY_LEN: usize = 18;

/// target u8 | threshold f32 | hysteresis f32 | auto u8 | manual u8
pub const CONTROL_LEN: usize = 11;

#[derive(Debug, Clone, Copy)]
pub struct TelemetryMessage {
    pub node_id: NodeId,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub vent: VentState,
    pub timestamp: u32,
}

impl TelemetryMessage {
    pub fn into_snapshot(self) -> SensorSnapshot {
        SensorSnapshot {
            node_id: self.node_id,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            vent: self.vent,
            timestamp: self.timestamp,
        }
    }
}

fn read_f32(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Décode une trame télémétrie. None si la taille ne colle pas exactement.
pub fn decode_telemetry(buf: &[u8]) -> Option<TelemetryMessage> {
    if buf.len() != TELEMETRY_LEN {
        return None;
    }
    Some(TelemetryMessage {
        node_id: buf[0],
        temperature: read_f32(buf, 1),
        humidity: read_f32(buf, 5),
        pressure: read_f32(buf, 9),
        vent: VentState::from_wire(buf[13]),
        timestamp: u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]),
    })
}

/// Encode la trame contrôle pour un nœud. Broadcast à tout le monde :
/// chaque nœud filtre lui-même sur target_node_id.
pub fn encode_control(target: NodeId, settings: &NodeSettings) -> [u8; CONTROL_LEN] {
    let mut pkt = [0u8; CONTROL_LEN];
    pkt[0] = target;
    pkt[1..5].copy_from_slice(&settings.temperature_threshold.to_le_bytes());
    pkt[5..9].copy_from_slice(&settings.hysteresis.to_le_bytes());
    pkt[9] = settings.auto_mode as u8;
    pkt[10] = settings.manual_command.map(ManualCommand::to_wire).unwrap_or(0);
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeSettings;

    fn telemetry_frame(node_id: u8) -> [u8; TELEMETRY_LEN] {
        let mut buf = [0u8; TELEMETRY_LEN];
        buf[0] = node_id;
        buf[1..5].copy_from_slice(&23.5f32.to_le_bytes());
        buf[5..9].copy_from_slice(&61.0f32.to_le_bytes());
        buf[9..13].copy_from_slice(&1013.2f32.to_le_bytes());
        buf[13] = 2; // open
        buf[14..18].copy_from_slice(&123_456u32.to_le_bytes());
        buf
    }

    #[test]
    fn test_decode_telemetry() {
        let msg = decode_telemetry(&telemetry_frame(3)).unwrap();
        assert_eq!(msg.node_id, 3);
        assert_eq!(msg.temperature, 23.5);
        assert_eq!(msg.humidity, 61.0);
        assert_eq!(msg.pressure, 1013.2);
        assert_eq!(msg.vent, VentState::Open);
        assert_eq!(msg.timestamp, 123_456);
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        assert!(decode_telemetry(&[0u8; TELEMETRY_LEN - 1]).is_none());
        assert!(decode_telemetry(&[0u8; TELEMETRY_LEN + 1]).is_none());
        assert!(decode_telemetry(&[]).is_none());
    }

    #[test]
    fn test_decode_unknown_vent_byte() {
        let mut frame = telemetry_frame(1);
        frame[13] = 9;
        assert_eq!(decode_telemetry(&frame).unwrap().vent, VentState::Unknown);
    }

    #[test]
    fn test_encode_control_layout() {
        let settings = NodeSettings {
            temperature_threshold: 27.5,
            hysteresis: 1.0,
            auto_mode: false,
            manual_command: Some(ManualCommand::Open),
            ..NodeSettings::default()
        };
        let pkt = encode_control(4, &settings);
        assert_eq!(pkt[0], 4);
        assert_eq!(f32::from_le_bytes(pkt[1..5].try_into().unwrap()), 27.5);
        assert_eq!(f32::from_le_bytes(pkt[5..9].try_into().unwrap()), 1.0);
        assert_eq!(pkt[9], 0);
        assert_eq!(pkt[10], b'O');
    }

    #[test]
    fn test_encode_control_no_pending_command() {
        let pkt = encode_control(1, &NodeSettings::default());
        assert_eq!(pkt[9], 1); // auto par défaut
        assert_eq!(pkt[10], 0);
    }
}
