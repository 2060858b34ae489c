use serde::{Deserialize, Serialize};

/// Nombre de slots nœuds (ids valides : 1..=MAX_NODES, 0 réservé/invalide).
pub const MAX_NODES: u8 = 6;

/// Fenêtre de staleness : un nœud muet depuis plus longtemps n'est plus "live".
pub const STALE_TIMEOUT_MS: u64 = 300_000;

pub type NodeId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VentState {
    Closed,
    Opening,
    Open,
    Closing,
    Unknown,
}

impl VentState {
    pub fn from_wire(b: u8) -> Self {
        match b {
            0 => VentState::Closed,
            1 => VentState::Opening,
            2 => VentState::Open,
            3 => VentState::Closing,
            _ => VentState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VentState::Closed => "closed",
            VentState::Opening => "opening",
            VentState::Open => "open",
            VentState::Closing => "closing",
            VentState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualCommand {
    Open,
    Close,
    Stop,
}

impl ManualCommand {
    /// Octet envoyé sur le lien radio (0 = aucune commande).
    pub fn to_wire(self) -> u8 {
        match self {
            ManualCommand::Open => b'O',
            ManualCommand::Close => b'C',
            ManualCommand::Stop => b'S',
        }
    }

    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            b'O' => Some(ManualCommand::Open),
            b'C' => Some(ManualCommand::Close),
            b'S' => Some(ManualCommand::Stop),
            _ => None,
        }
    }

    /// Valeur du champ `manualControl` côté store distant. Toute autre
    /// chaîne est ignorée (aucune commande appliquée).
    pub fn from_remote(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ManualCommand::Open),
            "close" => Some(ManualCommand::Close),
            "stop" => Some(ManualCommand::Stop),
            _ => None,
        }
    }
}

/// Dernière mesure reçue d'un nœud ; produit uniquement par le décodage
/// d'une trame télémétrie, immuable jusqu'à remplacement par une plus récente.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorSnapshot {
    pub node_id: NodeId,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub vent: VentState,
    /// Horloge locale du nœud (ms), opaque pour le hub.
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub open_hour: u8,
    pub open_minute: u8,
    pub close_hour: u8,
    pub close_minute: u8,
    pub enabled: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            open_hour: 8,
            open_minute: 0,
            close_hour: 18,
            close_minute: 0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeSettings {
    /// Seuil de température (°C), plage physique [0, 50].
    pub temperature_threshold: f32,
    /// Hystérésis (°C), plage physique [0, 5].
    pub hysteresis: f32,
    pub auto_mode: bool,
    /// Commande one-shot : remise à None dès qu'un message contrôle part.
    pub manual_command: Option<ManualCommand>,
    pub schedule: ScheduleSettings,
}

pub const DEFAULT_THRESHOLD: f32 = 25.0;
pub const DEFAULT_HYSTERESIS: f32 = 0.5;

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            temperature_threshold: DEFAULT_THRESHOLD,
            hysteresis: DEFAULT_HYSTERESIS,
            auto_mode: true,
            manual_command: None,
            schedule: ScheduleSettings::default(),
        }
    }
}

/// État complet d'un slot nœud dans le registre.
/// `is_online` est collant ("déjà vu au moins une fois") ; la vivacité réelle
/// se re-dérive à l'usage via la fenêtre STALE_TIMEOUT_MS, jamais en cache.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    pub sensor: Option<SensorSnapshot>,
    pub settings: NodeSettings,
    pub is_online: bool,
    pub last_seen_ms: u64,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            sensor: None,
            settings: NodeSettings::default(),
            is_online: false,
            last_seen_ms: 0,
        }
    }
}
