/**
 * STORE RÉGLAGES DURABLE - Persistance des réglages par slot nœud
 *
 * RÔLE : Survivre aux coupures de courant sans corrompre la config.
 * Un fichier binaire unique de MAX_NODES slots fixes de 16 octets
 * (slot = id - 1), commit atomique via fichier temporaire + rename.
 *
 * FONCTIONNEMENT : le chargement ne peut pas échouer. Fichier absent,
 * tronqué ou rempli d'octets arbitraires (premier boot, corruption) :
 * chaque champ hors plage physique ou non fini est remplacé par sa valeur
 * par défaut (seuil 25.0, hystérésis 0.5) au lieu d'être propagé.
 */

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::{
    ManualCommand, NodeSettings, ScheduleSettings, DEFAULT_HYSTERESIS, DEFAULT_THRESHOLD,
    MAX_NODES,
};

/// threshold f32 | hysteresis f32 | auto u8 | manual u8 | open_h u8 |
/// open_m u8 | close_h u8 | close_m u8 | pad u8 x2
pub const SLOT_SIZE: usize = 16;

const REGION_SIZE: usize = SLOT_SIZE * MAX_NODES as usize;

#[derive(Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

fn encode_slot(s: &NodeSettings) -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    buf[0..4].copy_from_slice(&s.temperature_threshold.to_le_bytes());
    buf[4..8].copy_from_slice(&s.hysteresis.to_le_bytes());
    buf[8] = s.auto_mode as u8;
    buf[9] = s.manual_command.map(ManualCommand::to_wire).unwrap_or(0);
    buf[10] = s.schedule.open_hour;
    buf[11] = s.schedule.open_minute;
    buf[12] = s.schedule.close_hour;
    buf[13] = s.schedule.close_minute;
    buf[14] = s.schedule.enabled as u8;
    buf
}

/// Décode un slot en validant chaque champ ; tout ce qui est hors plage
/// physique retombe sur la valeur par défaut.
fn decode_slot(buf: &[u8]) -> NodeSettings {
    let mut threshold = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if !threshold.is_finite() || !(0.0..=50.0).contains(&threshold) {
        threshold = DEFAULT_THRESHOLD;
    }
    let mut hysteresis = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if !hysteresis.is_finite() || !(0.0..=5.0).contains(&hysteresis) {
        hysteresis = DEFAULT_HYSTERESIS;
    }
    let schedule = ScheduleSettings {
        open_hour: if buf[10] < 24 { buf[10] } else { 8 },
        open_minute: if buf[11] < 60 { buf[11] } else { 0 },
        close_hour: if buf[12] < 24 { buf[12] } else { 18 },
        close_minute: if buf[13] < 60 { buf[13] } else { 0 },
        enabled: buf[14] == 1,
    };
    NodeSettings {
        temperature_threshold: threshold,
        hysteresis,
        auto_mode: buf[8] != 0,
        manual_command: ManualCommand::from_wire(buf[9]),
        schedule,
    }
}

impl SettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Sérialise tous les slots et commit la région entière en une fois
    /// (écriture dans un fichier temporaire puis rename).
    pub async fn save_all(&self, settings: &[NodeSettings; MAX_NODES as usize]) -> Result<()> {
        let mut region = Vec::with_capacity(REGION_SIZE);
        for s in settings {
            region.extend_from_slice(&encode_slot(s));
        }

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.ok();
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &region)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to commit {}", self.path.display()))?;
        Ok(())
    }

    /// Recharge tous les slots. Ne retourne jamais d'erreur : un fichier
    /// absent ou trop court donne les défauts pour les slots manquants.
    pub async fn load_all(&self) -> [NodeSettings; MAX_NODES as usize] {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                info!("no settings file at {}, using defaults", self.path.display());
                return core::array::from_fn(|_| NodeSettings::default());
            }
        };

        if raw.len() < REGION_SIZE {
            warn!(
                "settings file {} truncated ({} < {} bytes), short slots get defaults",
                self.path.display(),
                raw.len(),
                REGION_SIZE
            );
        }

        core::array::from_fn(|i| {
            let start = i * SLOT_SIZE;
            match raw.get(start..start + SLOT_SIZE) {
                Some(slot) => decode_slot(slot),
                None => NodeSettings::default(),
            }
        })
    }
}
