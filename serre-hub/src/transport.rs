/**
 * TRANSPORT BROADCAST - Médium radio partagé, sans adressage ni garantie
 *
 * RÔLE : Envoi fire-and-forget de trames binaires en broadcast UDP, et
 * tâche d'écoute qui alimente le registre avec la télémétrie entrante.
 *
 * FONCTIONNEMENT : pas d'acquittement, pas d'ordre, doublons possibles.
 * Un échec d'envoi est loggé, jamais retenté ici : le prochain cycle de
 * réconciliation re-détectera le diff et renverra. Le handler de réception
 * reste court et non bloquant (décode + ingestion sous lock bref).
 */

use crate::codec;
use crate::registry::SharedRegistry;
use crate::state::Clock;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use tokio::task;
use tracing::{debug, error, info};

/// Couture d'envoi : l'impl de prod broadcast en UDP, les tests capturent.
pub trait BroadcastSender: Send + Sync {
    fn send(&self, payload: &[u8]) -> io::Result<()>;
}

pub struct UdpBroadcast {
    sock: UdpSocket,
    target: SocketAddrV4,
}

impl UdpBroadcast {
    /// Socket UDP éphémère avec SO_BROADCAST, visant l'adresse broadcast
    /// configurée (255.255.255.255 si le hint ne parse pas).
    pub fn new(broadcast_addr: &str, port: u16) -> io::Result<Self> {
        let addr = broadcast_addr
            .parse::<Ipv4Addr>()
            .unwrap_or(Ipv4Addr::new(255, 255, 255, 255));
        let sock = UdpSocket::bind(("0.0.0.0", 0))?;
        sock.set_broadcast(true)?;
        Ok(Self {
            sock,
            target: SocketAddrV4::new(addr, port),
        })
    }
}

impl BroadcastSender for UdpBroadcast {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        self.sock.send_to(payload, self.target).map(|_| ())
    }
}

/// Tâche d'écoute télémétrie : recv → décode → ingestion registre.
/// Les datagrammes de mauvaise taille (trafic étranger) sont jetés sans bruit.
pub fn spawn_telemetry_listener(registry: SharedRegistry, clock: Clock, port: u16) {
    task::spawn(async move {
        let sock = match tokio::net::UdpSocket::bind(("0.0.0.0", port)).await {
            Ok(s) => s,
            Err(e) => {
                error!("telemetry listener bind failed on port {port}: {e}");
                return;
            }
        };
        info!("listening for telemetry on udp/{port}");

        let mut buf = [0u8; 64];
        loop {
            let len = match sock.recv_from(&mut buf).await {
                Ok((len, _)) => len,
                Err(e) => {
                    error!("telemetry recv error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(msg) = codec::decode_telemetry(&buf[..len]) else {
                debug!("dropped {len}-byte datagram (not a telemetry frame)");
                continue;
            };

            let now = clock.now_ms();
            if registry.lock().ingest_telemetry(msg, now) {
                debug!(
                    "telemetry from node {}: {:.1}°C {:.0}% {:.0}hPa vent={}",
                    msg.node_id,
                    msg.temperature,
                    msg.humidity,
                    msg.pressure,
                    msg.vent.as_str()
                );
            }
        }
    });
}
