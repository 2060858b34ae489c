use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Horloge monotone du hub, en millisecondes depuis le démarrage.
/// Équivalent du millis() des nœuds : toute l'arithmétique de vivacité
/// passe par un `now_ms` explicite pour rester testable.
#[derive(Clone)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
