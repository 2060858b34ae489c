/**
 * STORE DISTANT - Client du store documentaire cloud (API style RTDB)
 *
 * RÔLE : Lecture/écriture des documents JSON par nœud que le moteur de
 * réconciliation pousse et tire. Un document par chemin :
 * greenhouses/{id}/currentData, greenhouses/{id}/settings,
 * system/lastControlAll.
 *
 * FONCTIONNEMENT : REST minimal (GET/PUT/PATCH sur {base}/{chemin}.json),
 * timeout borné pour ne jamais bloquer un cycle. Pas d'auth forte : le
 * token optionnel passe en query param, comme le store le permet.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::models::NodeId;

pub const LAST_CONTROL_ALL_PATH: &str = "system/lastControlAll";

pub fn current_data_path(id: NodeId) -> String {
    format!("greenhouses/{id}/currentData")
}

pub fn settings_path(id: NodeId) -> String {
    format!("greenhouses/{id}/settings")
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Couture vers le store distant ; l'impl de prod parle REST, les tests
/// branchent un store en mémoire.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lit un document. Ok(None) si le chemin n'existe pas côté store.
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Remplace entièrement le document au chemin donné.
    async fn put(&self, path: &str, value: &Value) -> Result<(), RemoteError>;

    /// Fusionne les champs donnés dans le document existant
    /// (un champ à null efface la clé côté store).
    async fn patch(&self, path: &str, value: &Value) -> Result<(), RemoteError>;
}

pub struct RtdbClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl RtdbClient {
    pub fn new(base_url: &str, auth: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("http client builder failed ({e}), using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        match &self.auth {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }
}

#[async_trait]
impl RemoteStore for RtdbClient {
    async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }
        let body: Value = response.json().await?;
        // un chemin absent répond 200 avec un corps `null`
        if body.is_null() {
            Ok(None)
        } else {
            Ok(Some(body))
        }
    }

    async fn put(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
        let response = self.client.put(self.url(path)).json(value).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }
        Ok(())
    }

    async fn patch(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
        let response = self.client.patch(self.url(path)).json(value).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Store en mémoire : documents par chemin + journal des patches,
    /// avec la même sémantique "patch à null efface la clé" que le vrai.
    #[derive(Default)]
    pub struct FakeRemote {
        pub docs: Mutex<HashMap<String, Value>>,
        pub patches: Mutex<Vec<(String, Value)>>,
        pub unavailable: bool,
    }

    impl FakeRemote {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_doc(self, path: &str, doc: Value) -> Self {
            self.docs.lock().insert(path.to_string(), doc);
            self
        }

        pub fn doc(&self, path: &str) -> Option<Value> {
            self.docs.lock().get(path).cloned()
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        async fn get(&self, path: &str) -> Result<Option<Value>, RemoteError> {
            if self.unavailable {
                return Err(RemoteError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(self.docs.lock().get(path).cloned())
        }

        async fn put(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
            if self.unavailable {
                return Err(RemoteError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
            }
            self.docs.lock().insert(path.to_string(), value.clone());
            Ok(())
        }

        async fn patch(&self, path: &str, value: &Value) -> Result<(), RemoteError> {
            if self.unavailable {
                return Err(RemoteError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
            }
            self.patches.lock().push((path.to_string(), value.clone()));
            let mut docs = self.docs.lock();
            let doc = docs.entry(path.to_string()).or_insert_with(|| Value::Object(Default::default()));
            if let (Value::Object(doc), Value::Object(fields)) = (doc, value) {
                for (k, v) in fields {
                    if v.is_null() {
                        doc.remove(k);
                    } else {
                        doc.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(())
        }
    }
}
