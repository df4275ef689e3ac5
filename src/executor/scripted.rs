//! A scripted backend for executor tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::changeset::ActionClass;
use crate::error::BackendError;

use super::backend::{Backend, ServiceParams};

/// Backend whose behaviour per identifier is set up front.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    silent: HashSet<String>,
    panics: HashSet<String>,
    calls: Mutex<Vec<(ActionClass, String)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str, message: &str) -> Self {
        self.failures.insert(id.to_string(), message.to_string());
        self
    }

    pub fn delayed(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn silent(mut self, id: &str) -> Self {
        self.silent.insert(id.to_string());
        self
    }

    pub fn panicking(mut self, id: &str) -> Self {
        self.panics.insert(id.to_string());
        self
    }

    /// Every dispatched operation, in dispatch order.
    pub fn calls(&self) -> Vec<(ActionClass, String)> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Identifiers dispatched, in dispatch order.
    pub fn called_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, id)| id).collect()
    }

    /// Highest number of operations seen in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn handle(&self, action: ActionClass, params: ServiceParams) {
        let id = params.id().to_string();
        self.calls.lock().expect("calls lock").push((action, id.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(&id) {
            panic!("scripted panic for {id}");
        }
        if self.silent.contains(&id) {
            return;
        }
        match self.failures.get(&id) {
            Some(message) => params.fail(BackendError::rejected(message.clone())),
            None => params.succeed(format!("{action}:{id}")),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(&self, params: ServiceParams) {
        self.handle(ActionClass::Create, params).await;
    }

    async fn update(&self, params: ServiceParams) {
        self.handle(ActionClass::Update, params).await;
    }

    async fn delete(&self, params: ServiceParams) {
        self.handle(ActionClass::Delete, params).await;
    }
}
