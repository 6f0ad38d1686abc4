//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use causeway_client::{
    Client, ClientOptions, ClientPool, CommandMonitor, CommandStartedEvent, ReconcileReport,
};
use causeway_test_harness::MockServer;
use causeway_types::{Command, Document, Value};

/// One client against a mock deployment, either standalone or drawn from a
/// client pool.
pub struct Deployment {
    pub server: Arc<MockServer>,
    pub client: Client,
    pool: Option<ClientPool>,
}

impl Deployment {
    pub fn new(pooled: bool) -> Self {
        Self::with(MockServer::new(), pooled, ClientOptions::default())
    }

    pub fn with(server: MockServer, pooled: bool, options: ClientOptions) -> Self {
        let server = server.shared();
        if pooled {
            let pool = ClientPool::new(server.clone(), options);
            let client = pool.pop();
            Self {
                server,
                client,
                pool: Some(pool),
            }
        } else {
            let client = Client::new(server.clone(), options);
            Self {
                server,
                client,
                pool: None,
            }
        }
    }

    /// Another client on the same deployment (pooled) or on its own
    /// deployment against the same server (single).
    pub fn second_client(&self) -> Client {
        match &self.pool {
            Some(pool) => pool.pop(),
            None => Client::new(self.server.clone(), self.client.options().clone()),
        }
    }

    /// Runs teardown the way the owner of the deployment would.
    pub fn teardown(&self) -> ReconcileReport {
        match &self.pool {
            Some(pool) => pool.shutdown(),
            None => self.client.shutdown(),
        }
    }
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn ping() -> Command {
    Command::from_value("admin", serde_json::json!({"ping": 1}))
}

pub fn find() -> Command {
    Command::from_value("db", serde_json::json!({"find": "collection", "filter": {}}))
}

pub fn insert() -> Command {
    Command::from_value(
        "db",
        serde_json::json!({"insert": "collection", "documents": [{"x": 1}]}),
    )
}

/// Records the name of every command started.
#[derive(Default)]
pub struct RecordingMonitor {
    started: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn names(&self) -> Vec<String> {
        self.started.lock().expect("monitor").clone()
    }
}

impl CommandMonitor for RecordingMonitor {
    fn started(&self, event: &CommandStartedEvent<'_>) {
        self.started
            .lock()
            .expect("monitor")
            .push(event.command_name.to_string());
    }
}
