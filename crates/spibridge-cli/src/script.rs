//! Replay scripts.
//!
//! A script is a JSON document listing batches of content operations:
//!
//! ```json
//! {
//!   "batches": [
//!     { "user": "alice", "ops": [
//!         { "op": "add_node", "path": "/docs", "primary_type": "nt:folder" },
//!         { "op": "add_mixin", "path": "/docs", "mixin": "mix:referenceable" }
//!     ] },
//!     { "local": true, "ops": [
//!         { "op": "set_property", "path": "/docs", "name": "title", "value": "Docs" }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Each batch is applied as one store batch, so a subscriber receives it as
//! one bundle. Local batches run through the subscriber's own session.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use spibridge_core::{Batch, EventSubscription, MemorySession, MemoryStore};

/// User of remote batches that do not name one.
pub const DEFAULT_USER: &str = "anonymous";

/// Script errors.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    /// The script is not valid JSON or has an unknown shape.
    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation failed.
    #[error("batch {batch}, operation {op}: {source}")]
    Operation {
        batch: usize,
        op: usize,
        #[source]
        source: spibridge_core::Error,
    },

    /// Listener registration failed.
    #[error("subscription error: {0}")]
    Subscription(#[from] spibridge_core::Error),
}

/// A parsed replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Script {
    pub batches: Vec<ScriptBatch>,
}

/// One group of operations reported together.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptBatch {
    /// Run through the subscriber's session.
    #[serde(default)]
    pub local: bool,
    /// User of a remote batch.
    #[serde(default)]
    pub user: Option<String>,
    pub ops: Vec<Operation>,
}

/// A content operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    AddNode { path: String, primary_type: String },
    AddMixin { path: String, mixin: String },
    SetProperty { path: String, name: String, value: String },
    RemoveProperty { path: String, name: String },
    RemoveNode { path: String },
}

impl Operation {
    fn apply(&self, batch: &mut Batch<'_>) -> Result<(), spibridge_core::Error> {
        match self {
            Operation::AddNode { path, primary_type } => batch.add_node(path, primary_type),
            Operation::AddMixin { path, mixin } => batch.add_mixin(path, mixin),
            Operation::SetProperty { path, name, value } => batch.set_property(path, name, value),
            Operation::RemoveProperty { path, name } => batch.remove_property(path, name),
            Operation::RemoveNode { path } => batch.remove_node(path),
        }
    }
}

impl Script {
    /// Parse a script from JSON text.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a script file.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Number of operations over all batches.
    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(|b| b.ops.len()).sum()
    }

    /// Apply every batch in order.
    ///
    /// Remote batches run through one session per user. Local batches run
    /// through `own` with the subscription's local listener attached.
    pub fn replay(
        &self,
        store: &MemoryStore,
        own: &MemorySession,
        subscription: &EventSubscription<MemorySession>,
    ) -> Result<(), ScriptError> {
        let mut sessions: HashMap<String, MemorySession> = HashMap::new();

        for (index, batch) in self.batches.iter().enumerate() {
            let result = if batch.local {
                subscription.with_local_listener(own, || apply_batch(own, &batch.ops))?
            } else {
                let user = batch.user.as_deref().unwrap_or(DEFAULT_USER);
                let session = sessions
                    .entry(user.to_string())
                    .or_insert_with(|| store.login(user));
                apply_batch(session, &batch.ops)
            };

            result.map_err(|(op, source)| ScriptError::Operation {
                batch: index,
                op,
                source,
            })?;
            tracing::debug!(batch = index, ops = batch.ops.len(), local = batch.local, "batch applied");
        }

        Ok(())
    }
}

/// Apply `ops` as one batch, reporting the index of a failing operation.
fn apply_batch(
    session: &MemorySession,
    ops: &[Operation],
) -> Result<(), (usize, spibridge_core::Error)> {
    let mut current = 0;
    session
        .batch(|tx| {
            for (op, operation) in ops.iter().enumerate() {
                current = op;
                operation.apply(tx)?;
            }
            Ok(())
        })
        .map_err(|source| (current, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "batches": [
            { "user": "alice", "ops": [
                { "op": "add_node", "path": "/docs", "primary_type": "nt:folder" },
                { "op": "add_mixin", "path": "/docs", "mixin": "mix:referenceable" }
            ] },
            { "local": true, "ops": [
                { "op": "set_property", "path": "/docs", "name": "title", "value": "Docs" },
                { "op": "remove_property", "path": "/docs", "name": "title" }
            ] },
            { "ops": [ { "op": "remove_node", "path": "/docs" } ] }
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script = Script::parse(SAMPLE).unwrap();
        assert_eq!(script.batches.len(), 3);
        assert_eq!(script.operation_count(), 5);
        assert!(script.batches[1].local);
        assert_eq!(script.batches[0].user.as_deref(), Some("alice"));
        assert_eq!(
            script.batches[2].ops[0],
            Operation::RemoveNode {
                path: "/docs".to_string()
            }
        );
    }

    #[test]
    fn test_replay_produces_one_bundle_per_batch() {
        use std::sync::Arc;
        use std::time::Duration;

        use spibridge_core::SubscriptionConfig;
        use spibridge_proto::DefaultIdFactory;

        let script = Script::parse(SAMPLE).unwrap();
        let store = MemoryStore::new();
        let own = store.login("spibridge");
        let subscription = EventSubscription::new(
            Arc::new(DefaultIdFactory),
            Arc::new(own.clone()),
            SubscriptionConfig::default(),
        )
        .unwrap();
        subscription.register(&own).unwrap();

        script.replay(&store, &own, &subscription).unwrap();

        let bundles = subscription.get_event_bundles(&[], Duration::from_millis(50));
        let shape: Vec<(bool, usize)> = bundles.iter().map(|b| (b.is_local(), b.len())).collect();
        // the local property is already removed when its addition is translated
        assert_eq!(shape, vec![(false, 3), (true, 1), (false, 1)]);
        assert_eq!(subscription.stats().translation_failures, 1);
        assert_eq!(bundles[0].events()[0].user_id(), Some("alice"));
        assert_eq!(bundles[2].events()[0].user_id(), Some(DEFAULT_USER));
        assert!(!own.node_exists("/docs"));
    }

    #[test]
    fn test_failing_operation_is_located() {
        let script = Script::parse(
            r#"{ "batches": [
                { "ops": [ { "op": "add_node", "path": "/a", "primary_type": "nt:unstructured" } ] },
                { "ops": [
                    { "op": "add_node", "path": "/b", "primary_type": "nt:unstructured" },
                    { "op": "remove_node", "path": "/missing" }
                ] }
            ] }"#,
        )
        .unwrap();
        let store = MemoryStore::new();
        let own = store.login("spibridge");
        let subscription = EventSubscription::new(
            std::sync::Arc::new(spibridge_proto::DefaultIdFactory),
            std::sync::Arc::new(own.clone()),
            spibridge_core::SubscriptionConfig::default(),
        )
        .unwrap();

        let err = script.replay(&store, &own, &subscription).unwrap_err();
        assert!(matches!(err, ScriptError::Operation { batch: 1, op: 1, .. }));
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let err = Script::parse(r#"{ "batches": [ { "ops": [ { "op": "rename", "path": "/a" } ] } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Json(_)));
    }
}
