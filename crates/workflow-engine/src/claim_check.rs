//! Large-state offload decorator (`spec.md` §4.5 step 10, §9).
//!
//! The claim-check service itself is an external collaborator (out of
//! scope); this module only defines the decorator interface the `do`
//! sequencer calls through, in the same decorator style as
//! `durable::reliability::circuit_breaker`.

use serde_json::{Map, Value};

pub trait ClaimCheckManager: Send + Sync {
    /// Replace any oversized values in `data`/`context` with opaque
    /// reference tokens.
    fn maybe_offload(&self, data: &mut Map<String, Value>);

    /// Replace any reference tokens in `data`/`context` with their
    /// original values.
    fn maybe_retrieve(&self, data: &mut Map<String, Value>);
}

/// Default: offload is disabled.
pub struct NoopClaimCheck;

impl ClaimCheckManager for NoopClaimCheck {
    fn maybe_offload(&self, _data: &mut Map<String, Value>) {}
    fn maybe_retrieve(&self, _data: &mut Map<String, Value>) {}
}

/// Offloads any field whose serialized size exceeds `threshold_bytes` into
/// an in-process store, replacing it in place with `claimcheck://<token>`.
/// A real deployment would back `store` with the external claim-check
/// service; this implementation is for tests/dev.
pub struct SizeThresholdClaimCheck<S: ClaimCheckStore> {
    pub threshold_bytes: usize,
    pub store: S,
}

pub trait ClaimCheckStore: Send + Sync {
    fn put(&self, bytes: Vec<u8>) -> String;
    fn get(&self, token: &str) -> Option<Vec<u8>>;
}

impl<S: ClaimCheckStore> ClaimCheckManager for SizeThresholdClaimCheck<S> {
    fn maybe_offload(&self, data: &mut Map<String, Value>) {
        for (_key, value) in data.iter_mut() {
            let serialized = serde_json::to_vec(value).unwrap_or_default();
            if serialized.len() > self.threshold_bytes {
                let token = self.store.put(serialized);
                *value = Value::String(format!("claimcheck://{token}"));
            }
        }
    }

    fn maybe_retrieve(&self, data: &mut Map<String, Value>) {
        for (_key, value) in data.iter_mut() {
            if let Value::String(s) = value {
                if let Some(token) = s.strip_prefix("claimcheck://") {
                    if let Some(bytes) = self.store.get(token) {
                        if let Ok(restored) = serde_json::from_slice(&bytes) {
                            *value = restored;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct InMemoryStore {
        items: Mutex<std::collections::HashMap<String, Vec<u8>>>,
    }

    impl ClaimCheckStore for InMemoryStore {
        fn put(&self, bytes: Vec<u8>) -> String {
            let token = uuid::Uuid::now_v7().to_string();
            self.items.lock().unwrap().insert(token.clone(), bytes);
            token
        }

        fn get(&self, token: &str) -> Option<Vec<u8>> {
            self.items.lock().unwrap().get(token).cloned()
        }
    }

    #[test]
    fn offloads_and_retrieves_oversized_fields() {
        let manager = SizeThresholdClaimCheck {
            threshold_bytes: 8,
            store: InMemoryStore {
                items: Mutex::new(std::collections::HashMap::new()),
            },
        };
        let mut data = Map::new();
        data.insert("big".into(), Value::String("x".repeat(100)));
        data.insert("small".into(), Value::String("ok".into()));

        manager.maybe_offload(&mut data);
        assert!(data["big"].as_str().unwrap().starts_with("claimcheck://"));
        assert_eq!(data["small"], Value::String("ok".into()));

        manager.maybe_retrieve(&mut data);
        assert_eq!(data["big"], Value::String("x".repeat(100)));
    }
}
