//! History of the `producerjson` contract: raw entries as the history API returns them, and their
//! decoded form ready for reconciliation.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{bpjson::BpJson, error::DecodeError, timestamp::Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Set,
    Del,
    Other(String),
}

impl ActionKind {
    fn from_name(name: &str) -> Self {
        match name {
            "set" => ActionKind::Set,
            "del" => ActionKind::Del,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

/// One history entry, with only the fields reconciliation needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RawAction {
    pub timestamp: Timestamp,
    pub owner: String,
    /// First authorizing actor, reported when the payload is broken.
    pub actor: String,
    pub kind: ActionKind,
    /// The embedded bp.json text of a `set`.
    pub payload: Option<String>,
}

#[derive(Deserialize)]
struct WireAction {
    #[serde(rename = "@timestamp")]
    timestamp: String,
    act: WireAct,
}

#[derive(Deserialize)]
struct WireAct {
    name: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    authorization: Vec<WireAuthorization>,
}

#[derive(Deserialize)]
struct WireAuthorization {
    actor: String,
}

impl RawAction {
    fn from_wire(index: usize, entry: &Value) -> Result<Self, DecodeError> {
        let malformed = |reason: String| DecodeError::MalformedEntry { index, reason };
        let wire = WireAction::deserialize(entry).map_err(|e| malformed(e.to_string()))?;
        let timestamp = Timestamp::parse(&wire.timestamp)
            .map_err(|e| malformed(format!("@timestamp {}: {e}", wire.timestamp)))?;
        let actor = wire
            .act
            .authorization
            .first()
            .map(|a| a.actor.clone())
            .unwrap_or_default();
        let owner = match wire.act.data.get("owner").and_then(Value::as_str) {
            Some(owner) => owner.to_string(),
            None if !actor.is_empty() => actor.clone(),
            None => return Err(malformed("no owner and no authorization".to_string())),
        };
        let payload = wire
            .act
            .data
            .get("json")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(RawAction {
            timestamp,
            owner,
            actor,
            kind: ActionKind::from_name(&wire.act.name),
            payload,
        })
    }
}

/// A parsed history response. Entries that could not be read are kept aside for reporting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionLog {
    pub actions: Vec<RawAction>,
    pub rejected: Vec<DecodeError>,
}

impl ActionLog {
    /// Parse a `get_actions` response body. A body without an `actions` array is an empty log.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let body: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(&body))
    }

    pub fn from_value(body: &Value) -> Self {
        let mut log = ActionLog::default();
        let Some(entries) = body.get("actions").and_then(Value::as_array) else {
            return log;
        };
        for (index, entry) in entries.iter().enumerate() {
            match RawAction::from_wire(index, entry) {
                Ok(action) => log.actions.push(action),
                Err(e) => log.rejected.push(e),
            }
        }
        log
    }

    /// Decode every action, keeping failures aside.
    pub fn decode(&self) -> (Vec<NodeAction>, Vec<DecodeError>) {
        let mut decoded = Vec::with_capacity(self.actions.len());
        let mut failed = self.rejected.clone();
        for raw in &self.actions {
            match decode(raw) {
                Ok(action) => decoded.push(action),
                Err(e) => failed.push(e),
            }
        }
        (decoded, failed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeOp {
    Set(BpJson),
    Del,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeAction {
    pub timestamp: Timestamp,
    pub owner: String,
    pub op: NodeOp,
}

impl NodeAction {
    pub fn is_del(&self) -> bool {
        matches!(self.op, NodeOp::Del)
    }
}

pub fn decode(raw: &RawAction) -> Result<NodeAction, DecodeError> {
    let op = match &raw.kind {
        ActionKind::Set => {
            let malformed = |reason: String| DecodeError::MalformedPayload {
                owner: raw.owner.clone(),
                actor: raw.actor.clone(),
                timestamp: raw.timestamp,
                reason,
            };
            let payload = raw
                .payload
                .as_deref()
                .ok_or_else(|| malformed("set without json data".to_string()))?;
            NodeOp::Set(BpJson::from_slice(payload.as_bytes()).map_err(|e| malformed(e.to_string()))?)
        }
        ActionKind::Del => NodeOp::Del,
        ActionKind::Other(kind) => {
            return Err(DecodeError::UnknownActionKind {
                owner: raw.owner.clone(),
                kind: kind.clone(),
                timestamp: raw.timestamp,
            });
        }
    };
    Ok(NodeAction {
        timestamp: raw.timestamp,
        owner: raw.owner.clone(),
        op,
    })
}

/// Group actions by owner. Each group is stably sorted by timestamp, so entries with equal
/// timestamps stay in log order.
pub fn partition_by_owner(
    actions: impl IntoIterator<Item = NodeAction>,
) -> BTreeMap<String, Vec<NodeAction>> {
    let mut by_owner: BTreeMap<String, Vec<NodeAction>> = BTreeMap::new();
    for action in actions {
        by_owner.entry(action.owner.clone()).or_default().push(action);
    }
    for actions in by_owner.values_mut() {
        actions.sort_by_key(|a| a.timestamp);
    }
    by_owner
}

/// The producer's current on-chain bp.json: the payload of its newest action, unless that was a `del`.
pub fn latest_document(ordered: &[NodeAction]) -> Option<&BpJson> {
    match &ordered.last()?.op {
        NodeOp::Set(doc) => Some(doc),
        NodeOp::Del => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(ts: &str, name: &str, data: Value) -> Value {
        json!({
            "@timestamp": ts,
            "act": {
                "account": "producerjson",
                "name": name,
                "data": data,
                "authorization": [{"actor": "signer", "permission": "active"}]
            }
        })
    }

    fn log(entries: Vec<Value>) -> ActionLog {
        ActionLog::from_value(&json!({ "actions": entries }))
    }

    #[test]
    fn set_and_del_decode() {
        let log = log(vec![
            entry(
                "2021-01-01T00:00:00.000",
                "set",
                json!({"owner": "alice", "json": "{\"nodes\": []}"}),
            ),
            entry("2021-01-02T00:00:00.000", "del", json!({"owner": "alice"})),
        ]);
        let (decoded, failed) = log.decode();
        assert!(failed.is_empty());
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].op, NodeOp::Set(BpJson(json!({"nodes": []}))));
        assert!(decoded[1].is_del());
        assert_eq!(decoded[1].owner, "alice");
    }

    #[test]
    fn broken_payload_does_not_stop_the_batch() {
        let log = log(vec![
            entry(
                "2021-01-01T00:00:00.000",
                "set",
                json!({"owner": "alice", "json": "{not json"}),
            ),
            entry("2021-01-01T00:00:01.000", "setx", json!({"owner": "alice"})),
            entry(
                "2021-01-01T00:00:02.000",
                "set",
                json!({"owner": "alice", "json": "{}"}),
            ),
        ]);
        let (decoded, failed) = log.decode();
        assert_eq!(decoded.len(), 1);
        assert_eq!(failed.len(), 2);
        assert!(matches!(
            &failed[0],
            DecodeError::MalformedPayload { actor, .. } if actor == "signer"
        ));
        assert!(matches!(
            &failed[1],
            DecodeError::UnknownActionKind { kind, .. } if kind == "setx"
        ));
        assert_eq!(failed[1].owner(), Some("alice"));
    }

    #[test]
    fn unreadable_entries_are_rejected() {
        let log = log(vec![
            json!({"act": {"name": "del"}}),
            entry("last tuesday", "del", json!({"owner": "alice"})),
            entry("2021-01-01T00:00:00.000", "del", json!({})),
        ]);
        assert_eq!(log.rejected.len(), 2);
        // Owner falls back to the authorizing actor.
        assert_eq!(log.actions.len(), 1);
        assert_eq!(log.actions[0].owner, "signer");
    }

    #[test]
    fn no_actions_array_is_empty() {
        assert_eq!(ActionLog::parse(b"{}").unwrap(), ActionLog::default());
        assert!(ActionLog::parse(b"[").is_err());
    }

    #[test]
    fn partition_is_stable_and_sorted() {
        let at = |s| Timestamp::parse(s).unwrap();
        let actions = vec![
            NodeAction {
                timestamp: at("2021-01-02T00:00:00"),
                owner: "bob".into(),
                op: NodeOp::Del,
            },
            NodeAction {
                timestamp: at("2021-01-03T00:00:00"),
                owner: "alice".into(),
                op: NodeOp::Set(BpJson(json!({"n": 1}))),
            },
            NodeAction {
                timestamp: at("2021-01-01T00:00:00"),
                owner: "alice".into(),
                op: NodeOp::Del,
            },
            NodeAction {
                timestamp: at("2021-01-03T00:00:00"),
                owner: "alice".into(),
                op: NodeOp::Set(BpJson(json!({"n": 2}))),
            },
        ];
        let parts = partition_by_owner(actions);
        assert_eq!(parts.keys().collect::<Vec<_>>(), ["alice", "bob"]);
        let alice = &parts["alice"];
        assert!(alice[0].is_del());
        assert_eq!(alice[1].op, NodeOp::Set(BpJson(json!({"n": 1}))));
        assert_eq!(alice[2].op, NodeOp::Set(BpJson(json!({"n": 2}))));
        assert_eq!(latest_document(alice), Some(&BpJson(json!({"n": 2}))));
        assert_eq!(latest_document(&parts["bob"]), None);
        assert_eq!(latest_document(&[]), None);
    }
}
