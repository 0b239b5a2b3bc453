//! The producer's self-published descriptor and the pieces of it this tool understands.
//!
//! A bp.json is kept as raw JSON: producers publish all sorts of shapes and only `nodes[]` and
//! `org.branding.logo_256` matter here. Node entries are read leniently, one at a time, so a single
//! broken entry never hides the others.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Full,
    Hyperion,
    Producer,
    Seed,
}

/// Labels some producers use for what is really a full (API) node.
const FULL_NODE_ALIASES: [&str; 2] = ["api", "query"];

/// Outcome of reading one `node_type` label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedType {
    Known(NodeType),
    /// An alias of a known type; the label as published is kept.
    Fuzzy { node_type: NodeType, original: String },
    Unknown(String),
}

impl ResolvedType {
    pub fn resolve(label: &str) -> Self {
        if let Ok(node_type) = label.parse::<NodeType>() {
            return ResolvedType::Known(node_type);
        }
        let lower = label.to_lowercase();
        if FULL_NODE_ALIASES.contains(&lower.as_str()) {
            ResolvedType::Fuzzy {
                node_type: NodeType::Full,
                original: label.to_string(),
            }
        } else {
            ResolvedType::Unknown(label.to_string())
        }
    }
}

/// A resolved type for one node candidate, with the original label when it was an alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeCandidate {
    pub node_type: NodeType,
    pub fuzzy: Option<String>,
}

/// `node_type` is published either as a single label or as a list of labels for one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeTypeField {
    One(String),
    Many(Vec<String>),
}

impl NodeTypeField {
    /// Every known type declared by this field, plus the labels that could not be resolved.
    ///
    /// A list yields one candidate per resolvable entry. Alias resolution stops at the first alias
    /// found in a list; entries after it are not looked at.
    pub fn candidates(&self) -> (Vec<TypeCandidate>, Vec<String>) {
        let labels: &[String] = match self {
            NodeTypeField::One(label) => std::slice::from_ref(label),
            NodeTypeField::Many(labels) => labels,
        };
        let mut candidates = Vec::new();
        let mut unknown = Vec::new();
        for label in labels {
            match ResolvedType::resolve(label) {
                ResolvedType::Known(node_type) => candidates.push(TypeCandidate {
                    node_type,
                    fuzzy: None,
                }),
                ResolvedType::Fuzzy {
                    node_type,
                    original,
                } => {
                    candidates.push(TypeCandidate {
                        node_type,
                        fuzzy: Some(original),
                    });
                    break;
                }
                ResolvedType::Unknown(label) => unknown.push(label),
            }
        }
        (candidates, unknown)
    }

    /// True for a single label spelled exactly as `node_type`.
    pub fn is_exactly(&self, node_type: NodeType) -> bool {
        matches!(self, NodeTypeField::One(label) if label == node_type.as_ref())
    }
}

/// Where a node is. `country`, `latitude` and `longitude` are what this tool reads; anything else
/// (usually `name`) is carried along because it is part of the node's identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers as `f64`, so integer and float spellings of one value agree.
fn numeric(value: &Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        other => other.clone(),
    }
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Location {
    /// The declared country code, as published. Empty when absent.
    pub fn country_code(&self) -> String {
        self.country.as_ref().map(plain).unwrap_or_default()
    }

    pub fn latitude(&self) -> Option<f64> {
        coordinate(self.latitude.as_ref())
    }

    pub fn longitude(&self) -> Option<f64> {
        coordinate(self.longitude.as_ref())
    }

    pub fn latitude_text(&self) -> String {
        self.latitude.as_ref().map(plain).unwrap_or_default()
    }

    pub fn longitude_text(&self) -> String {
        self.longitude.as_ref().map(plain).unwrap_or_default()
    }

    /// Canonical text of the whole location. Two locations with the same fields compare equal
    /// regardless of the order the producer wrote them in, and `1` equals `1.0`.
    pub fn identity_key(&self) -> String {
        let canonical = Location {
            country: self.country.as_ref().map(numeric),
            latitude: self.latitude.as_ref().map(numeric),
            longitude: self.longitude.as_ref().map(numeric),
            extra: self.extra.clone(),
        };
        serde_json::to_string(&canonical).unwrap_or_default()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string(self).unwrap_or_default())
    }
}

/// One entry of `nodes[]`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NodeDescriptor {
    pub node_type: NodeTypeField,
    pub location: Location,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub ssl_endpoint: Option<String>,
}

impl NodeDescriptor {
    /// Endpoints worth probing, in the order they should be tried.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        [self.api_endpoint.as_deref(), self.ssl_endpoint.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Why a document has no usable logo URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrandingGap {
    NoOrg,
    NoBranding,
    NoLogo,
    EmptyLogo,
}

impl fmt::Display for BrandingGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BrandingGap::NoOrg => "org is missing from the bp.json",
            BrandingGap::NoBranding => "org.branding is missing from the bp.json",
            BrandingGap::NoLogo => "org.branding.logo_256 is missing from the bp.json",
            BrandingGap::EmptyLogo => "the org.branding.logo_256 url is empty in org.branding",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BpJson(pub Value);

impl BpJson {
    pub fn empty() -> Self {
        BpJson(Value::Object(Default::default()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(BpJson)
    }

    /// The raw `nodes[]` entries, or `None` when the document has no such array.
    pub fn raw_nodes(&self) -> Option<&Vec<Value>> {
        self.0.get("nodes")?.as_array()
    }

    /// Every `nodes[]` entry, decoded one by one.
    pub fn descriptors(&self) -> Vec<Result<NodeDescriptor, String>> {
        self.raw_nodes()
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|node| {
                        NodeDescriptor::deserialize(node).map_err(|e| format!("{e}: {node}"))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn producer_account_name(&self) -> Option<&str> {
        self.0.get("producer_account_name")?.as_str()
    }

    pub fn logo_url(&self) -> Result<&str, BrandingGap> {
        let org = self.0.get("org").ok_or(BrandingGap::NoOrg)?;
        let branding = org.get("branding").ok_or(BrandingGap::NoBranding)?;
        let logo = branding
            .get("logo_256")
            .and_then(Value::as_str)
            .ok_or(BrandingGap::NoLogo)?;
        if logo.trim().is_empty() {
            Err(BrandingGap::EmptyLogo)
        } else {
            Ok(logo.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    fn field(v: Value) -> NodeTypeField {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn node_types_in_map_order() {
        let names: Vec<String> = NodeType::iter().map(|t| t.to_string()).collect();
        assert_eq!(names, ["full", "hyperion", "producer", "seed"]);
    }

    #[test]
    fn known_labels_are_case_sensitive() {
        assert_eq!(
            ResolvedType::resolve("seed"),
            ResolvedType::Known(NodeType::Seed)
        );
        assert_eq!(
            ResolvedType::resolve("Seed"),
            ResolvedType::Unknown("Seed".to_string())
        );
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(
            ResolvedType::resolve("API"),
            ResolvedType::Fuzzy {
                node_type: NodeType::Full,
                original: "API".to_string()
            }
        );
        assert_eq!(
            ResolvedType::resolve("query"),
            ResolvedType::Fuzzy {
                node_type: NodeType::Full,
                original: "query".to_string()
            }
        );
    }

    #[test]
    fn list_yields_one_candidate_per_entry() {
        let (candidates, unknown) = field(json!(["producer", "bogus", "seed"])).candidates();
        let types: Vec<NodeType> = candidates.iter().map(|c| c.node_type).collect();
        assert_eq!(types, [NodeType::Producer, NodeType::Seed]);
        assert_eq!(unknown, ["bogus"]);
    }

    #[test]
    fn list_stops_at_first_alias() {
        let (candidates, unknown) = field(json!(["query", "seed", "nonsense"])).candidates();
        assert_eq!(
            candidates,
            [TypeCandidate {
                node_type: NodeType::Full,
                fuzzy: Some("query".to_string())
            }]
        );
        assert!(unknown.is_empty());
    }

    #[test]
    fn location_identity_ignores_key_order() {
        let a: Location =
            serde_json::from_str(r#"{"name":"x","country":"US","latitude":1.5,"longitude":2}"#)
                .unwrap();
        let b: Location =
            serde_json::from_str(r#"{"longitude":2,"latitude":1.5,"country":"US","name":"x"}"#)
                .unwrap();
        assert_eq!(a.identity_key(), b.identity_key());

        let c: Location =
            serde_json::from_str(r#"{"name":"y","country":"US","latitude":1.5,"longitude":2}"#)
                .unwrap();
        assert_ne!(a.identity_key(), c.identity_key());
    }

    #[test]
    fn location_identity_compares_numbers_by_value() {
        let int: Location =
            serde_json::from_str(r#"{"country":840,"latitude":1,"longitude":-2}"#).unwrap();
        let float: Location =
            serde_json::from_str(r#"{"country":840.0,"latitude":1.0,"longitude":-2.0}"#).unwrap();
        assert_eq!(int.identity_key(), float.identity_key());
        // A quoted number is a different value.
        let text: Location =
            serde_json::from_str(r#"{"country":840,"latitude":"1","longitude":-2}"#).unwrap();
        assert_ne!(int.identity_key(), text.identity_key());
        assert_eq!(int.to_string(), r#"{"country":840,"latitude":1,"longitude":-2}"#);
    }

    #[test]
    fn coordinates_accept_numbers_and_strings() {
        let loc: Location =
            serde_json::from_value(json!({"country": 840, "latitude": "45.5", "longitude": -73}))
                .unwrap();
        assert_eq!(loc.country_code(), "840");
        assert_eq!(loc.latitude(), Some(45.5));
        assert_eq!(loc.longitude(), Some(-73.0));
        assert_eq!(loc.latitude_text(), "45.5");
    }

    #[test]
    fn descriptors_decode_independently() {
        let doc = BpJson(json!({
            "nodes": [
                {"node_type": "full", "location": {"country": "DE"}, "api_endpoint": "http://a"},
                {"node_type": "seed"},
                {"node_type": ["producer"], "location": {"country": "FR"}}
            ]
        }));
        let decoded = doc.descriptors();
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert!(decoded[1].is_err());
        assert!(decoded[2].is_ok());
        let endpoints: Vec<&str> = decoded[0].as_ref().unwrap().endpoints().collect();
        assert_eq!(endpoints, ["http://a"]);
    }

    #[test]
    fn logo_url_reports_what_is_missing() {
        assert_eq!(BpJson(json!({})).logo_url(), Err(BrandingGap::NoOrg));
        assert_eq!(
            BpJson(json!({"org": {}})).logo_url(),
            Err(BrandingGap::NoBranding)
        );
        assert_eq!(
            BpJson(json!({"org": {"branding": {}}})).logo_url(),
            Err(BrandingGap::NoLogo)
        );
        assert_eq!(
            BpJson(json!({"org": {"branding": {"logo_256": ""}}})).logo_url(),
            Err(BrandingGap::EmptyLogo)
        );
        assert_eq!(
            BpJson(json!({"org": {"branding": {"logo_256": "https://x/logo.png"}}})).logo_url(),
            Ok("https://x/logo.png")
        );
    }

    #[test]
    fn emptiness() {
        assert!(BpJson::empty().is_empty());
        assert!(BpJson(Value::Null).is_empty());
        assert!(!BpJson(json!({"nodes": []})).is_empty());
    }
}
