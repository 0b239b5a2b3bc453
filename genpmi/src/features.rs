//! Map markers for every node the producers currently publish on chain.
//!
//! This reads the latest bp.json documents only; the reconciled history plays no part here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::bpjson::{BpJson, NodeDescriptor, NodeType};

/// Marker icons per node type: the first for scheduled producers, the second for standbys.
pub fn icons(node_type: NodeType) -> [&'static str; 2] {
    match node_type {
        NodeType::Full => [
            "http://maps.google.com/mapfiles/ms/micons/red.png",
            "http://maps.google.com/mapfiles/ms/micons/purple.png",
        ],
        NodeType::Hyperion => [
            "http://maps.google.com/mapfiles/ms/micons/red-dot.png",
            "http://maps.google.com/mapfiles/ms/micons/purple-dot.png",
        ],
        NodeType::Producer => [
            "http://maps.google.com/mapfiles/ms/micons/blue.png",
            "http://maps.google.com/mapfiles/ms/micons/green.png",
        ],
        NodeType::Seed => [
            "http://maps.google.com/mapfiles/ms/micons/yellow.png",
            "http://maps.google.com/mapfiles/ms/micons/orange.png",
        ],
    }
}

/// Does something answer Hyperion's health endpoint at `endpoint`?
#[async_trait]
pub trait HealthCheck {
    async fn answers(&self, endpoint: &str) -> bool;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Properties {
    pub icon: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    kind: &'static str,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub properties: Properties,
    pub geometry: Geometry,
}

impl Feature {
    pub fn point(name: &str, icon: &str, longitude: f64, latitude: f64) -> Self {
        Feature {
            kind: "Feature",
            properties: Properties {
                icon: icon.to_string(),
                name: name.to_string(),
            },
            geometry: Geometry {
                kind: "Point",
                coordinates: [longitude, latitude],
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Feature>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        FeatureCollection {
            kind: "FeatureCollection",
            features: Vec::new(),
        }
    }
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The collection as a script assigning it to `<type>Nodes`.
    pub fn to_script(&self, node_type: NodeType) -> Result<String, serde_json::Error> {
        Ok(format!(
            "var {node_type}Nodes =\n{}\n;\n",
            serde_json::to_string_pretty(self)?
        ))
    }
}

/// One collection per node type.
#[derive(Clone, Debug, PartialEq)]
pub struct MapFeatures {
    collections: BTreeMap<NodeType, FeatureCollection>,
}

impl Default for MapFeatures {
    fn default() -> Self {
        MapFeatures {
            collections: NodeType::iter()
                .map(|t| (t, FeatureCollection::default()))
                .collect(),
        }
    }
}

impl MapFeatures {
    pub fn get(&self, node_type: NodeType) -> &FeatureCollection {
        &self.collections[&node_type]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeType, &FeatureCollection)> {
        self.collections.iter().map(|(t, c)| (*t, c))
    }

    fn push(&mut self, node_type: NodeType, feature: Feature) {
        self.collections
            .entry(node_type)
            .or_default()
            .features
            .push(feature);
    }
}

fn marker(
    owner: &str,
    node_type: NodeType,
    top21: bool,
    descriptor: &NodeDescriptor,
) -> Option<Feature> {
    let location = &descriptor.location;
    match (location.longitude(), location.latitude()) {
        (Some(longitude), Some(latitude)) => Some(Feature::point(
            owner,
            icons(node_type)[if top21 { 0 } else { 1 }],
            longitude,
            latitude,
        )),
        _ => {
            warn!("{owner}: + {node_type} node without usable coordinates at {location}");
            None
        }
    }
}

/// Build the markers for every document. Each `full` node whose api (or else ssl) endpoint answers
/// a health check also gets a `hyperion` marker.
pub async fn build_map_features<H: HealthCheck + ?Sized>(
    documents: &BTreeMap<String, BpJson>,
    top21: &[String],
    health: &H,
) -> MapFeatures {
    let mut features = MapFeatures::default();
    for (owner, doc) in documents {
        let is_top21 = top21.iter().any(|p| p == owner);
        let descriptors: Vec<NodeDescriptor> =
            doc.descriptors().into_iter().filter_map(Result::ok).collect();
        for node_type in NodeType::iter() {
            for descriptor in descriptors
                .iter()
                .filter(|d| d.node_type.is_exactly(node_type))
            {
                let Some(feature) = marker(owner, node_type, is_top21, descriptor) else {
                    continue;
                };
                features.push(node_type, feature);
                if node_type != NodeType::Full {
                    continue;
                }
                for endpoint in descriptor.endpoints() {
                    if health.answers(endpoint).await {
                        if let Some(hyperion) =
                            marker(owner, NodeType::Hyperion, is_top21, descriptor)
                        {
                            features.push(NodeType::Hyperion, hyperion);
                        }
                        break;
                    }
                }
            }
        }
    }
    for (node_type, collection) in features.iter() {
        info!(
            "system: generated {} {node_type} map markers",
            collection.len()
        );
    }
    features
}
