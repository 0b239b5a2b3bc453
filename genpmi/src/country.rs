use std::{collections::BTreeMap, fmt::Write as _};

use log::info;
use time::OffsetDateTime;

use crate::reconcile::{ProducerNodes, ReconciledNode};

/// Live nodes grouped by the country code their location declares.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountryIndex {
    countries: BTreeMap<String, Vec<ReconciledNode>>,
}

impl CountryIndex {
    /// Index the live nodes of every producer. Within a country nodes are ordered by creation time;
    /// countries left without live nodes do not appear.
    pub fn build<'a>(producers: impl IntoIterator<Item = &'a ProducerNodes>) -> Self {
        let mut countries: BTreeMap<String, Vec<ReconciledNode>> = BTreeMap::new();
        for producer in producers {
            for node in producer.live() {
                if let Some(fuzzy) = &node.fuzzy_original_type {
                    info!("{}: + has fuzzy node type: {fuzzy}", producer.owner());
                }
                let country = node.location.country_code();
                if country.is_empty() {
                    info!(
                        "{}: + {} node without a country at {}",
                        producer.owner(),
                        node.node_type,
                        node.location
                    );
                    continue;
                }
                countries.entry(country).or_default().push(node.clone());
            }
        }
        for nodes in countries.values_mut() {
            nodes.sort_by_key(|n| n.created_at);
        }
        info!(
            "system: {} countries have nodes in them.",
            countries.len()
        );
        for (country, nodes) in &countries {
            info!("system: + {country}: {} nodes", nodes.len());
        }
        CountryIndex { countries }
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }

    pub fn get(&self, country: &str) -> Option<&[ReconciledNode]> {
        self.countries.get(country).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// One line per live node: `country node_type created_at producer latitude longitude`.
    pub fn render_table(&self, collected_at: OffsetDateTime) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# This data was collected at: {} {:02}:{:02}:{:02} UTC",
            collected_at.date(),
            collected_at.hour(),
            collected_at.minute(),
            collected_at.second()
        );
        for (country, nodes) in &self.countries {
            for node in nodes {
                let _ = writeln!(
                    out,
                    "{country} {} {} {} {} {}",
                    node.node_type,
                    node.created_at,
                    node.producer,
                    node.location.latitude_text(),
                    node.location.longitude_text()
                );
            }
        }
        out
    }
}
