use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Deserializer, Serialize};

/// A registered block producer, as listed by the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub owner: String,
    #[serde(default, deserialize_with = "flag")]
    pub is_active: bool,
    #[serde(default)]
    pub url: String,
    /// Numeric ISO 3166 country code. The chain stores it as a number; `0` means unset.
    #[serde(default, deserialize_with = "code")]
    pub location: String,
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Text(s) => matches!(s.as_str(), "1" | "true"),
    })
}

fn code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i64),
        Text(String),
    }
    Ok(match Code::deserialize(deserializer)? {
        Code::Int(0) => String::new(),
        Code::Int(i) => i.to_string(),
        Code::Text(s) if s.trim() == "0" => String::new(),
        Code::Text(s) => s.trim().to_string(),
    })
}

impl Producer {
    /// Where the producer publishes its bp.json, if it published a website at all.
    pub fn bpjson_url(&self) -> Option<String> {
        let url = self.url.trim().trim_end_matches('/');
        if url.is_empty() {
            None
        } else {
            Some(format!("{url}/bp.json"))
        }
    }
}

/// The active producers of a chain and its current schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerSet {
    pub producers: BTreeMap<String, Producer>,
    /// Scheduled producers, in schedule order.
    pub top21: Vec<String>,
}

impl ProducerSet {
    /// Build from a full producer listing; inactive producers are counted and dropped.
    pub fn from_rows(rows: impl IntoIterator<Item = Producer>, top21: Vec<String>) -> Self {
        let mut producers = BTreeMap::new();
        let mut inactive = 0usize;
        for row in rows {
            if row.is_active {
                producers.insert(row.owner.clone(), row);
            } else {
                inactive += 1;
            }
        }
        info!(
            "system: producers: {} active and {inactive} inactive",
            producers.len()
        );
        ProducerSet { producers, top21 }
    }

    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn get(&self, owner: &str) -> Option<&Producer> {
        self.producers.get(owner)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn is_top21(&self, owner: &str) -> bool {
        self.top21.iter().any(|p| p == owner)
    }

    /// Log a note for every producer that has not published a website.
    pub fn verify(&self) -> usize {
        let mut notes = 0;
        for producer in self.producers.values() {
            if producer.url.trim().is_empty() {
                info!("{}: NOTE: the url field is empty.", producer.owner);
                notes += 1;
            }
        }
        notes
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rows() -> Vec<Producer> {
        serde_json::from_value(json!([
            {"owner": "alice", "is_active": 1, "url": "https://alice.example/", "location": 840, "total_votes": "1.0"},
            {"owner": "bob", "is_active": 0, "url": "https://bob.example", "location": 0},
            {"owner": "carol", "is_active": true, "url": "", "location": "276"}
        ]))
        .unwrap()
    }

    #[test]
    fn chain_rows_are_read_leniently() {
        let rows = rows();
        assert!(rows[0].is_active);
        assert_eq!(rows[0].location, "840");
        assert!(!rows[1].is_active);
        assert_eq!(rows[1].location, "");
        assert_eq!(rows[2].location, "276");
    }

    #[test]
    fn only_active_producers_are_kept() {
        let set = ProducerSet::from_rows(rows(), vec!["carol".to_string()]);
        assert_eq!(set.owners().collect::<Vec<_>>(), ["alice", "carol"]);
        assert!(set.is_top21("carol"));
        assert!(!set.is_top21("alice"));
        assert_eq!(set.verify(), 1);
    }

    #[test]
    fn bpjson_url() {
        let rows = rows();
        assert_eq!(
            rows[0].bpjson_url().as_deref(),
            Some("https://alice.example/bp.json")
        );
        assert_eq!(rows[2].bpjson_url(), None);
    }

    #[test]
    fn cached_form_reads_back() {
        let alice = rows().remove(0);
        let text = serde_json::to_string(&alice).unwrap();
        assert_eq!(serde_json::from_str::<Producer>(&text).unwrap(), alice);
    }
}
