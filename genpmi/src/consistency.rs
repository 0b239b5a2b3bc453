use std::collections::BTreeSet;

use isocountry::CountryCode;
use log::{info, warn};

use crate::{
    error::{Source, StructuralWarning},
    producers::{Producer, ProducerSet},
    sources::BpJsons,
};

/// Whether `location` is an assigned ISO 3166-1 numeric country code.
fn is_country_code(location: &str) -> bool {
    location
        .parse::<u32>()
        .is_ok_and(|id| CountryCode::for_id(id).is_ok())
}

pub fn check_producer(producer: &Producer) -> Vec<StructuralWarning> {
    let mut warnings = Vec::new();
    let mut missing = Vec::new();
    if producer.url.trim().is_empty() {
        missing.push("url");
    }
    if producer.location.is_empty() {
        missing.push("location");
    } else if !is_country_code(&producer.location) {
        warnings.push(StructuralWarning::InvalidCountryCode {
            owner: producer.owner.clone(),
            location: producer.location.clone(),
        });
    }
    if !missing.is_empty() {
        warnings.push(StructuralWarning::MissingProducerFields {
            owner: producer.owner.clone(),
            fields: missing,
        });
    }
    warnings
}

pub fn check_bpjsons(bpjsons: &BpJsons) -> Vec<StructuralWarning> {
    let mut warnings = Vec::new();
    for source in [Source::Url, Source::Chain] {
        for (owner, doc) in bpjsons.source(source) {
            let Some(nodes) = doc.raw_nodes() else {
                continue;
            };
            for node in nodes {
                let Some(location) = node.get("location").filter(|l| l.is_object()) else {
                    warnings.push(StructuralWarning::MissingLocation {
                        source,
                        owner: owner.clone(),
                    });
                    continue;
                };
                for coordinate in ["latitude", "longitude"] {
                    if location.get(coordinate).is_none() {
                        warnings.push(StructuralWarning::MissingCoordinate {
                            source,
                            owner: owner.clone(),
                            coordinate,
                            location: location.to_string(),
                        });
                    }
                }
            }
        }
    }
    warnings
}

/// Check producers and their documents, logging every warning. Nothing here stops the run.
pub fn check(producers: &ProducerSet, bpjsons: &BpJsons, logos: usize) -> Vec<StructuralWarning> {
    info!("system: Checking consistency of the producer information...");
    info!("system: + {} producers", producers.len());
    let mut warnings: Vec<StructuralWarning> = producers
        .producers
        .values()
        .flat_map(check_producer)
        .collect();
    for source in [Source::Url, Source::Chain] {
        info!(
            "system: + {} {source} bp.json cache files",
            bpjsons.source(source).len()
        );
    }
    warnings.extend(check_bpjsons(bpjsons));
    info!("system: + {logos} logo cache files");

    for warning in &warnings {
        warn!("system: + WARN: {warning}");
    }
    let flags: BTreeSet<&str> = warnings.iter().map(|w| w.regenerate_flag()).collect();
    for flag in flags {
        info!("system: + CRIT:   You need to regenerate the affected cache files with the {flag} option");
    }
    info!("system: Consistency check complete");
    warnings
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bpjson::BpJson;

    fn producer(owner: &str, url: &str, location: &str) -> Producer {
        Producer {
            owner: owner.to_string(),
            is_active: true,
            url: url.to_string(),
            location: location.to_string(),
        }
    }

    #[test]
    fn producer_fields() {
        assert!(check_producer(&producer("a", "https://a", "840")).is_empty());
        assert_eq!(
            check_producer(&producer("b", "", "")),
            [StructuralWarning::MissingProducerFields {
                owner: "b".into(),
                fields: vec!["url", "location"]
            }]
        );
        assert_eq!(
            check_producer(&producer("c", "https://c", "1234")),
            [StructuralWarning::InvalidCountryCode {
                owner: "c".into(),
                location: "1234".into()
            }]
        );
    }

    #[test]
    fn country_codes_must_be_assigned() {
        assert!(is_country_code("840"));
        assert!(is_country_code("036"));
        assert!(is_country_code("36"));
        for code in ["0", "1", "999", "-840", "US", "840.0"] {
            assert!(!is_country_code(code), "{code}");
        }
        assert_eq!(
            check_producer(&producer("d", "https://d", "999")),
            [StructuralWarning::InvalidCountryCode {
                owner: "d".into(),
                location: "999".into()
            }]
        );
    }

    #[test]
    fn node_locations() {
        let mut bpjsons = BpJsons::default();
        bpjsons.chain.insert(
            "a".into(),
            BpJson(json!({"nodes": [
                {"node_type": "seed"},
                {"node_type": "full", "location": {"latitude": 1}},
                {"node_type": "full", "location": {"latitude": 1, "longitude": 2}}
            ]})),
        );
        bpjsons.url.insert("b".into(), BpJson(json!({"org": {}})));
        let warnings = check_bpjsons(&bpjsons);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            warnings[0],
            StructuralWarning::MissingLocation {
                source: Source::Chain,
                ..
            }
        ));
        assert!(matches!(
            warnings[1],
            StructuralWarning::MissingCoordinate {
                coordinate: "longitude",
                ..
            }
        ));
        assert!(warnings.iter().all(|w| w.regenerate_flag() == "-b"));
    }
}
