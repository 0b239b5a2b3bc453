//! Retrieval of the producerjson history and of each producer's bp.json, both behind time-based
//! caches.

use std::{collections::BTreeMap, time::Duration};

use log::{info, warn};

use crate::{
    action::{self, ActionLog, NodeAction},
    bpjson::BpJson,
    cache,
    cfg::Settings,
    error::{FetchError, Source},
    fetch::ChainClient,
    producers::ProducerSet,
};

/// Decoded history, grouped per producer and ordered.
#[derive(Clone, Debug, Default)]
pub struct ChainHistory {
    pub by_owner: BTreeMap<String, Vec<NodeAction>>,
    /// Whether the history could be obtained at all this run.
    pub available: bool,
}

impl ChainHistory {
    pub fn from_log(log: &ActionLog) -> Self {
        let (decoded, failed) = log.decode();
        for e in &failed {
            match e.owner() {
                Some(owner) => info!("{owner}: + {e}"),
                None => info!("system: {e}"),
            }
        }
        info!(
            "system: There are {} producerjson actions on the chain",
            decoded.len()
        );
        ChainHistory {
            by_owner: action::partition_by_owner(decoded),
            available: true,
        }
    }

    pub fn actions(&self, owner: &str) -> &[NodeAction] {
        self.by_owner
            .get(owner)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Load the producerjson history, from cache while it is fresh and from the history API otherwise.
/// A failed download falls back to whatever cache exists; with neither, the history is empty.
pub async fn load_history(client: &ChainClient, settings: &Settings) -> ChainHistory {
    let path = settings.paths().actions_file();
    let max_age = Duration::from_secs(settings.config.actions_max_age);
    let mut refresh = settings.refresh.bpjsons || cache::is_stale(&path, max_age).await;

    if !refresh {
        match cache::read_bytes(&path).await.and_then(|bytes| {
            ActionLog::parse(&bytes).map_err(|source| FetchError::Json {
                path: path.clone(),
                source,
            })
        }) {
            Ok(log) => return ChainHistory::from_log(&log),
            Err(e) => {
                warn!("system: {e}; fetching the producerjson actions again");
                refresh = true;
            }
        }
    }

    if refresh {
        info!(
            "system: updating the producerjson-actions.json cache file from {} ...",
            settings.history_url()
        );
        match client
            .producerjson_actions(settings.config.actions_limit)
            .await
        {
            Ok(bytes) => match ActionLog::parse(&bytes) {
                Ok(log) => {
                    if let Err(e) = cache::write_bytes(&path, &bytes).await {
                        warn!("system: {e}");
                    }
                    info!("system: success");
                    return ChainHistory::from_log(&log);
                }
                Err(e) => warn!("system: FAIL: the producerjson actions are not JSON: {e}"),
            },
            Err(e) => warn!("system: FAIL: {e}"),
        }
    }

    match cache::read_bytes(&path).await {
        Ok(bytes) => match ActionLog::parse(&bytes) {
            Ok(log) => {
                warn!("system: using the previously cached producerjson actions");
                ChainHistory::from_log(&log)
            }
            Err(e) => {
                warn!("system: {} could not be decoded as JSON: {e}", path.display());
                ChainHistory::default()
            }
        },
        Err(_) => ChainHistory::default(),
    }
}

/// The bp.json of every producer, per source. Producers without a document are absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BpJsons {
    pub chain: BTreeMap<String, BpJson>,
    pub url: BTreeMap<String, BpJson>,
}

impl BpJsons {
    pub fn source(&self, source: Source) -> &BTreeMap<String, BpJson> {
        match source {
            Source::Chain => &self.chain,
            Source::Url => &self.url,
        }
    }
}

/// Reconstruct each producer's on-chain bp.json from its newest action, and cache it.
pub async fn chain_bpjsons(
    producers: &ProducerSet,
    history: &ChainHistory,
    settings: &Settings,
) -> BTreeMap<String, BpJson> {
    let paths = settings.paths();
    let mut documents = BTreeMap::new();
    for owner in producers.owners() {
        let actions = history.actions(owner);
        info!("{owner}: {} producerjson actions on the chain", actions.len());
        let doc = action::latest_document(actions).cloned();
        match &doc {
            Some(doc) if !doc.is_empty() => {}
            _ if !history.available => {
                info!("{owner}: failed to retrieve chain bp.json data for the cache")
            }
            _ if actions.is_empty() => {
                info!("{owner}: + There are no producerjson action entries on the chain.")
            }
            _ => info!("{owner}: the newest producerjson action removed its bp.json"),
        }
        let doc = doc.filter(|d| !d.is_empty());
        let cached = doc.clone().unwrap_or_else(BpJson::empty);
        if let Err(e) = cache::write_json(&paths.chain_bpjson(owner), &cached).await {
            warn!("{owner}: {e}");
        }
        if let Some(doc) = doc {
            documents.insert(owner.to_string(), doc);
        }
    }
    documents
}

/// Refresh one producer's url bp.json cache file if asked to, then read it.
async fn url_bpjson(
    client: &ChainClient,
    settings: &Settings,
    owner: &str,
    url: &str,
    check_url: bool,
) -> Result<Option<BpJson>, Vec<String>> {
    let path = settings.paths().url_bpjson(owner);
    let mut reasons = Vec::new();
    if settings.refresh.bpjsons {
        info!(
            "{owner}: Force is True - removing the producer's cached url bp.json file - {}",
            path.display()
        );
        if let Err(e) = cache::remove_if_exists(&path).await {
            reasons.push(e.to_string());
        }
    }
    if check_url {
        info!("{owner}: updating the url bp.json cache file from {url} ...");
        match client
            .fetch_if_modified(url, cache::modified(&path).await)
            .await
        {
            Ok(Some(download)) => match cache::write_bytes(&path, &download.bytes).await {
                Ok(()) => {
                    if let Some(at) = download.last_modified {
                        if let Err(e) = cache::set_modified(&path, at).await {
                            info!("{owner}: {e}");
                        }
                    }
                    info!("{owner}: success");
                }
                Err(e) => reasons.push(e.to_string()),
            },
            Ok(None) => info!("{owner}: not modified"),
            Err(e) => {
                info!("{owner}: failed");
                reasons.push(format!("FAIL: {e}"));
            }
        }
    }
    if !cache::file_exists(&path).await {
        return if reasons.is_empty() {
            Ok(None)
        } else {
            Err(reasons)
        };
    }
    match cache::read_json::<BpJson>(&path).await {
        Ok(doc) if !doc.is_empty() => Ok(Some(doc)),
        Ok(_) => Ok(None),
        Err(e) => {
            reasons.push(format!("url bp.json cache file could not be decoded as JSON: {e}"));
            Err(reasons)
        }
    }
}

/// The bp.json each producer publishes on its own website.
///
/// URLs are only contacted when the `urls-last-checked` marker is stale (or a refresh is forced);
/// otherwise the cached copies are used as they are.
pub async fn url_bpjsons(
    client: &ChainClient,
    producers: &ProducerSet,
    settings: &Settings,
) -> BTreeMap<String, BpJson> {
    let marker = settings.paths().urls_last_checked();
    let max_age = Duration::from_secs(settings.config.urls_max_age);
    let check_urls = settings.refresh.bpjsons || cache::is_stale(&marker, max_age).await;

    let mut documents = BTreeMap::new();
    for producer in producers.producers.values() {
        let owner = producer.owner.as_str();
        let Some(url) = producer.bpjson_url() else {
            continue;
        };
        match url_bpjson(client, settings, owner, &url, check_urls).await {
            Ok(Some(doc)) => {
                documents.insert(owner.to_string(), doc);
            }
            Ok(None) => info!("{owner}: failed to retrieve url bp.json for the cache"),
            Err(reasons) => {
                info!("{owner}: failed to retrieve url bp.json for the cache");
                for reason in reasons {
                    info!("{owner}: + {reason}");
                }
            }
        }
    }
    if check_urls {
        if let Err(e) = cache::touch(&marker).await {
            warn!("system: {e}");
        }
    }
    documents
}

pub async fn gather_bpjsons(
    client: &ChainClient,
    producers: &ProducerSet,
    history: &ChainHistory,
    settings: &Settings,
) -> BpJsons {
    let chain = chain_bpjsons(producers, history, settings).await;
    let url = url_bpjsons(client, producers, settings).await;
    info!(
        "system: {} url bp.json files in total for {}",
        url.len(),
        settings.network
    );
    BpJsons { chain, url }
}
