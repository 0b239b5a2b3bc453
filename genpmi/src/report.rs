//! The files a run leaves behind for the map page and for people.

use std::path::PathBuf;

use log::info;
use time::OffsetDateTime;

use crate::{
    cache,
    cfg::CachePaths,
    country::CountryIndex,
    error::FetchError,
    features::MapFeatures,
};

/// Write one `pmi-<network>-<type>.js` script per node type, empty collections included.
pub async fn write_map_features(
    paths: &CachePaths,
    features: &MapFeatures,
) -> Result<Vec<PathBuf>, FetchError> {
    let mut written = Vec::new();
    for (node_type, collection) in features.iter() {
        let path = paths.map_features(node_type);
        let script = collection
            .to_script(node_type)
            .map_err(|source| FetchError::Json {
                path: path.clone(),
                source,
            })?;
        cache::write_bytes(&path, script.as_bytes()).await?;
        info!(
            "system: wrote {} {node_type} markers to {}",
            collection.len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}

/// Write the nodes-by-country table, stamped with `collected_at`.
pub async fn write_country_table(
    paths: &CachePaths,
    index: &CountryIndex,
    collected_at: OffsetDateTime,
) -> Result<PathBuf, FetchError> {
    let path = paths.country_table();
    cache::write_bytes(&path, index.render_table(collected_at).as_bytes()).await?;
    info!(
        "system: wrote {} countries to {}",
        index.len(),
        path.display()
    );
    Ok(path)
}
