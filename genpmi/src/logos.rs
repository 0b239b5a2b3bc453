use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::info;
use url::Url;

use crate::{
    bpjson::BpJson,
    cache,
    cfg::{CachePaths, Settings},
    fetch::ChainClient,
};

const FALLBACK_EXTENSION: &str = "img";

/// File extension for an image `Content-Type`, ignoring any parameters.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    Some(match mime.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => return None,
    })
}

/// The extension the logo URL's path ends with, if any.
pub fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// The cached logo for `stem`, whatever extension it was saved with.
async fn cached_logo(stem: &Path) -> Option<PathBuf> {
    let dir = stem.parent()?;
    let prefix = format!("{}.", stem.file_name()?.to_str()?);
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| n.starts_with(&prefix)) {
            return Some(entry.path());
        }
    }
    None
}

/// Decide whether the cached logo must be downloaded again.
async fn needs_update(
    client: &ChainClient,
    owner: &str,
    url: &str,
    cached: &Path,
    force: bool,
) -> bool {
    if force {
        info!(
            "{owner}: Force is True - removing the producer's cached url logo file - {}",
            cached.display()
        );
        if let Err(e) = cache::remove_if_exists(cached).await {
            info!("{owner}: {e}");
        }
        return true;
    }
    let Some(mtime) = cache::modified(cached).await else {
        info!("{owner}: logo cache file ({}) is missing", cached.display());
        return true;
    };
    match client.last_modified(url).await {
        Ok(Some(remote)) if remote > mtime => {
            info!("{owner}: the producers logo file is newer than the cache file");
            true
        }
        Ok(Some(_)) => false,
        Ok(None) => {
            info!("{owner}: could not retrieve a Last-Modified value for the producer logo file");
            true
        }
        Err(e) => {
            info!("{owner}: logo cache file ({}): {e}", cached.display());
            true
        }
    }
}

/// Keep one producer's logo cache current. Returns the cached file, if there is one.
pub async fn update_logo(
    client: &ChainClient,
    paths: &CachePaths,
    owner: &str,
    doc: &BpJson,
    force: bool,
) -> Option<PathBuf> {
    let url = match doc.logo_url() {
        Ok(url) => url,
        Err(gap) => {
            info!("{owner}: {gap}");
            return None;
        }
    };
    let stem = paths.logo_stem(owner);
    let cached = match cached_logo(&stem).await {
        Some(cached) => cached,
        None => with_extension(
            &stem,
            &url_extension(url).unwrap_or_else(|| FALLBACK_EXTENSION.to_string()),
        ),
    };
    if !needs_update(client, owner, url, &cached, force).await {
        return Some(cached);
    }

    info!("{owner}: updating logo cache file ({}) from {url}", cached.display());
    let download = match client.download(url).await {
        Ok(download) => download,
        Err(e) => {
            info!("{owner}: Unexpected error retrieving url={url}: {e}");
            return cache::file_exists(&cached).await.then_some(cached);
        }
    };
    let ext = download
        .content_type
        .as_deref()
        .and_then(extension_for)
        .map(str::to_string)
        .or_else(|| url_extension(url))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    let target = with_extension(&stem, &ext);
    if let Err(e) = cache::write_bytes(&target, &download.bytes).await {
        info!("{owner}: {e}");
        return None;
    }
    if target != cached {
        if let Err(e) = cache::remove_if_exists(&cached).await {
            info!("{owner}: {e}");
        }
    }
    if let Some(at) = download.last_modified {
        if let Err(e) = cache::set_modified(&target, at).await {
            info!("{owner}: {e}");
        }
    }
    Some(target)
}

/// Logos for every producer with a url bp.json.
pub async fn update_logos(
    client: &ChainClient,
    documents: &BTreeMap<String, BpJson>,
    settings: &Settings,
) -> BTreeMap<String, PathBuf> {
    let paths = settings.paths();
    let mut logos = BTreeMap::new();
    for (owner, doc) in documents {
        if let Some(logo) = update_logo(client, &paths, owner, doc, settings.refresh.logos).await {
            logos.insert(owner.clone(), logo);
        }
    }
    info!(
        "system: {} logo files in total for {}",
        logos.len(),
        settings.network
    );
    logos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_from_content_type() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("IMAGE/SVG+XML"), Some("svg"));
        assert_eq!(extension_for("text/html"), None);
    }

    #[test]
    fn extensions_from_url() {
        assert_eq!(
            url_extension("https://x.example/img/logo_256.PNG?v=2").as_deref(),
            Some("png")
        );
        assert_eq!(url_extension("https://x.example/logo"), None);
        assert_eq!(url_extension("not a url"), None);
    }

    #[tokio::test]
    async fn cached_logo_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("alice-logo_256");
        assert_eq!(cached_logo(&stem).await, None);
        tokio::fs::write(dir.path().join("alice-logo_2560.png"), b"x")
            .await
            .unwrap();
        assert_eq!(cached_logo(&stem).await, None);
        tokio::fs::write(dir.path().join("alice-logo_256.jpg"), b"x")
            .await
            .unwrap();
        assert_eq!(cached_logo(&stem).await, Some(stem.with_extension("jpg")));
    }

    #[test]
    fn stems_keep_their_dots() {
        assert_eq!(
            with_extension(Path::new("out/wax-logos/a.b-logo_256"), "png"),
            PathBuf::from("out/wax-logos/a.b-logo_256.png")
        );
    }
}
