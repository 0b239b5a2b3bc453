//! One complete batch run, from the producer listing to the generated files.
//! Use this if you want to drive genpmi from your own programs.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use log::{info, warn};
use time::OffsetDateTime;

pub use crate::cfg::Settings;
use crate::{
    cache, consistency,
    country::CountryIndex,
    error::{FetchError, StructuralWarning},
    features,
    fetch::ChainClient,
    logos,
    producers::{Producer, ProducerSet},
    reconcile, report, sources,
};

/// What a run produced.
#[derive(Debug, Default)]
pub struct Outcome {
    pub producers: usize,
    pub countries: usize,
    pub map_files: Vec<PathBuf>,
    pub country_table: PathBuf,
    pub logos: usize,
    pub warnings: Vec<StructuralWarning>,
}

async fn cached_producers(settings: &Settings) -> Result<ProducerSet, FetchError> {
    let paths = settings.paths();
    let rows: Vec<Producer> = cache::read_json(&paths.producers_file()).await?;
    let top21: Vec<String> = cache::read_json(&paths.top21_file()).await?;
    Ok(ProducerSet::from_rows(rows, top21))
}

async fn fetched_producers(client: &ChainClient, settings: &Settings) -> Result<ProducerSet> {
    let paths = settings.paths();
    info!(
        "system: updating the producers cache files from {} ...",
        settings.chain_url()
    );
    let rows = client
        .producer_rows(settings.config.producers_page_size)
        .await
        .context("Cannot list the producers")?;
    let top21 = client
        .top21()
        .await
        .context("Cannot read the producer schedule")?;
    if let Err(e) = cache::write_json(&paths.producers_file(), &rows).await {
        warn!("system: {e}");
    }
    if let Err(e) = cache::write_json(&paths.top21_file(), &top21).await {
        warn!("system: {e}");
    }
    info!("system: success");
    Ok(ProducerSet::from_rows(rows, top21))
}

/// The active producers and the schedule: from cache while it is fresh, from the chain otherwise.
/// An unusable cache is refetched, and a failed fetch falls back to whatever cache there is.
pub async fn load_producers(client: &ChainClient, settings: &Settings) -> Result<ProducerSet> {
    let paths = settings.paths();
    let max_age = Duration::from_secs(settings.config.producers_max_age);
    let stale = cache::is_stale(paths.producers_file(), max_age).await
        || cache::is_stale(paths.top21_file(), max_age).await;

    if settings.refresh.producers {
        info!("system: Force is True - refreshing the producers cache files");
    } else if !stale {
        match cached_producers(settings).await {
            Ok(producers) => return Ok(producers),
            Err(e) => warn!("system: {e}; fetching the producers again"),
        }
    }

    let fetched = fetched_producers(client, settings).await;
    let producers = match fetched {
        Ok(producers) => producers,
        Err(e) => {
            warn!("system: FAIL: {e:#}");
            cached_producers(settings)
                .await
                .context("No producer information is available")?
        }
    };
    if producers.is_empty() {
        bail!("There are no active producers on {}", settings.network);
    }
    Ok(producers)
}

/// Run every stage in order. The run fails when no producer can be obtained or an output file
/// cannot be written; anything else is logged against the producer it concerns.
pub async fn run(settings: &Settings) -> Result<Outcome> {
    info!(
        "system: generating producer map info for {} in {}",
        settings.network,
        settings.config.base_dir.display()
    );
    let client = ChainClient::new(settings).context("Cannot build the HTTP client")?;
    let paths = settings.paths();

    let producers = load_producers(&client, settings).await?;
    info!(
        "system: {} producers in total for {}",
        producers.len(),
        settings.network
    );
    producers.verify();

    let history = sources::load_history(&client, settings).await;
    let bpjsons = sources::gather_bpjsons(&client, &producers, &history, settings).await;
    let logo_files = logos::update_logos(&client, &bpjsons.url, settings).await;
    let warnings = consistency::check(&producers, &bpjsons, logo_files.len());

    let map = features::build_map_features(&bpjsons.chain, &producers.top21, &client).await;
    let map_files = report::write_map_features(&paths, &map)
        .await
        .context("Cannot write the map feature files")?;

    let reconciled = reconcile::reconcile_all(&producers, &history.by_owner);
    let index = CountryIndex::build(&reconciled);
    let country_table = report::write_country_table(&paths, &index, OffsetDateTime::now_utc())
        .await
        .context("Cannot write the country table")?;

    info!("system: complete.");
    Ok(Outcome {
        producers: producers.len(),
        countries: index.len(),
        map_files,
        country_table,
        logos: logo_files.len(),
        warnings,
    })
}
