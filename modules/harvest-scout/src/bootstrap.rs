use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use harvest_archive::{
    AggressiveFetcher, MirrorFetcher, NewsFeedSearch, RenderedFetcher, SearxngSearch,
    SerperSearch, StaticFetcher,
};
use harvest_common::{HarvestError, ResearchConfig};

use crate::pipeline::research::ResearchPipeline;
use crate::pipeline::search::{LayerPlan, LayerSpec};
use crate::traits::{ExtractionStrategy, SearchBackend};

/// Share of the query list each layer gets, in layer order.
const PRIMARY_SHARE: usize = 5;
const SECONDARY_SHARE: usize = 3;
const NEWS_SHARE: usize = 2;

const SEARXNG_MIN_DELAY: Duration = Duration::from_millis(250);
const NEWS_MIN_DELAY: Duration = Duration::from_secs(1);

/// Wires the configured backends into primary, secondary and news layers.
/// Layers with no backend are dropped and their share redistributed.
pub fn layer_plan(config: &ResearchConfig, query_count: usize) -> Result<LayerPlan, HarvestError> {
    let serper = config
        .serper_api_key
        .as_deref()
        .map(|key| SerperSearch::new(key).map(|s| Arc::new(s) as Arc<dyn SearchBackend>))
        .transpose()
        .map_err(|e| HarvestError::Config(format!("serper backend: {e}")))?;
    let searxng = config
        .searxng_url
        .as_deref()
        .map(|url| SearxngSearch::new(url).map(|s| Arc::new(s) as Arc<dyn SearchBackend>))
        .transpose()
        .map_err(|e| HarvestError::Config(format!("searxng backend: {e}")))?;
    let news = if config.news_feed_enabled {
        let backend = NewsFeedSearch::new().map_err(|e| HarvestError::Config(format!("news backend: {e}")))?;
        Some(Arc::new(backend) as Arc<dyn SearchBackend>)
    } else {
        None
    };

    // Without Serper, SearXNG moves up to the primary layer.
    let (primary, secondary) = match (serper, searxng) {
        (Some(serper), searxng) => (Some((serper, Duration::ZERO)), searxng),
        (None, Some(searxng)) => (Some((searxng, SEARXNG_MIN_DELAY)), None),
        (None, None) => (None, None),
    };

    let mut layers: Vec<(LayerSpec, usize)> = Vec::new();
    if let Some((adapter, delay)) = primary {
        layers.push((LayerSpec::new("primary", 0..0).adapter(adapter).min_delay(delay).primary(), PRIMARY_SHARE));
    }
    if let Some(adapter) = secondary {
        layers.push((LayerSpec::new("secondary", 0..0).adapter(adapter).min_delay(SEARXNG_MIN_DELAY), SECONDARY_SHARE));
    }
    if let Some(adapter) = news {
        layers.push((LayerSpec::new("news", 0..0).adapter(adapter).min_delay(NEWS_MIN_DELAY), NEWS_SHARE));
    }
    if layers.is_empty() {
        return Err(HarvestError::Config(
            "no search backend configured: set SERPER_API_KEY, SEARXNG_URL or NEWS_FEED_ENABLED".to_string(),
        ));
    }

    let shares: Vec<usize> = layers.iter().map(|(_, share)| *share).collect();
    let ranges = split_ranges(&shares, query_count);
    let specs = layers
        .into_iter()
        .zip(ranges)
        .map(|((mut spec, _), range)| {
            spec.queries = range;
            spec
        })
        .collect();
    LayerPlan::new(specs)
}

/// Contiguous, disjoint ranges covering `0..total`, sized by `shares`.
/// Rounding leftovers go to the earliest layers.
pub fn split_ranges(shares: &[usize], total: usize) -> Vec<Range<usize>> {
    let sum: usize = shares.iter().sum();
    if sum == 0 {
        return shares.iter().map(|_| 0..0).collect();
    }
    let mut sizes: Vec<usize> = shares.iter().map(|s| total * s / sum).collect();
    let mut leftover = total - sizes.iter().sum::<usize>();
    for size in sizes.iter_mut() {
        if leftover == 0 {
            break;
        }
        *size += 1;
        leftover -= 1;
    }

    let mut start = 0;
    sizes
        .into_iter()
        .map(|size| {
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Strategy chain in order: static, rendered (when a backend is configured),
/// aggressive, mirrors.
pub fn extraction_strategies(config: &ResearchConfig) -> Result<Vec<Arc<dyn ExtractionStrategy>>> {
    let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = vec![Arc::new(StaticFetcher::new()?)];
    match RenderedFetcher::from_backend(&config.page_backend, config.chrome_bin.as_deref())? {
        Some(rendered) => strategies.push(Arc::new(rendered)),
        None => warn!("No page renderer configured, skipping rendered extraction"),
    }
    strategies.push(Arc::new(AggressiveFetcher::new()?));
    strategies.push(Arc::new(MirrorFetcher::new()?));
    Ok(strategies)
}

pub fn research_pipeline(config: &ResearchConfig) -> Result<ResearchPipeline> {
    let plan = layer_plan(config, config.max_queries)?;
    for layer in plan.layers() {
        info!(layer = layer.id.as_str(), queries = ?layer.queries, "Search layer configured");
    }
    let pipeline = extraction_strategies(config)?
        .into_iter()
        .fold(ResearchPipeline::from_config(plan, config), ResearchPipeline::strategy);
    Ok(pipeline)
}
