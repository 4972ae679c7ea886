/*!
 * Region discovery strategies.
 *
 * Each strategy is a pure lookup over the current document. The detector tries
 * them in order and keeps the first match: accessible labels first (one list
 * per supported locale), then structural selectors.
 */

use std::fmt::Debug;

use anyhow::Result;
use log::debug;

use crate::app_config::DetectorConfig;
use crate::document::{Document, NodeId, Selector};

/// A way of finding the live content region
pub trait RegionStrategy: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Look the region up in the current document
    fn locate(&self, document: &Document) -> Option<NodeId>;
}

/// Finds the region by its `aria-label`, across locales
#[derive(Debug, Clone)]
pub struct AriaLabelStrategy {
    // (locale, label, selector), in lookup order
    labels: Vec<(String, String, Selector)>,
}

impl AriaLabelStrategy {
    pub fn new<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let labels = labels
            .into_iter()
            .map(|(locale, label)| {
                (
                    locale.to_string(),
                    label.to_string(),
                    Selector::attribute_equals("aria-label", label),
                )
            })
            .collect();
        Self { labels }
    }
}

impl RegionStrategy for AriaLabelStrategy {
    fn name(&self) -> &str {
        "aria-label"
    }

    fn locate(&self, document: &Document) -> Option<NodeId> {
        self.labels.iter().find_map(|(locale, label, selector)| {
            let found = document.query_selector(document.body(), selector)?;
            debug!("Found content region by label '{}' ({})", label, locale);
            Some(found)
        })
    }
}

/// Finds the region by structural selectors
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    selectors: Vec<Selector>,
}

impl SelectorStrategy {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self { selectors }
    }
}

impl RegionStrategy for SelectorStrategy {
    fn name(&self) -> &str {
        "selector"
    }

    fn locate(&self, document: &Document) -> Option<NodeId> {
        self.selectors.iter().find_map(|selector| {
            let found = document.query_selector(document.body(), selector)?;
            debug!("Found content region by selector '{}'", selector);
            Some(found)
        })
    }
}

/// The label strategy followed by the selector strategy, as configured
pub fn default_strategies(config: &DetectorConfig) -> Result<Vec<Box<dyn RegionStrategy>>> {
    let labels = config
        .region_labels
        .iter()
        .flat_map(|set| set.labels.iter().map(move |label| (set.locale.as_str(), label.as_str())));

    let selectors = DetectorConfig::parse_selectors(&config.region_selectors)?;

    Ok(vec![
        Box::new(AriaLabelStrategy::new(labels)),
        Box::new(SelectorStrategy::new(selectors)),
    ])
}
