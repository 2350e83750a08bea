//! Lag-aware index selection.
//!
//! The offline rebuild runs a day or more behind the live write path, so a
//! freshly rebuilt index is missing the most recent documents. Readers and
//! writers therefore keep using the live index until the rebuilt one is at
//! least `lag_days` old; after that, reads go to the short rebuilt alias
//! and writes to the full rebuilt name.

use chrono::{Duration, NaiveDate, Utc};
use snapindex_core::metadata::IndexMetadata;
use snapindex_core::routing::{RoutingStrategy, StrategyRegistry};

/// Chooses which index name to read from and write to for a given record.
#[derive(Debug, Clone)]
pub struct LaggedIndexSelector {
    lag_days: i64,
    strategies: StrategyRegistry,
}

impl LaggedIndexSelector {
    pub fn new(lag_days: i64) -> Self {
        Self {
            lag_days,
            strategies: StrategyRegistry::new(),
        }
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Whether the rebuilt index is old enough to serve. Metadata without an
    /// alias never qualifies. Records with no parseable date (the legacy
    /// nested-date form deserialises to `None`) predate the lag window and
    /// count as old.
    fn rebuild_visible(&self, meta: &IndexMetadata, today: NaiveDate) -> bool {
        if meta.rebuilt_index_alias.is_none() {
            return false;
        }
        match meta.index_date {
            Some(date) => date <= today - Duration::days(self.lag_days),
            None => true,
        }
    }

    /// Index name to read from.
    pub fn index_readable(&self, meta: &IndexMetadata) -> String {
        if self.rebuild_visible(meta, Self::today()) {
            // rebuild_visible checked the alias is present
            meta.rebuilt_index_alias.clone().unwrap_or_default()
        } else {
            meta.index_name_at_birth.clone()
        }
    }

    /// Index name to write to. Prefers the full rebuilt name; records
    /// published before it existed fall back to the alias.
    pub fn index_writable(&self, meta: &IndexMetadata) -> String {
        if !self.rebuild_visible(meta, Self::today()) {
            return meta.index_name_at_birth.clone();
        }
        meta.rebuilt_index_name
            .clone()
            .or_else(|| meta.rebuilt_index_alias.clone())
            .unwrap_or_default()
    }

    /// Routing strategy for the rebuilt index, when it is visible and its
    /// metadata names a registered strategy. A record without a date still
    /// serves the rebuilt names but cannot vouch for its routing geometry,
    /// so it gets no strategy.
    pub fn routing_strategy(&self, meta: &IndexMetadata) -> Option<Box<dyn RoutingStrategy>> {
        if meta.index_date.is_none() || !self.rebuild_visible(meta, Self::today()) {
            return None;
        }
        self.strategies.instantiate(meta)
    }

    /// Single strategy shared by all of `metas`, for pruning a multi-index
    /// query. `None` when any index lacks a strategy or they differ, meaning
    /// the caller must search all shards.
    pub fn routing_strategy_for_all(
        &self,
        metas: &[IndexMetadata],
    ) -> Option<Box<dyn RoutingStrategy>> {
        let mut shared: Option<Box<dyn RoutingStrategy>> = None;
        for meta in metas {
            let strategy = self.routing_strategy(meta)?;
            match &shared {
                None => shared = Some(strategy),
                Some(existing) if existing.same_routing(strategy.as_ref()) => {}
                Some(_) => return None,
            }
        }
        shared
    }
}
