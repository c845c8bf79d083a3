use std::sync::Arc;

use adrule_common::types::{DailyMetric, MetricKind};
use adrule_storage::MetricsStore;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

/// Window totals for one entity plus the ratios derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSet {
    /// Number of daily rows that contributed to the totals.
    pub days: usize,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
    pub clicks: u64,
    pub impressions: u64,
}

impl MetricSet {
    pub fn from_rows(rows: &[DailyMetric]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.days += 1;
            acc.spend += row.spend;
            acc.revenue += row.revenue;
            acc.conversions += row.conversions;
            acc.clicks += row.clicks;
            acc.impressions += row.impressions;
            acc
        })
    }

    /// No rows in the window. Conditions never match an empty set.
    pub fn is_empty(&self) -> bool {
        self.days == 0
    }

    pub fn roas(&self) -> f64 {
        if self.spend > 0.0 {
            self.revenue / self.spend
        } else {
            0.0
        }
    }

    pub fn cpa(&self) -> f64 {
        if self.conversions > 0.0 {
            self.spend / self.conversions
        } else {
            f64::INFINITY
        }
    }

    pub fn cpc(&self) -> f64 {
        if self.clicks > 0 {
            self.spend / self.clicks as f64
        } else {
            f64::INFINITY
        }
    }

    /// Click-through rate in percent.
    pub fn ctr(&self) -> f64 {
        if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn profit(&self) -> f64 {
        self.revenue - self.spend
    }

    /// Profit as a percentage of revenue.
    pub fn profit_margin(&self) -> f64 {
        if self.revenue > 0.0 {
            (self.revenue - self.spend) / self.revenue * 100.0
        } else {
            0.0
        }
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Spend => self.spend,
            MetricKind::Revenue => self.revenue,
            MetricKind::Conversions => self.conversions,
            MetricKind::Clicks => self.clicks as f64,
            MetricKind::Impressions => self.impressions as f64,
            MetricKind::Roas => self.roas(),
            MetricKind::Cpa => self.cpa(),
            MetricKind::Cpc => self.cpc(),
            MetricKind::Ctr => self.ctr(),
            MetricKind::Profit => self.profit(),
            MetricKind::ProfitMargin => self.profit_margin(),
        }
    }
}

/// Sums daily rows over a lookback window.
#[derive(Clone)]
pub struct MetricAggregator {
    store: Arc<dyn MetricsStore>,
}

impl MetricAggregator {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Aggregates rows dated within `[now - window_days, now]`, both ends
    /// inclusive.
    pub fn aggregate(
        &self,
        entity_id: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<MetricSet> {
        let to = now.date_naive();
        let from = to - Duration::days(i64::from(window_days));
        let rows = self.store.query_daily_metrics(entity_id, from, to)?;
        Ok(MetricSet::from_rows(&rows))
    }
}
