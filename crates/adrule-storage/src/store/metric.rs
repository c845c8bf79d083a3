use adrule_common::types::DailyMetric;
use chrono::NaiveDate;
use rusqlite::params;

use super::{date_key, parse_date, SqliteStore};
use crate::error::Result;
use crate::MetricsStore;

impl MetricsStore for SqliteStore {
    fn query_daily_metrics(
        &self,
        entity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT entity_id, date, spend, revenue, conversions, clicks, impressions
             FROM daily_metrics
             WHERE entity_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let rows = stmt
            .query_map(params![entity_id, date_key(from), date_key(to)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(entity_id, date, spend, revenue, conversions, clicks, impressions)| {
                    Ok(DailyMetric {
                        entity_id,
                        date: parse_date(&date)?,
                        spend,
                        revenue,
                        conversions,
                        clicks: clicks.max(0) as u64,
                        impressions: impressions.max(0) as u64,
                    })
                },
            )
            .collect()
    }

    fn upsert_daily_metric(&self, metric: &DailyMetric) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT OR REPLACE INTO daily_metrics
                (entity_id, date, spend, revenue, conversions, clicks, impressions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metric.entity_id,
                date_key(metric.date),
                metric.spend,
                metric.revenue,
                metric.conversions,
                metric.clicks as i64,
                metric.impressions as i64,
            ],
        )?;
        Ok(())
    }
}
