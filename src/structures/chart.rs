//! Per-parameter time series and click resolution.
//!
//! Points are laid out exactly as the browser plots them: one series per
//! site, one point per date. A click reports (curve, point) indices, which
//! map straight back into these vectors.

use std::collections::HashSet;

use serde::Serialize;
use time::Date;

use super::{
    model::{MeasurementRecord, Parameter},
    sites::{SiteCatalog, SiteKey},
};

const FIXED_COLORS: [(&str, &str); 3] = [
    ("Blue River", "#636EFA"),
    ("Snake River", "#EF553B"),
    ("Swan River", "#00CC96"),
];

const PALETTE: [&str; 7] = [
    "#AB63FA", "#FFA15A", "#19D3F3", "#FF6692", "#B6E880", "#FF97FF", "#FECB52",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `None` draws a gap.
    pub value: Option<f64>,
    pub record_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Short site name, used as the legend entry.
    pub name: String,
    pub color: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub parameter: &'static str,
    pub title: String,
    pub series: Vec<Series>,
}

impl Chart {
    /// The record behind a clicked point, or `None` when the indices do not
    /// land on one.
    pub fn resolve_click(&self, curve: usize, point: usize) -> Option<i64> {
        self.series
            .get(curve)
            .and_then(|s| s.points.get(point))
            .map(|p| p.record_id)
    }
}

fn sort_rank(key: SiteKey<'_>, first_seen: usize) -> (u8, usize) {
    match key {
        SiteKey::Catalog(index) => (0, index),
        SiteKey::Legacy(index) => (1, index),
        SiteKey::Unmapped(_) => (2, first_seen),
    }
}

/// Builds the chart for one parameter. Records need not be sorted.
pub fn build_chart(
    records: &[MeasurementRecord],
    catalog: &SiteCatalog,
    parameter: Parameter,
) -> Chart {
    let mut ordered: Vec<&MeasurementRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.measurement.date);

    let mut groups: Vec<(SiteKey<'_>, usize, Vec<Point>, HashSet<Date>)> = Vec::new();
    for record in ordered {
        let key = catalog.key(&record.measurement.site);
        let index = match groups.iter().position(|(k, ..)| *k == key) {
            Some(index) => index,
            None => {
                groups.push((key, groups.len(), Vec::new(), HashSet::new()));
                groups.len() - 1
            }
        };
        let (_, _, points, seen) = &mut groups[index];
        // first row for a (site, date) wins
        if !seen.insert(record.measurement.date) {
            continue;
        }
        let value = record
            .measurement
            .readings
            .get(parameter)
            .filter(|v| !(parameter.zero_is_gap() && *v == 0.0));
        points.push(Point {
            date: record.measurement.date.to_string(),
            value,
            record_id: record.id,
        });
    }
    groups.sort_by_key(|(key, first_seen, ..)| sort_rank(*key, *first_seen));

    let mut palette = PALETTE.iter().cycle();
    let series = groups
        .into_iter()
        .map(|(key, _, points, _)| {
            let name = catalog.short_name(key);
            let color = FIXED_COLORS
                .iter()
                .find(|(site, _)| *site == name)
                .map(|(_, color)| *color)
                .or_else(|| palette.next().copied())
                .unwrap_or(PALETTE[0]);
            Series {
                name: name.to_string(),
                color: color.to_string(),
                points,
            }
        })
        .collect();

    Chart {
        parameter: parameter.column(),
        title: format!("{} - All Sites", parameter.title()),
        series,
    }
}

pub fn build_charts(records: &[MeasurementRecord], catalog: &SiteCatalog) -> Vec<Chart> {
    Parameter::ALL
        .into_iter()
        .map(|p| build_chart(records, catalog, p))
        .collect()
}
