//! JSON payloads handed across the C boundary.

use regiocast_core::{Chart, ChartSeries, CleanedFrame, ColumnData, ForecastResult};
use serde_json::{json, Map, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn cell_value(data: &ColumnData, row: usize) -> Value {
    match data {
        ColumnData::Numeric(v) => json!(v[row]),
        ColumnData::Timestamp(v) => v[row]
            .map(|dt| Value::String(dt.format(TIMESTAMP_FORMAT).to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Text(v) => Value::String(v[row].clone()),
    }
}

/// `{"columns": [...], "preview": [{column: value}, ...]}` for the first
/// `n_rows` rows.
pub fn preview_json(frame: &CleanedFrame, n_rows: usize) -> String {
    let columns: Vec<&str> = frame.column_names();
    let preview: Vec<Value> = (0..frame.n_rows().min(n_rows))
        .map(|row| {
            let record: Map<String, Value> = frame
                .columns()
                .iter()
                .map(|c| (c.name.clone(), cell_value(&c.data, row)))
                .collect();
            Value::Object(record)
        })
        .collect();

    json!({
        "columns": columns,
        "types": frame.columns().iter().map(|c| c.column_type().name()).collect::<Vec<_>>(),
        "preview": preview,
    })
    .to_string()
}

fn series_value(series: &ChartSeries) -> Value {
    json!({ "x": series.x, "y": series.y })
}

/// `{"multi_series": {region: {"x", "y"}}}` for a grouped chart, `{"x", "y"}`
/// for a single series.
pub fn chart_json(chart: &Chart) -> String {
    match chart {
        Chart::Single(series) => series_value(series),
        Chart::Grouped(groups) => {
            let multi: Map<String, Value> = groups
                .iter()
                .map(|(region, series)| (region.clone(), series_value(series)))
                .collect();
            json!({ "multi_series": multi })
        }
    }
    .to_string()
}

/// `{"mode", "forecast": {region: [{"ds", "yhat", "actual"}]}, "diagnostics"}`.
pub fn forecast_json(result: &ForecastResult) -> String {
    let forecast: Map<String, Value> = result
        .regions
        .iter()
        .map(|(region, points)| {
            let records: Vec<Value> = points
                .iter()
                .map(|p| {
                    json!({
                        "ds": p.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                        "yhat": p.predicted,
                        "actual": p.actual,
                    })
                })
                .collect();
            (region.clone(), Value::Array(records))
        })
        .collect();

    let diagnostics: Vec<Value> = result
        .diagnostics
        .iter()
        .map(|d| {
            json!({
                "region": d.region,
                "timestamp": d.timestamp.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                "kind": d.kind,
                "message": d.message,
            })
        })
        .collect();

    json!({
        "mode": result.mode.name(),
        "forecast": forecast,
        "diagnostics": diagnostics,
    })
    .to_string()
}
