//! Prometheus text format for service metrics, served at /metrics

use crate::infra::metrics::MetricsSummary;
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

fn write_prediction_errors(output: &mut String, summary: &MetricsSummary) {
    let name = "forecast_prediction_errors_total";
    let _ = writeln!(output, "# HELP {name} Rejected prediction requests by reason");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (reason, val) in [
        ("invalid_date", summary.invalid_date_total),
        ("model_not_ready", summary.not_ready_total),
        ("date_out_of_horizon", summary.out_of_horizon_total),
        ("no_estimate", summary.no_estimate_total),
        ("insufficient_data", summary.insufficient_data_total),
    ] {
        let _ = writeln!(output, "{name}{{reason=\"{reason}\"}} {val}");
    }
}

/// Render all metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "forecast_predictions_total",
        "Prediction requests answered",
        MetricType::Counter,
        summary.predictions_total,
    );
    write_prediction_errors(&mut output, summary);
    write_metric(
        &mut output,
        "forecast_uploads_accepted_total",
        "Uploads that replaced the snapshot",
        MetricType::Counter,
        summary.uploads_accepted_total,
    );
    write_metric(
        &mut output,
        "forecast_uploads_rejected_total",
        "Uploads rejected during parsing, cleaning or fitting",
        MetricType::Counter,
        summary.uploads_rejected_total,
    );
    write_metric(
        &mut output,
        "forecast_snapshot_swaps_total",
        "Snapshots put into service",
        MetricType::Counter,
        summary.snapshot_swaps_total,
    );
    write_metric(
        &mut output,
        "forecast_snapshot_rows",
        "Cleaned records in the current snapshot",
        MetricType::Gauge,
        summary.snapshot_rows,
    );
    write_metric(
        &mut output,
        "forecast_snapshot_rows_dropped",
        "Rows dropped for unparseable dates in the current snapshot",
        MetricType::Gauge,
        summary.snapshot_rows_dropped,
    );
    write_metric(
        &mut output,
        "forecast_snapshot_days",
        "Distinct days of history in the current snapshot",
        MetricType::Gauge,
        summary.snapshot_days,
    );
    write_metric(
        &mut output,
        "forecast_points",
        "Dates covered by the current forecast",
        MetricType::Gauge,
        summary.forecast_points,
    );

    output
}
