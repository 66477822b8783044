//! Output formatters for benchmark reports.

use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use txbench::report::ReportRow;
use txbench::{Report, Summary};

/// Placeholder for runs that recorded no samples.
const NO_SAMPLES: &str = "no samples";

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format every row of a report.
    fn format_report(&self, report: &Report) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Microseconds with one decimal.
fn micros(d: Duration) -> String {
    format!("{:.1}", d.as_secs_f64() * 1_000_000.0)
}

fn completed(row: &ReportRow) -> String {
    format!("{}/{}", row.completed, row.spec.iteration_count)
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &Report) -> String {
        if report.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "backend", "iterations", "batch", "mean µs", "p50 µs", "p95 µs", "min µs", "max µs",
            "stdev µs", "items/s", "error",
        ]);

        for row in report.rows() {
            let mut cells = vec![
                Cell::new(&row.backend),
                Cell::new(completed(row)),
                Cell::new(row.spec.batch_size),
            ];

            match &row.summary {
                Summary::NoSamples => {
                    cells.push(Cell::new(NO_SAMPLES));
                    cells.extend((0..6).map(|_| Cell::new("")));
                }
                Summary::Measured(stats) => {
                    cells.push(Cell::new(micros(stats.mean)));
                    cells.push(Cell::new(micros(stats.p50)));
                    cells.push(Cell::new(micros(stats.p95)));
                    cells.push(Cell::new(micros(stats.min)));
                    cells.push(Cell::new(micros(stats.max)));
                    cells.push(Cell::new(micros(stats.stdev)));
                    cells.push(Cell::new(format!("{:.0}", stats.throughput_items_per_sec)));
                }
            }

            cells.push(Cell::new(row.error.as_deref().unwrap_or("")));
            table.add_row(cells);
        }

        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn row_to_json(row: &ReportRow) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("backend".into(), row.backend.clone().into());
        obj.insert(
            "batch".into(),
            serde_json::to_value(row.spec).unwrap_or(serde_json::Value::Null),
        );
        obj.insert("completed".into(), row.completed.into());
        obj.insert("elapsed_us".into(), (row.elapsed.as_micros() as u64).into());

        let summary = match &row.summary {
            Summary::NoSamples => serde_json::Value::String(NO_SAMPLES.to_string()),
            Summary::Measured(stats) => serde_json::json!({
                "count": stats.count,
                "mean_us": stats.mean.as_secs_f64() * 1e6,
                "p50_us": stats.p50.as_secs_f64() * 1e6,
                "p95_us": stats.p95.as_secs_f64() * 1e6,
                "min_us": stats.min.as_secs_f64() * 1e6,
                "max_us": stats.max.as_secs_f64() * 1e6,
                "stdev_us": stats.stdev.as_secs_f64() * 1e6,
                "items_per_sec": stats.throughput_items_per_sec,
            }),
        };
        obj.insert("summary".into(), summary);

        obj.insert(
            "error".into(),
            match &row.error {
                Some(e) => e.clone().into(),
                None => serde_json::Value::Null,
            },
        );

        serde_json::Value::Object(obj)
    }
}

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &Report) -> String {
        let rows: Vec<_> = report.rows().iter().map(Self::row_to_json).collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_report(&self, report: &Report) -> String {
        let mut output = String::from(
            "backend,completed,iterations,batch_size,mean_us,p50_us,p95_us,min_us,max_us,stdev_us,items_per_sec,error\n",
        );

        for row in report.rows() {
            let stats = match &row.summary {
                Summary::NoSamples => format!("{},,,,,,", NO_SAMPLES),
                Summary::Measured(s) => format!(
                    "{},{},{},{},{},{},{:.0}",
                    micros(s.mean),
                    micros(s.p50),
                    micros(s.p95),
                    micros(s.min),
                    micros(s.max),
                    micros(s.stdev),
                    s.throughput_items_per_sec
                ),
            };
            output.push_str(&format!(
                "{},{},{},{},{},\"{}\"\n",
                row.backend,
                row.completed,
                row.spec.iteration_count,
                row.spec.batch_size,
                stats,
                escape_csv(row.error.as_deref().unwrap_or(""))
            ));
        }

        output
    }
}

/// Escape a value for CSV output.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
