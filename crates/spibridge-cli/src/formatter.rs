//! Output formatters for drained bundles.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::{json, Value};

use spibridge_core::SubscriptionStats;
use spibridge_proto::{Event, EventBundle, Name, NamespaceResolver};

/// Output format for bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format drained bundles.
    fn format_bundles(&self, bundles: &[EventBundle]) -> String;

    /// Format subscription counters.
    fn format_stats(&self, stats: &SubscriptionStats) -> String;
}

/// Create a formatter for the given output format.
///
/// Names are rendered in prefixed form where `resolver` knows the namespace.
pub fn create_formatter<'a>(
    format: OutputFormat,
    resolver: &'a dyn NamespaceResolver,
) -> Box<dyn Formatter + 'a> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter { resolver }),
        OutputFormat::Json => Box::new(JsonFormatter { resolver }),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter<'a> {
    resolver: &'a dyn NamespaceResolver,
}

impl Formatter for TableFormatter<'_> {
    fn format_bundles(&self, bundles: &[EventBundle]) -> String {
        if bundles.is_empty() {
            return "No bundles".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "Bundle", "Local", "Type", "Path", "Parent", "Parent Type", "Mixins", "User",
        ]);

        for bundle in bundles {
            let short_id: String = bundle.bundle_id().chars().take(8).collect();
            if bundle.is_empty() {
                table.add_row(vec![
                    Cell::new(&short_id),
                    Cell::new(bundle.is_local()),
                    Cell::new("(empty)"),
                ]);
                continue;
            }
            for event in bundle.events() {
                table.add_row(vec![
                    Cell::new(&short_id),
                    Cell::new(bundle.is_local()),
                    Cell::new(event.event_type()),
                    Cell::new(event.path()),
                    Cell::new(event.parent_id()),
                    Cell::new(
                        event
                            .primary_type()
                            .map(|n| format_name(n, self.resolver))
                            .unwrap_or_default(),
                    ),
                    Cell::new(format_mixins(event, self.resolver).join(", ")),
                    Cell::new(event.user_id().unwrap_or("")),
                ]);
            }
        }

        let events: usize = bundles.iter().map(EventBundle::len).sum();
        format!("{}\n{} bundle(s), {} event(s)", table, bundles.len(), events)
    }

    fn format_stats(&self, stats: &SubscriptionStats) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Counter", "Value"]);
        table.add_row(vec![Cell::new("bundles published"), Cell::new(stats.bundles_published)]);
        table.add_row(vec![Cell::new("events translated"), Cell::new(stats.events_translated)]);
        table.add_row(vec![
            Cell::new("translation failures"),
            Cell::new(stats.translation_failures),
        ]);
        table.add_row(vec![Cell::new("bundles delivered"), Cell::new(stats.bundles_delivered)]);
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter<'a> {
    resolver: &'a dyn NamespaceResolver,
}

impl JsonFormatter<'_> {
    fn event_to_json(&self, event: &Event) -> Value {
        json!({
            "type": event.event_type().as_str(),
            "path": event.path().to_string(),
            "item_id": event.item_id().to_string(),
            "parent_id": event.parent_id().to_string(),
            "primary_type": event.primary_type().map(|n| format_name(n, self.resolver)),
            "mixin_types": format_mixins(event, self.resolver),
            "user_id": event.user_id(),
        })
    }
}

impl Formatter for JsonFormatter<'_> {
    fn format_bundles(&self, bundles: &[EventBundle]) -> String {
        let output: Vec<Value> = bundles
            .iter()
            .map(|bundle| {
                json!({
                    "bundle_id": bundle.bundle_id(),
                    "is_local": bundle.is_local(),
                    "events": bundle.events().iter().map(|e| self.event_to_json(e)).collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&output).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }

    fn format_stats(&self, stats: &SubscriptionStats) -> String {
        let output = json!({
            "bundles_published": stats.bundles_published,
            "events_translated": stats.events_translated,
            "translation_failures": stats.translation_failures,
            "bundles_delivered": stats.bundles_delivered,
        });
        serde_json::to_string_pretty(&output).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

fn format_name(name: &Name, resolver: &dyn NamespaceResolver) -> String {
    name.format(resolver).unwrap_or_else(|_| name.to_string())
}

fn format_mixins(event: &Event, resolver: &dyn NamespaceResolver) -> Vec<String> {
    event
        .mixin_types()
        .iter()
        .map(|n| format_name(n, resolver))
        .collect()
}
