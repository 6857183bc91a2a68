mod models;

use json_fit::{Context, Fitter, Formatter, Json5Formatter};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use models::Item;

const SAMPLES: &[(&str, &str)] = &[
    ("items.json", include_str!("../samples/items.json")),
    ("broken.json", include_str!("../samples/broken.json")),
];

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let fitter = Fitter::new();
    let context = Context::new().with("source", "hacker-news");
    let formatter = Json5Formatter::default();

    for (name, source) in SAMPLES {
        eprintln!("== {name} ==");
        let payload = match serde_json::from_str::<Value>(source) {
            Ok(x) => x,
            Err(error) => {
                eprintln!("❌ not JSON: {error}");
                continue;
            }
        };
        let trace = match fitter.trace::<Vec<Item>>(&payload, &context) {
            Ok(x) => x,
            Err(error) => {
                eprintln!("❌ {error}");
                continue;
            }
        };
        match trace.value() {
            Some(items) => {
                for item in items {
                    eprintln!("✅ {} {}", item.label(), item.id());
                }
            }
            None => {
                eprintln!("❌ does not fit:\n{}", formatter.format(trace.node()));
                for issue in trace.node().issues() {
                    tracing::debug!("{issue}");
                }
            }
        }
    }
}
