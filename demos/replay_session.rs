//! Replay a short browsing session and print what the recognizer learned

use synheart_wayfind::{PatternRecognizer, PredictionContext};

fn main() {
    let ndjson = r#"
{"url": "https://www.google.com/search?q=rust+async", "timestamp": "2024-01-16T14:00:00Z", "type": "search"}
{"url": "https://tokio.rs/tokio/tutorial", "referrer": "https://www.google.com/search?q=rust+async", "timestamp": "2024-01-16T14:00:15Z", "duration": 240000}
{"url": "https://docs.rs/tokio", "referrer": "https://tokio.rs/tokio/tutorial", "timestamp": "2024-01-16T14:04:20Z", "duration": 90000}
{"url": "https://www.google.com/search?q=rust+async+traits", "timestamp": "2024-01-16T14:06:00Z", "type": "search"}
{"url": "https://tokio.rs/blog", "referrer": "https://www.google.com/search?q=rust+async+traits", "timestamp": "2024-01-16T14:06:10Z", "duration": 60000}
{"url": "https://docs.rs/tokio/latest/tokio/task", "referrer": "https://tokio.rs/blog", "timestamp": "2024-01-16T14:07:15Z"}
"#;

    let mut recognizer = PatternRecognizer::new();
    match synheart_wayfind::EventAdapter::parse_ndjson(ndjson) {
        Ok(events) => recognizer.ingest_all(events),
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    }

    let context = PredictionContext::default()
        .with_time_of_day(14)
        .with_recent_searches(["rust async"]);

    let report = serde_json::json!({
        "patterns": recognizer.top_patterns(5, 0.0),
        "predictions": recognizer.predict("https://www.google.com/search?q=rust", Some(&context)),
        "metrics": recognizer.performance_metrics(),
    });
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
