use serde::Serialize;

use crate::error::Candidate;
use crate::report::Report;

/// One report as an object, several as an array.
pub fn render_reports(reports: &[Report]) -> String {
    let json = match reports {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    };
    json.expect("Failed to serialize to JSON")
}

#[derive(Serialize)]
struct AmbiguousOutput<'a> {
    error: &'static str,
    name: &'a str,
    candidates: &'a [Candidate],
}

pub fn render_ambiguous(name: &str, candidates: &[Candidate]) -> String {
    serde_json::to_string_pretty(&AmbiguousOutput {
        error: "ambiguous",
        name,
        candidates,
    })
    .expect("Failed to serialize to JSON")
}
