//! Most searched full names for a given first name.

use axum::Json;
use axum::extract::Path;

const SURNAMES: [&str; 5] = ["Silva", "Souza", "Oliveira", "Costa", "Lima"];

/// Combine `name` with the most common surnames, in ranking order.
pub fn most_searched(name: &str) -> Vec<String> {
    SURNAMES
        .iter()
        .map(|surname| format!("{name} {surname}"))
        .collect()
}

pub async fn handler(Path(name): Path<String>) -> Json<Vec<String>> {
    Json(most_searched(&name))
}
