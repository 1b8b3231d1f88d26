//! JSON shape of `/query` responses.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,

    /// Request-level failure (bad credentials, unparsable query)
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub statement_id: u32,

    #[serde(default)]
    pub series: Vec<Series>,

    /// Statement-level failure (unknown database, ...)
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// First error reported by the server, request-level before statement-level.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Values of the first column of the first series, in server order.
    ///
    /// This is where `SHOW MEASUREMENTS` puts the measurement names. An empty
    /// database has no series at all.
    pub fn first_column(&self) -> Vec<String> {
        self.results
            .first()
            .and_then(|r| r.series.first())
            .map(|s| {
                s.values
                    .iter()
                    .filter_map(|row| row.first())
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
