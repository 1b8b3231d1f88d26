//! InfluxQL statement builders.

use crate::watermark::Watermark;

pub const SHOW_MEASUREMENTS: &str = "SHOW MEASUREMENTS";

/// `SELECT * FROM "<measurement>" WHERE time > <watermark>s`
///
/// The watermark is in seconds, so the literal carries an explicit `s` unit;
/// a bare integer would be read as nanoseconds.
pub fn select_since(measurement: &str, since: Watermark) -> String {
    format!(
        "SELECT * FROM {} WHERE time > {}s",
        quote_identifier(measurement),
        since
    )
}

/// Double-quote an identifier, escaping backslashes and quotes.
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
