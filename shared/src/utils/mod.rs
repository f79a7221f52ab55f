//! Utility functions and helpers

/// Parse a counter list as written in `ROCSCOPE_COUNTERS` or on the command line.
///
/// Accepts an optional `pmc:` prefix, optional surrounding angle brackets, and
/// names separated by whitespace and/or commas. Duplicates are dropped; the first
/// occurrence keeps its position.
pub fn parse_counter_list(line: &str) -> Vec<String> {
    let mut s = line.trim();
    if let Some(rest) = s.strip_prefix("pmc:") {
        s = rest.trim();
    }
    if let Some(inner) = s.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
        s = inner;
    }

    let mut out: Vec<String> = Vec::new();
    for name in s.split(|c: char| c == ',' || c.is_whitespace()) {
        if name.is_empty() || out.iter().any(|n| n == name) {
            continue;
        }
        out.push(name.to_string());
    }
    out
}
