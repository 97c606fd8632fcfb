//! Message filter used to rewrite commit trailers

/// Quote `s` for a POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build the `--msg-filter` script for `git filter-branch`.
///
/// Existing `trailer_name` lines are dropped unless `keep_trailers`; each
/// value is then appended as a trailer, skipping exact duplicates.
pub fn trailer_filter_script(trailer_name: &str, values: &[String], keep_trailers: bool) -> String {
    let strip = if keep_trailers {
        "cat".to_string()
    } else {
        format!("sed -e {}", shell_quote(&format!("/^{trailer_name}:/d")))
    };

    if values.is_empty() {
        return strip;
    }

    let trailers: Vec<String> = values
        .iter()
        .map(|v| format!("--trailer {}", shell_quote(&format!("{trailer_name}: {v}"))))
        .collect();
    format!(
        "{strip} | git interpret-trailers --if-exists addIfDifferent {}",
        trailers.join(" ")
    )
}
