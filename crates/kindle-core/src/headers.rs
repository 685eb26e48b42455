//! Header flag parsing.

use tracing::warn;

/// Ordered `(name, value)` pairs. Duplicates are allowed and kept in order.
pub type Headers = Vec<(String, String)>;

/// Convert `Name: value` flags into header pairs.
///
/// The split happens on the first `:` only, so values may contain colons.
/// A flag without a separator is kept with an empty value.
pub fn parse_headers<S: AsRef<str>>(flags: &[S]) -> Headers {
    flags
        .iter()
        .map(|flag| {
            let flag = flag.as_ref();
            match flag.split_once(':') {
                Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
                None => {
                    warn!(header = %flag, "cannot find ':' separator in supplied header");
                    (flag.trim().to_string(), String::new())
                }
            }
        })
        .collect()
}
