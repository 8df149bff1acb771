//! Pure translation of a method name's options into a query string.
//!
//! This is the "URL builder" leaf described as ~5% of the implementation
//! budget: it never touches the network and never holds state across calls.

use std::fmt::Write as _;

use crate::geo::BoundingBox;

/// A single tagged option passed to a streaming method (`filter`, `sample`, ...).
///
/// Recognized tags are rendered into the query string by [`build`]; anything
/// else is returned untouched as a residual option for the transport layer
/// to interpret (e.g. `timeout`, `debug`, or future parameters this crate
/// doesn't know about yet).
#[derive(Clone, Debug, PartialEq)]
pub enum MethodOption {
    /// `count=N`. Twitter documents the valid range as roughly
    /// -150000..=150000; this builder does not enforce that range itself.
    Count(i32),
    /// `delimited=length`.
    Delimited(u64),
    /// `follow=u1,u2,...` — user IDs, rendered as decimal integers.
    Follow(Vec<u64>),
    /// `track=s1,s2,...` — phrases, rendered verbatim with no escaping.
    Track(Vec<String>),
    /// `locations=a,b,c,d,...` — bounding boxes, each coordinate rendered as
    /// a 5-significant-digit general float.
    Locations(Vec<BoundingBox>),
    /// Anything this builder doesn't recognize. Forwarded to the transport
    /// unchanged rather than rendered into the query string.
    Other(String, String),
}

/// Builds a query-string URL for `base` from `options`, returning the URL
/// together with the options this builder didn't recognize (in their
/// original order), which the caller forwards to the transport layer.
///
/// No percent-encoding is applied to any rendered value. This is an
/// intentional, inherited limitation: callers that pass non-ASCII `track`
/// terms will produce a malformed URL. `build` is otherwise pure: calling it
/// twice with the same arguments always yields the same result.
pub fn build(base: &str, options: &[MethodOption]) -> (String, Vec<MethodOption>) {
    let mut url = String::from(base);
    let mut residual = Vec::new();
    let mut first = true;

    let mut push = |url: &mut String, key: &str, value: &str| {
        url.push(if first { '?' } else { '&' });
        first = false;
        url.push_str(key);
        url.push('=');
        url.push_str(value);
    };

    for option in options {
        match option {
            MethodOption::Count(n) => push(&mut url, "count", &n.to_string()),
            MethodOption::Delimited(length) => push(&mut url, "delimited", &length.to_string()),
            MethodOption::Follow(ids) => {
                let joined = join(ids.iter().map(u64::to_string));
                push(&mut url, "follow", &joined);
            }
            MethodOption::Track(terms) => {
                let joined = join(terms.iter().cloned());
                push(&mut url, "track", &joined);
            }
            MethodOption::Locations(boxes) => {
                let joined = join(
                    boxes
                        .iter()
                        .flat_map(|bbox| bbox.coordinates())
                        .map(|coord| format_significant(coord, 5)),
                );
                push(&mut url, "locations", &joined);
            }
            MethodOption::Other(key, value) => residual.push(MethodOption::Other(
                key.clone(),
                value.clone(),
            )),
        }
    }

    (url, residual)
}

fn join(items: impl Iterator<Item = String>) -> String {
    let mut out = String::new();
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&item);
    }
    out
}

/// Renders `value` with `digits` significant decimal digits, trimming any
/// trailing zeros (and a trailing decimal point) left over from padding.
fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;

    let mut rendered = String::new();
    write!(rendered, "{:.*}", decimals, value).expect("writing to a String never fails");

    if rendered.contains('.') {
        while rendered.ends_with('0') {
            rendered.pop();
        }
        if rendered.ends_with('.') {
            rendered.pop();
        }
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recognized_options_in_order() {
        let (url, residual) = build(
            "https://stream.twitter.com/1/statuses/filter.json",
            &[
                MethodOption::Count(100),
                MethodOption::Follow(vec![1, 2, 3]),
                MethodOption::Track(vec!["rust".to_owned(), "twitter api".to_owned()]),
            ],
        );
        assert_eq!(
            url,
            "https://stream.twitter.com/1/statuses/filter.json?count=100&follow=1,2,3&track=rust,twitter api"
        );
        assert!(residual.is_empty());
    }

    #[test]
    fn unrecognized_options_are_returned_as_residual() {
        let (url, residual) = build(
            "https://stream.twitter.com/1/statuses/sample.json",
            &[
                MethodOption::Other("timeout".to_owned(), "30".to_owned()),
                MethodOption::Count(5),
            ],
        );
        assert_eq!(url, "https://stream.twitter.com/1/statuses/sample.json?count=5");
        assert_eq!(
            residual,
            vec![MethodOption::Other("timeout".to_owned(), "30".to_owned())]
        );
    }

    #[test]
    fn build_is_idempotent() {
        let options = [MethodOption::Locations(vec![BoundingBox::new(
            -122.75, 36.8, -121.75, 37.8,
        )])];
        let first = build("https://example.com", &options);
        let second = build("https://example.com", &options);
        assert_eq!(first, second);
    }

    #[test]
    fn locations_render_as_five_significant_digits() {
        let (url, _) = build(
            "https://example.com",
            &[MethodOption::Locations(vec![BoundingBox::new(
                -122.75, 36.8, -121.75, 37.8,
            )])],
        );
        assert_eq!(url, "https://example.com?locations=-122.75,36.8,-121.75,37.8");
    }

    #[test]
    fn no_options_produces_bare_base_url() {
        let (url, residual) = build("https://example.com", &[]);
        assert_eq!(url, "https://example.com");
        assert!(residual.is_empty());
    }
}
