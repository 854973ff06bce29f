//! Resource-name normalization for server-returned hrefs.
//!
//! Exchange hands back hrefs that are valid inside WebDAV XML but contain
//! characters a URL parser rejects or rewrites.  Before such an href is
//! embedded in a new request line or request body, the characters in
//! [`UNSAFE_CHARS`] are replaced by their percent-encoded form.  Nothing
//! else is touched: characters that are already legal in a path (including
//! `%` itself) pass through unchanged.

/// Characters escaped by [`normalize_resource_name`], paired with their
/// percent-encoded replacements.
pub const UNSAFE_CHARS: [(char, &str); 7] = [
    ('[', "%5B"),
    (']', "%5D"),
    ('|', "%7C"),
    ('^', "%5E"),
    ('`', "%60"),
    ('{', "%7B"),
    ('}', "%7D"),
];

/// Escape the URL-unsafe characters of a server-supplied resource path.
///
/// The output contains none of the unsafe characters, so applying the
/// function twice yields the same result as applying it once.
pub fn normalize_resource_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match UNSAFE_CHARS.iter().find(|(unsafe_ch, _)| *unsafe_ch == ch) {
            Some((_, encoded)) => out.push_str(encoded),
            None => out.push(ch),
        }
    }
    out
}
