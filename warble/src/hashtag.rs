/// Returns the tags mentioned in `text`, in first-seen order.
///
/// A tag starts after a `#` and runs to the next whitespace or the end of the
/// text. Bare `#` characters are ignored and repeated tags are reported once.
pub fn hashtags(text: &str) -> Vec<&str> {
    let mut tags: Vec<&str> = Vec::new();
    for (start, _) in text.match_indices('#') {
        let rest = &text[start + 1..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let tag = &rest[..end];
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
