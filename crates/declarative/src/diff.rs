//! Content diffs for `--diff` output

use similar::TextDiff;

/// Unified diff between the current and the new content of `path`.
///
/// Returns `None` when the content is identical. A missing file diffs
/// against empty content; binary content is summarized instead of diffed.
pub fn unified_diff(path: &str, current: Option<&[u8]>, new: &[u8]) -> Option<String> {
    let old = current.unwrap_or_default();
    if old == new {
        return None;
    }

    let (Ok(old_text), Ok(new_text)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        return Some(format!(
            "Binary content of {path} differs ({} -> {} bytes)\n",
            old.len(),
            new.len()
        ));
    };

    let old_label = if current.is_some() {
        format!("a{path}")
    } else {
        "/dev/null".to_string()
    };
    let diff = TextDiff::from_lines(old_text, new_text);
    Some(
        diff.unified_diff()
            .context_radius(3)
            .header(&old_label, &format!("b{path}"))
            .to_string(),
    )
}
