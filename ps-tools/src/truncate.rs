//! Character-budget truncation with a deterministic trailing marker.

/// Smallest budget that always leaves room for the marker, whatever the sizes involved.
pub const MIN_CHAR_BUDGET: usize = 100;

/// The marker appended when text is cut at `kept` characters.
pub fn truncation_marker(kept: usize, original: usize) -> String {
    format!("...truncated at {kept} characters (original size {original})")
}

/// Cap `text` at `max_chars` characters, marker included.
///
/// Returns the (possibly shortened) text and whether anything was cut.
/// Counts `char`s, never splits a code point. Budgets below
/// [`MIN_CHAR_BUDGET`] may be exceeded by the marker alone.
pub fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    let original = text.chars().count();
    if original <= max_chars {
        return (text.to_string(), false);
    }

    // The marker for `max_chars` is at least as long as the final one.
    let reserve = truncation_marker(max_chars, original).chars().count() + 2;
    let kept = max_chars.saturating_sub(reserve);
    let head: String = text.chars().take(kept).collect();
    let mut out = format!("{head}\n\n{}", truncation_marker(kept, original));
    if out.chars().count() > max_chars {
        // Budget smaller than the marker itself: the marker alone still says what happened.
        out = truncation_marker(0, original);
    }
    (out, true)
}

/// Cap `prefix` followed by `body` at `max_chars` characters in total.
///
/// The body is cut first so the prefix survives; a prefix that leaves no
/// room for the marker is cut along with it.
pub fn truncate_with_prefix(prefix: &str, body: &str, max_chars: usize) -> (String, bool) {
    let budget = max_chars.saturating_sub(prefix.chars().count());
    let (body, cut) = truncate_text(body, budget);
    let out = format!("{prefix}{body}");
    if out.chars().count() <= max_chars {
        return (out, cut);
    }
    let (out, _) = truncate_text(&out, max_chars);
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let (out, truncated) = truncate_text("diff --git a/x b/x", 100);
        assert_eq!(out, "diff --git a/x b/x");
        assert!(!truncated);
    }

    #[test]
    fn long_text_fits_budget_and_ends_with_marker() {
        let text = "x".repeat(5_000);
        let (out, truncated) = truncate_text(&text, 1_000);
        assert!(truncated);
        assert!(out.chars().count() <= 1_000);
        let kept = out.chars().take_while(|c| *c == 'x').count();
        assert!(out.ends_with(&truncation_marker(kept, 5_000)));
        assert!(out.ends_with("(original size 5000)"));
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let text = "é".repeat(300);
        let (out, truncated) = truncate_text(&text, 120);
        assert!(truncated);
        assert!(out.chars().count() <= 120);
        assert!(out.starts_with('é'));
    }

    #[test]
    fn prefix_is_kept_and_counted_against_the_budget() {
        let prefix = "--- src/pool.go (modified)\n";
        let (out, truncated) = truncate_with_prefix(prefix, &"+x\n".repeat(400), 300);
        assert!(truncated);
        assert!(out.starts_with(prefix));
        assert!(out.chars().count() <= 300);
        assert!(out.ends_with("(original size 1200)"));
    }

    #[test]
    fn oversized_prefix_is_cut_too() {
        let prefix = "p".repeat(250);
        let (out, truncated) = truncate_with_prefix(&prefix, "body", MIN_CHAR_BUDGET);
        assert!(truncated);
        assert!(out.chars().count() <= MIN_CHAR_BUDGET);
        assert!(out.starts_with('p'));
    }

    #[test]
    fn short_prefix_and_body_are_untouched() {
        let (out, truncated) = truncate_with_prefix("=== a.rs @ HEAD ===\n", "fn a() {}", 200);
        assert_eq!(out, "=== a.rs @ HEAD ===\nfn a() {}");
        assert!(!truncated);
    }

    #[test]
    fn marker_fits_the_minimum_budget() {
        let (out, _) = truncate_text(&"z".repeat(1_000_000), MIN_CHAR_BUDGET);
        assert!(out.chars().count() <= MIN_CHAR_BUDGET);
    }

    #[test]
    fn tiny_budget_still_reports_original_size() {
        let (out, truncated) = truncate_text(&"y".repeat(50), 10);
        assert!(truncated);
        assert_eq!(out, truncation_marker(0, 50));
    }
}
