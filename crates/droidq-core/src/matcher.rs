//! Attribute pattern matching.
//!
//! A condition pattern is one of:
//!
//! - `*` alone: the attribute merely has to be present and non-empty.
//! - `a|b|c`: alternation, any alternative may match.
//! - a glob using `*` (any run of characters) and `?` (exactly one character),
//!   anchored at both ends.
//! - anything else: exact equality.
//!
//! All comparisons are case-insensitive.

/// Pattern that only checks for presence of a value.
pub const EXISTS: &str = "*";

/// Separator between alternatives in a pattern.
pub const ALTERNATION: char = '|';

/// Returns true if the pattern contains glob wildcard characters (`*` or `?`).
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Compares a single (non-alternated) pattern against a value.
///
/// Patterns containing `*` or `?` must match the whole value. Patterns without
/// wildcards are compared for equality. Both ignore case.
///
/// ```
/// use droidq_core::matcher::compare_string;
///
/// assert!(compare_string("Button", "button"));
/// assert!(compare_string("btn*", "btnOk"));
/// assert!(!compare_string("btn*", "xbtnOk"));
/// ```
pub fn compare_string(pattern: &str, value: &str) -> bool {
    if !has_wildcard(pattern) {
        return pattern.chars().count() == value.chars().count()
            && pattern.chars().zip(value.chars()).all(|(p, v)| chars_match(p, v));
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    glob_match(&pattern, &value)
}

/// Checks a condition pattern against an attribute value.
///
/// `haystack` is `None` when the attribute is missing. An empty value is
/// treated the same as a missing one for the `*` existence pattern.
pub fn attribute_matches(needle: &str, haystack: Option<&str>) -> bool {
    let Some(value) = haystack else {
        return false;
    };

    if needle == EXISTS {
        return !value.is_empty();
    }

    if needle.contains(ALTERNATION) {
        return needle
            .split(ALTERNATION)
            .any(|alternative| compare_string(alternative, value));
    }

    compare_string(needle, value)
}

/// Case-insensitive comparison of single characters.
///
/// Folding happens per character, so a character whose lowercase form is
/// longer (such as `İ`) still occupies exactly one position in the match.
fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Anchored glob match with single-star backtracking.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || chars_match(c, text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    resume = Some((star, t));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_is_case_insensitive() {
        assert!(compare_string("Button", "button"));
        assert!(compare_string("OK", "ok"));
        assert!(!compare_string("Button", "Buttons"));
    }

    #[test]
    fn test_star_is_anchored() {
        assert!(compare_string("btn*", "btnOk"));
        assert!(compare_string("BTN*", "btnOk"));
        assert!(!compare_string("btn*", "xbtnOk"));
        assert!(compare_string("*Ok", "btnOk"));
        assert!(!compare_string("*Ok", "btnOkay"));
        assert!(compare_string("*tn*", "btnOk"));
    }

    #[test]
    fn test_star_matches_empty_run() {
        assert!(compare_string("btn*", "btn"));
        assert!(compare_string("a*b", "ab"));
        assert!(compare_string("*", ""));
    }

    #[test]
    fn test_question_mark_matches_exactly_one() {
        assert!(compare_string("b?t", "bat"));
        assert!(!compare_string("b?t", "bannt"));
        assert!(!compare_string("b?t", "bt"));
    }

    #[test]
    fn test_non_ascii_case_folding() {
        assert!(compare_string("?", "İ"));
        assert!(compare_string("a?c", "aİc"));
        assert!(!compare_string("a?c", "aİİc"));
        assert!(compare_string("ÄPFEL", "äpfel"));
        assert!(compare_string("?pfel", "Äpfel"));
        assert!(compare_string("*ß", "STRAß"));
        assert!(!compare_string("İ", "i"));
    }

    #[test]
    fn test_backtracking_across_stars() {
        assert!(compare_string("*a*b", "xaxxab"));
        assert!(compare_string("a*a*a", "aaa"));
        assert!(!compare_string("a*a*a", "aa"));
        assert!(compare_string("**", "anything"));
        assert!(!compare_string("*x", "abc"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(compare_string("com.example:id/*", "com.example:id/login"));
        assert!(!compare_string("com.example:id/*", "comXexample:id/login"));
        assert!(compare_string("(a)+*", "(a)+b"));
    }

    #[test]
    fn test_alternation() {
        assert!(attribute_matches("A|B", Some("B")));
        assert!(attribute_matches("A|B", Some("a")));
        assert!(!attribute_matches("A|B", Some("C")));
    }

    #[test]
    fn test_alternation_with_globs() {
        let pattern = "*.Button|*.ImageButton";
        assert!(attribute_matches(pattern, Some("android.widget.Button")));
        assert!(attribute_matches(pattern, Some("android.widget.ImageButton")));
        assert!(!attribute_matches(pattern, Some("android.widget.TextView")));
    }

    #[test]
    fn test_existence() {
        assert!(attribute_matches("*", Some("anything")));
        assert!(!attribute_matches("*", Some("")));
        assert!(!attribute_matches("*", None));
    }

    #[test]
    fn test_missing_value_never_matches() {
        assert!(!attribute_matches("OK", None));
        assert!(!attribute_matches("A|B", None));
        assert!(!attribute_matches("a*", None));
    }

    #[test]
    fn test_plain_pattern_delegates_to_compare() {
        assert!(attribute_matches("Login", Some("LOGIN")));
        assert!(attribute_matches("Log*", Some("Login")));
        assert!(!attribute_matches("Login", Some("Logout")));
    }
}
