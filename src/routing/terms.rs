//! Word-bounded term matching shared by intent classification,
//! agent scoring and company detection.

/// Lowercases and trims a query for matching.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Returns true when `term` occurs in `haystack` on word boundaries.
///
/// Both inputs must already be lowercase. A trailing plural `s` on the
/// matched word is tolerated, so `sop` matches `sops` but not `sopranos`.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return false;
    }

    for (start, _) in haystack.match_indices(term) {
        let end = start + term.len();

        let bounded_before = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        if !bounded_before {
            continue;
        }

        let mut rest = haystack[end..].chars();
        let bounded_after = match rest.next() {
            None => true,
            Some('s') => rest.next().map_or(true, |c| !c.is_alphanumeric()),
            Some(c) => !c.is_alphanumeric(),
        };
        if bounded_after {
            return true;
        }
    }

    false
}

/// Returns the distinct terms of `candidates` found in `haystack`,
/// in candidate order.
pub fn matched_terms<'a, I>(haystack: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut found: Vec<String> = Vec::new();
    for candidate in candidates {
        let lowered = candidate.to_lowercase();
        if !found.contains(&lowered) && contains_term(haystack, &lowered) {
            found.push(lowered);
        }
    }
    found
}
