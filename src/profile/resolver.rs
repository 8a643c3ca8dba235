use regex::Regex;

/// Finds the target sub-unit a profiler-reported name refers to.
///
/// Profilers report demangled or truncated identifiers while the target knows its functions by
/// their full names, so a reported name matches any candidate that contains it. A verbatim
/// containment scan runs first; only if it finds nothing the reported name is used as a
/// pattern, `.*name.*`.
///
/// # Arguments
/// * `reported` - The name reported by the profiler.
/// * `candidates` - The known sub-unit names, scanned in iteration order.
///
/// # Returns
/// The first matching candidate, `None` if nothing matches.
pub fn resolve<'a, I>(reported: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    if reported.is_empty() {
        return None;
    }

    if let Some(found) = candidates.clone().into_iter().find(|c| c.contains(reported)) {
        return Some(found);
    }

    // Not every reported name is a valid pattern, those simply don't match.
    let wildcard = Regex::new(&format!("^.*(?:{reported}).*$")).ok()?;
    candidates.into_iter().find(|c| wildcard.is_match(c))
}
