//! Image reference helpers.

/// Repository part of an image reference, without tag or digest.
///
/// Handles registries with ports: `localhost:5000/app:1` → `localhost:5000/app`.
pub fn repository(reference: &str) -> &str {
    let without_digest = match reference.find('@') {
        Some(at) => &reference[..at],
        None => reference,
    };
    let last_slash = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
    match without_digest[last_slash..].find(':') {
        Some(colon) => &without_digest[..last_slash + colon],
        None => without_digest,
    }
}

/// Split a reference into `(repository, tag)` for a registry pull.
///
/// Untagged references pull `latest`; digest references are passed whole
/// with an empty tag.
pub fn split_for_pull(reference: &str) -> (String, String) {
    if reference.contains('@') {
        return (reference.to_string(), String::new());
    }
    let repo = repository(reference);
    let tag = reference
        .get(repo.len()..)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|t| !t.is_empty())
        .unwrap_or("latest");
    (repo.to_string(), tag.to_string())
}
