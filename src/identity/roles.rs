use std::collections::HashSet;

/// Set difference between a stored role set and its replacement.
///
/// Returns `(to_delete, to_add)`: roles present in `old` but not `new`, and roles
/// present in `new` but not `old`. Each list follows the order of its source slice
/// and carries no duplicates, so applying it twice is harmless.
pub fn diff_roles(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let to_delete = old
        .iter()
        .filter(|r| !new_set.contains(r.as_str()) && seen.insert(r.as_str()))
        .cloned()
        .collect();

    seen.clear();
    let to_add = new
        .iter()
        .filter(|r| !old_set.contains(r.as_str()) && seen.insert(r.as_str()))
        .cloned()
        .collect();

    (to_delete, to_add)
}
