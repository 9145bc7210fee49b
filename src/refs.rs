//! Pure functions for branch discovery and ref-push ordering (spec.md §4.7).
use crate::types::BranchName;
use std::collections::HashMap;
use std::str::FromStr;

/// Ref priority for push ordering, highest first: `heads` (5), `tags` (4),
/// `changes` (3), everything else (0). The ref class is the path segment
/// immediately after `refs/`.
pub fn rank_ref_class(ref_name: &str) -> u8 {
    let class = ref_name
        .strip_prefix("refs/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("");
    match class {
        "heads" => 5,
        "tags" => 4,
        "changes" => 3,
        _ => 0,
    }
}

/// Sorts pending ref names by class priority (descending), tie-breaking
/// lexicographically ascending (spec.md §4.3 step 3).
pub fn sort_pending_refs(mut refs: Vec<String>) -> Vec<String> {
    refs.sort_by(|a, b| {
        rank_ref_class(b)
            .cmp(&rank_ref_class(a))
            .then_with(|| a.cmp(b))
    });
    refs
}

/// Derives the set of branches to process from a remote ref listing
/// (`refName -> hash` under `refs/heads/...`), or an explicit override list
/// if one is configured.
///
/// "master" is always placed first; branches beginning with
/// "release-branch.r" are excluded (pre-modern release lines); alias refs
/// (containing "->") and blank names are excluded.
pub fn list_branches(
    remote_heads: &HashMap<String, String>,
    explicit_override: Option<&[String]>,
) -> Vec<BranchName> {
    if let Some(explicit) = explicit_override {
        return explicit
            .iter()
            .filter_map(|name| BranchName::from_str(name).ok())
            .collect();
    }

    let mut names: Vec<BranchName> = remote_heads
        .keys()
        .filter_map(|ref_name| ref_name.strip_prefix("refs/heads/"))
        .filter(|name| !name.is_empty())
        .filter(|name| !name.contains("->"))
        .filter(|name| !name.starts_with("release-branch.r"))
        .filter_map(|name| BranchName::from_str(name).ok())
        .collect();

    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    names.dedup();

    if let Some(pos) = names.iter().position(|b| b.is_master()) {
        let master = names.remove(pos);
        names.insert(0, master);
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_heads_above_tags_above_changes_above_other() {
        assert!(rank_ref_class("refs/heads/master") > rank_ref_class("refs/tags/v1"));
        assert!(rank_ref_class("refs/tags/v1") > rank_ref_class("refs/changes/01"));
        assert!(rank_ref_class("refs/changes/01") > rank_ref_class("refs/notes/commits"));
    }

    #[test]
    fn mirror_push_diff_orders_heads_then_changes_skips_unchanged_tag() {
        // Scenario 4 from spec.md §8: tags/v1 is unchanged and excluded by
        // the caller before this function runs; only heads/master and
        // changes/01 are pending.
        let pending = vec!["refs/changes/01".to_string(), "refs/heads/master".to_string()];
        let sorted = sort_pending_refs(pending);
        assert_eq!(sorted, vec!["refs/heads/master", "refs/changes/01"]);
    }

    #[test]
    fn tie_breaks_lexicographically_within_same_class() {
        let pending = vec![
            "refs/heads/zeta".to_string(),
            "refs/heads/alpha".to_string(),
        ];
        let sorted = sort_pending_refs(pending);
        assert_eq!(sorted, vec!["refs/heads/alpha", "refs/heads/zeta"]);
    }

    #[test]
    fn list_branches_puts_master_first_and_excludes_legacy_release_branches() {
        let mut remote = HashMap::new();
        remote.insert("refs/heads/release-branch.go1.42".to_string(), "a".into());
        remote.insert("refs/heads/master".to_string(), "b".into());
        remote.insert("refs/heads/release-branch.r60".to_string(), "c".into());
        remote.insert("refs/heads/HEAD -> refs/heads/master".to_string(), "b".into());

        let branches = list_branches(&remote, None);
        assert_eq!(branches[0].as_str(), "master");
        assert!(!branches.iter().any(|b| b.as_str().starts_with("release-branch.r6")));
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn explicit_override_is_used_verbatim() {
        let remote = HashMap::new();
        let explicit = vec!["dev".to_string(), "master".to_string()];
        let branches = list_branches(&remote, Some(&explicit));
        assert_eq!(
            branches.iter().map(|b| b.as_str()).collect::<Vec<_>>(),
            vec!["dev", "master"]
        );
    }
}
