use crate::model::BackupEntry;
use serde::{Deserialize, Serialize};

const BYTES_PER_MB: u64 = 1_000_000;

/// Count and size bounds for the backups area. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_count: Option<u32>,
    pub max_size_mb: Option<u64>,
}

impl RetentionPolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_size_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB))
    }

    pub fn is_bounded(&self) -> bool {
        self.max_count.is_some() || self.max_size_mb.is_some()
    }

    pub fn is_satisfied(&self, count: usize, total_bytes: u64) -> bool {
        let count_ok = self
            .max_count
            .map_or(true, |max| count as u64 <= u64::from(max));
        let size_ok = self.max_bytes().map_or(true, |max| total_bytes <= max);
        count_ok && size_ok
    }
}

/// Names to remove, oldest first, so that what remains satisfies `policy`.
///
/// Entries are considered oldest-first by `(created_at, name)` and removed one
/// at a time until both bounds hold.
pub fn plan_prune(entries: &[BackupEntry], policy: &RetentionPolicy) -> Vec<String> {
    if !policy.is_bounded() {
        return Vec::new();
    }

    let mut oldest_first: Vec<&BackupEntry> = entries.iter().collect();
    oldest_first.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));

    let mut count = oldest_first.len();
    let mut total: u64 = oldest_first.iter().map(|e| e.size_bytes).sum();
    let mut doomed = Vec::new();

    for entry in oldest_first {
        if policy.is_satisfied(count, total) {
            break;
        }
        doomed.push(entry.name.clone());
        count -= 1;
        total = total.saturating_sub(entry.size_bytes);
    }
    doomed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use time::{Duration, OffsetDateTime};

    fn entry(idx: i64, size_bytes: u64) -> BackupEntry {
        BackupEntry {
            name: format!("b{idx:02}"),
            path: PathBuf::from(format!("/backups/b{idx:02}")),
            size_bytes,
            created_at: OffsetDateTime::UNIX_EPOCH + Duration::minutes(idx),
        }
    }

    fn remaining<'a>(entries: &'a [BackupEntry], doomed: &[String]) -> Vec<&'a BackupEntry> {
        entries
            .iter()
            .filter(|e| !doomed.contains(&e.name))
            .collect()
    }

    #[test]
    fn unlimited_policy_prunes_nothing() {
        let entries: Vec<_> = (0..10).map(|i| entry(i, 5_000_000)).collect();
        assert!(plan_prune(&entries, &RetentionPolicy::unlimited()).is_empty());
    }

    #[test]
    fn count_bound_removes_oldest() {
        // Deliberately unsorted input.
        let entries = vec![entry(3, 1), entry(1, 1), entry(2, 1)];
        let policy = RetentionPolicy {
            max_count: Some(2),
            max_size_mb: None,
        };
        assert_eq!(plan_prune(&entries, &policy), vec!["b01".to_string()]);
    }

    #[test]
    fn size_bound_uses_decimal_megabytes() {
        let entries = vec![entry(1, 600_000), entry(2, 400_000), entry(3, 1)];
        let policy = RetentionPolicy {
            max_count: None,
            max_size_mb: Some(1),
        };
        // 1_000_001 bytes total, one over the bound.
        assert_eq!(plan_prune(&entries, &policy), vec!["b01".to_string()]);
    }

    #[test]
    fn zero_bounds_remove_everything() {
        let entries = vec![entry(1, 10), entry(2, 10)];
        let policy = RetentionPolicy {
            max_count: Some(0),
            max_size_mb: None,
        };
        assert_eq!(plan_prune(&entries, &policy).len(), 2);
    }

    #[test]
    fn every_policy_leaves_a_satisfying_newest_suffix() {
        let sizes = [700_000u64, 0, 1_500_000, 250_000, 999_999, 1, 3_000_000];
        let entries: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| entry(i as i64, *size))
            .collect();

        for max_count in [None, Some(0), Some(1), Some(3), Some(7), Some(20)] {
            for max_size_mb in [None, Some(0), Some(1), Some(2), Some(5), Some(100)] {
                let policy = RetentionPolicy {
                    max_count,
                    max_size_mb,
                };
                let doomed = plan_prune(&entries, &policy);
                let kept = remaining(&entries, &doomed);
                let total: u64 = kept.iter().map(|e| e.size_bytes).sum();
                assert!(policy.is_satisfied(kept.len(), total), "{policy:?}");

                // Pruned entries are exactly the oldest ones.
                let expected: Vec<String> =
                    entries.iter().take(doomed.len()).map(|e| e.name.clone()).collect();
                assert_eq!(doomed, expected, "{policy:?}");

                // Stopped as soon as the bounds held.
                if let Some(last) = doomed.last() {
                    let mut one_less = doomed.clone();
                    one_less.retain(|n| n != last);
                    let kept = remaining(&entries, &one_less);
                    let total: u64 = kept.iter().map(|e| e.size_bytes).sum();
                    assert!(!policy.is_satisfied(kept.len(), total), "{policy:?}");
                }
            }
        }
    }
}
