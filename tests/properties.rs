use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use stagehand::git::parser::{parse_status, write_status};
use stagehand::model::record::RecordSet;
use stagehand::{ChangeRecord, ChangeSetDiff, ChangeSetModel, FileStatus, RepoPath, StatusFilter};

/// Any bytes except NUL and newline, so clipped output stays `-z` framed
fn raw_path() -> impl Strategy<Value = Vec<u8>> {
    vec(prop_oneof![1u8..=9, 11u8..=255], 1..24)
}

fn status_pair() -> impl Strategy<Value = (FileStatus, FileStatus)> {
    let index = prop_oneof![
        Just(FileStatus::Unmodified),
        Just(FileStatus::Added),
        Just(FileStatus::Modified),
        Just(FileStatus::Deleted),
        Just(FileStatus::Renamed),
        Just(FileStatus::Copied),
    ];
    let worktree = prop_oneof![
        Just(FileStatus::Unmodified),
        Just(FileStatus::Modified),
        Just(FileStatus::Deleted),
    ];

    prop_oneof![
        8 => (index, worktree).prop_filter("not a real status", |pair| !matches!(
            pair,
            (FileStatus::Unmodified, FileStatus::Unmodified) | (FileStatus::Deleted, FileStatus::Deleted)
        )),
        1 => Just((FileStatus::Untracked, FileStatus::Untracked)),
        1 => Just((FileStatus::Conflicted, FileStatus::Conflicted)),
    ]
}

fn record_set() -> impl Strategy<Value = RecordSet> {
    btree_map(raw_path(), (status_pair(), raw_path()), 0..16).prop_map(|entries| {
        let records = entries
            .into_iter()
            .map(|(path, ((index, worktree), origin))| {
                let record = ChangeRecord::new(RepoPath::from_bytes(path), index, worktree);
                if index.has_origin() {
                    record.with_previous_path(RepoPath::from_bytes(origin))
                } else {
                    record
                }
            })
            .collect();
        RecordSet::from_records(records).unwrap()
    })
}

proptest! {
    #[test]
    fn test_raw_paths_survive_status_output(records in record_set()) {
        let parsed = parse_status(&write_status(&records)).unwrap();
        prop_assert_eq!(parsed, records);
    }

    #[test]
    fn test_truncating_output_never_yields_partial_set(
        records in record_set(),
        cut in 1usize..64
    ) {
        let output = write_status(&records);
        prop_assume!(cut < output.len());

        let clipped = &output[..output.len() - cut];
        // a cut landing exactly on a record boundary is valid shorter output
        if let Ok(parsed) = parse_status(clipped) {
            prop_assert!(parsed.len() < records.len());
            prop_assert!(parsed.iter().all(|r| records.iter().any(|o| o == r)));
        }
    }

    #[test]
    fn test_generation_strictly_increases(batches in vec(record_set(), 1..8)) {
        let mut model = ChangeSetModel::new();
        let mut last = model.generation();

        for batch in batches {
            model.replace(batch);
            prop_assert!(model.generation() > last);
            last = model.generation();
        }
    }

    #[test]
    fn test_diff_accounts_for_every_path(old in record_set(), new in record_set()) {
        let diff = ChangeSetDiff::between(old.as_slice(), new.as_slice());

        for record in new.iter() {
            let was = old.iter().find(|o| o.path == record.path);
            match was {
                None => prop_assert!(diff.added.contains(&record.path)),
                Some(o) if !o.same_status(record) => {
                    prop_assert!(diff.status_changed.contains(&record.path))
                }
                Some(_) => {
                    prop_assert!(!diff.added.contains(&record.path));
                    prop_assert!(!diff.status_changed.contains(&record.path));
                }
            }
        }
        for record in old.iter() {
            let still_there = new.iter().any(|n| n.path == record.path);
            prop_assert_eq!(diff.removed.contains(&record.path), !still_there);
        }
    }

    #[test]
    fn test_query_stays_pinned(first in record_set(), second in record_set()) {
        let mut model = ChangeSetModel::new();
        model.replace(first.clone());
        let query = model.query(StatusFilter::All);

        model.replace(second);

        let seen: Vec<&ChangeRecord> = query.iter().collect();
        let expected: Vec<&ChangeRecord> = first.iter().collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(query.generation(), 1);
    }
}
