//! Lifecycle scenarios against a file-backed store.

#![allow(missing_docs, unused_results)]

use std::path::Path;

use assert_matches::assert_matches;
use intask_core::{ActivityStatus, Conditions, ElementType};
use intask_store::sqlite::row_types::{GroupRow, TaskRow};
use intask_store::{ConnectionConfig, InTask, StoreError, new_file};

const T0: &str = "2019-03-01T09:00:00.000Z";
const T1: &str = "2019-03-01T10:00:00.000Z";

fn open(path: &Path) -> InTask {
    let pool = new_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    let store = InTask::new(pool);
    store.migrate().unwrap();
    store
}

fn setup() -> (tempfile::TempDir, InTask) {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("intask.db"));
    for (id, email) in [(1, "ann@example.com"), (2, "bob@example.com")] {
        store
            .users()
            .get_or_create(&Conditions::for_user(id).with("email", email))
            .unwrap();
    }
    (dir, store)
}

fn as_user(user_id: i64) -> Conditions {
    Conditions::for_user(user_id)
}

fn personal(store: &InTask, user_id: i64) -> String {
    store
        .groups()
        .list(&as_user(user_id).with("like", "personal"))
        .unwrap()[0]
        .id
        .clone()
}

fn top_groups(store: &InTask, user_id: i64) -> Vec<GroupRow> {
    store
        .groups()
        .list(&as_user(user_id).with("parent_id", "0").with("limit", 100))
        .unwrap()
}

fn assert_strictly_increasing(keys: &[(i64, i64)]) {
    for pair in keys.windows(2) {
        let ((p1, q1), (p2, q2)) = (pair[0], pair[1]);
        assert!(p1 * q2 < p2 * q1, "{p1}/{q1} is not below {p2}/{q2}");
    }
}

fn group_keys(rows: &[GroupRow]) -> Vec<(i64, i64)> {
    rows.iter().map(|r| (r.p.unwrap(), r.q.unwrap())).collect()
}

fn task_keys(rows: &[TaskRow]) -> Vec<(i64, i64)> {
    rows.iter().map(|r| (r.p, r.q)).collect()
}

#[test]
fn mixed_placements_keep_keys_monotonic() {
    let (_dir, store) = setup();
    let group = personal(&store, 1);
    let tasks = store.tasks();
    let mut ids = Vec::new();
    for (i, start) in [false, true, false, true, false].into_iter().enumerate() {
        let created = tasks
            .create(
                &as_user(1)
                    .with("group_id", group.as_str())
                    .with("name", format!("t{i}"))
                    .with("is_start", start),
            )
            .unwrap();
        ids.push(created.task.id);
    }
    for (i, id) in ids.iter().enumerate() {
        let reference = &ids[(i + 2) % ids.len()];
        if reference == id {
            continue;
        }
        tasks
            .reorder(
                &as_user(1)
                    .with("id", id.as_str())
                    .with("position", reference.as_str())
                    .with("is_before", i % 2 == 0),
            )
            .unwrap();
    }

    let listed = tasks
        .list(&as_user(1).with("group_id", group.as_str()).with("limit", 100))
        .unwrap();
    assert_eq!(listed.len(), 5);
    assert_strictly_increasing(&task_keys(&listed));
    assert_eq!(store.check().unwrap().duplicate_keys, 0);
}

#[test]
fn renumber_keeps_order_with_even_keys() {
    let (_dir, store) = setup();
    for name in ["a", "b", "c"] {
        store.groups().create(&as_user(1).with("name", name)).unwrap();
    }
    let c = top_groups(&store, 1).pop().unwrap();
    store
        .groups()
        .reorder(&as_user(1).with("id", c.id.as_str()).with("is_before", true))
        .unwrap();
    let before: Vec<String> = top_groups(&store, 1).into_iter().map(|g| g.name).collect();

    store.renumber().unwrap();

    let after = top_groups(&store, 1);
    let names: Vec<String> = after.iter().map(|g| g.name.clone()).collect();
    assert_eq!(names, before);
    assert_eq!(group_keys(&after), vec![(1, 1), (2, 1), (3, 1), (4, 1)]);
}

#[test]
fn visibility_is_stable_between_reads() {
    let (_dir, store) = setup();
    store.groups().create(&as_user(1).with("name", "work")).unwrap();
    let first = store.groups().list(&as_user(1)).unwrap();
    let second = store.groups().list(&as_user(1)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn stranger_gets_permission_denied_for_tasks() {
    let (_dir, store) = setup();
    let group = personal(&store, 1);
    let task = store
        .tasks()
        .create(&as_user(1).with("group_id", group.as_str()).with("name", "a"))
        .unwrap()
        .task;
    let id = task.id.as_str();

    let tasks = store.tasks();
    assert_matches!(
        tasks.update(&as_user(2).with("id", id).with("name", "x")),
        Err(StoreError::PermissionDenied)
    );
    assert_matches!(tasks.reorder(&as_user(2).with("id", id)), Err(StoreError::PermissionDenied));
    assert_matches!(tasks.delete(&as_user(2).with("id", id)), Err(StoreError::PermissionDenied));
    assert!(tasks.list(&as_user(2).with("id", id)).unwrap().is_empty());
}

#[test]
fn starting_b_while_a_runs() {
    let (_dir, store) = setup();
    let group = personal(&store, 1);
    let create = |name: &str| {
        store
            .tasks()
            .create(
                &as_user(1)
                    .with("group_id", group.as_str())
                    .with("name", name)
                    .with("start", T0),
            )
            .unwrap()
            .task
            .id
    };
    let a = create("a");
    let b = create("b");
    let open = |task: &str, at: &str| {
        store
            .activity()
            .create(
                &as_user(1)
                    .with("group_id", group.as_str())
                    .with("task_id", task)
                    .with("type_el", ElementType::ACTIVITY.bits())
                    .with("status", ActivityStatus::Started.code())
                    .with("start", at),
            )
            .unwrap()
    };
    let started_a = open(&a, T0);
    open(&b, T1);

    let rows = store
        .activity()
        .list(&as_user(1).with("task_id", vec![a.clone(), b.clone()]).with("limit", 100))
        .unwrap();
    let a_started = rows.iter().find(|r| r.id == started_a.id).unwrap();
    assert_eq!(a_started.ends.as_deref(), Some(T1));

    let a_open: Vec<_> = rows
        .iter()
        .filter(|r| r.task_id.as_deref() == Some(a.as_str()) && r.ends.is_none())
        .collect();
    assert_eq!(a_open.len(), 1);
    assert_eq!(a_open[0].status, ActivityStatus::Suspended);
    assert_eq!(a_open[0].start, T1);

    let b_open: Vec<_> = rows
        .iter()
        .filter(|r| r.task_id.as_deref() == Some(b.as_str()) && r.ends.is_none())
        .collect();
    assert_eq!(b_open.len(), 1);
    assert_eq!(b_open[0].status, ActivityStatus::Started);
    assert_eq!(b_open[0].start, T1);
    assert_eq!(rows[0].id, b_open[0].id);

    let statuses: Vec<Option<ActivityStatus>> = store
        .tasks()
        .list(&as_user(1).with("id", vec![a, b]).with("limit", 10))
        .unwrap()
        .iter()
        .map(|t| t.status)
        .collect();
    assert_eq!(statuses, vec![Some(ActivityStatus::Suspended), Some(ActivityStatus::Started)]);
}

#[test]
fn deleting_task_with_child_changes_nothing() {
    let (_dir, store) = setup();
    let group = personal(&store, 1);
    let parent = store
        .tasks()
        .create(&as_user(1).with("group_id", group.as_str()).with("name", "parent"))
        .unwrap();
    store
        .tasks()
        .create(
            &as_user(1)
                .with("group_id", group.as_str())
                .with("parent_id", parent.task.id.as_str())
                .with("name", "child"),
        )
        .unwrap();

    let err = store
        .tasks()
        .delete(&as_user(1).with("id", parent.task.id.as_str()))
        .unwrap_err();
    assert_eq!(err.name(), "HasElements");
    assert_eq!(err.status(), 400);

    let left = store
        .activity()
        .list(&as_user(1).with("task_id", parent.task.id.as_str()).with("limit", 10))
        .unwrap();
    assert_eq!(left.len(), 1);
    let tasks = store
        .tasks()
        .list(&as_user(1).with("group_id", group.as_str()).with("limit", 10))
        .unwrap();
    assert_eq!(tasks.len(), 2);
}

#[test]
fn reparent_into_group_without_create_rights() {
    let (_dir, store) = setup();
    let mine = personal(&store, 1);
    let theirs = personal(&store, 2);
    let task = store
        .tasks()
        .create(&as_user(1).with("group_id", mine.as_str()).with("name", "a"))
        .unwrap()
        .task;

    let err = store
        .tasks()
        .reorder(&as_user(1).with("id", task.id.as_str()).with("group_id", theirs.as_str()))
        .unwrap_err();
    assert_matches!(err, StoreError::PermissionDenied);

    let after = store
        .tasks()
        .list(&as_user(1).with("id", task.id.as_str()))
        .unwrap();
    assert_eq!(after[0].group_id, mine);
    assert_eq!((after[0].p, after[0].q), (task.p, task.q));
}

#[test]
fn shared_group_admits_member() {
    let (_dir, store) = setup();
    let shared = store.groups().create(&as_user(1).with("name", "team")).unwrap();
    store
        .groups()
        .share(&as_user(1).with("id", shared.id.as_str()).with("user_id", 2))
        .unwrap();

    let created = store
        .tasks()
        .create(&as_user(2).with("group_id", shared.id.as_str()).with("name", "joint"))
        .unwrap();
    assert_eq!(created.task.owner, 2);

    let seen = store
        .tasks()
        .list(&as_user(1).with("group_id", shared.id.as_str()).with("limit", 10))
        .unwrap();
    assert_eq!(seen.len(), 1);

    let left = store.groups().delete(&as_user(2).with("id", shared.id.as_str())).unwrap();
    assert!(left.left);
    assert_matches!(
        store.tasks().list(&as_user(2).with("id", created.task.id.as_str())),
        Ok(rows) if rows.is_empty()
    );
}

#[test]
fn concurrent_tail_inserts_get_distinct_keys() {
    let (_dir, store) = setup();
    std::thread::scope(|s| {
        for worker in 0..2 {
            let store = store.clone();
            s.spawn(move || {
                for i in 0..20 {
                    store
                        .groups()
                        .create(&as_user(1).with("name", format!("w{worker}-{i}")))
                        .unwrap();
                }
            });
        }
    });

    let groups = top_groups(&store, 1);
    assert_eq!(groups.len(), 41);
    assert_strictly_increasing(&group_keys(&groups));
    assert_eq!(store.check().unwrap().duplicate_keys, 0);
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("intask.db");
    {
        let store = open(&path);
        store
            .users()
            .get_or_create(&as_user(1).with("email", "ann@example.com"))
            .unwrap();
        intask_store::close(store.into_pool());
    }

    let store = open(&path);
    assert_eq!(store.migrate().unwrap(), 0);
    let health = store.check().unwrap();
    assert_eq!(health.journal_mode, "wal");
    assert!(health.is_healthy());
    assert_eq!(top_groups(&store, 1).len(), 1);
}
