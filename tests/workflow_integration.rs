//! End-to-end single-session workflows.
//!
//! Drives the session verb layer the way a student exercise would: edit,
//! stage, commit, branch, merge, resolve conflicts, replay history, and
//! recover with stash and reset.

use gitdojo::replay::{RebaseOutcome, ReplayOutcome};
use gitdojo::resolve::ResolveError;
use gitdojo::session::{MergeVerbOutcome, SessionError, SessionRegistry};
use gitdojo::stash::{StashPopOutcome, StashPushOutcome};

fn session() -> (SessionRegistry, std::sync::Arc<gitdojo::session::Session>) {
    let registry = SessionRegistry::new();
    let session = registry.session("student");
    session.create_repo("exercise").unwrap();
    (registry, session)
}

fn commit_file(
    session: &gitdojo::session::Session,
    path: &str,
    content: &str,
    message: &str,
) -> gitdojo::core::types::Oid {
    session.write_file(path, content).unwrap();
    session.stage_all().unwrap();
    session.commit(message).unwrap()
}

#[test]
fn edit_stage_commit_cycle() {
    let (_registry, session) = session();

    let first = commit_file(&session, "notes.txt", "one\n", "start notes");
    let second = commit_file(&session, "notes.txt", "one\ntwo\n", "extend notes");

    assert_eq!(session.resolve("HEAD").unwrap(), second);
    assert_eq!(session.resolve("HEAD~1").unwrap(), first);
    assert_eq!(session.resolve("main").unwrap(), second);
    assert_eq!(session.resolve(&second.to_string()).unwrap(), second);
    assert_eq!(session.resolve(second.short(8)).unwrap(), second);

    let log = session.log(10).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].summary, "extend notes");
    assert_eq!(log[1].summary, "start notes");
}

#[test]
fn unknown_revision_is_a_resolver_error() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "x\n", "one");
    let err = session.resolve("does-not-exist").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Resolve(ResolveError::NotFound { .. })
    ));
}

#[test]
fn conflicted_merge_is_resolved_by_hand_and_committed() {
    let (_registry, session) = session();
    commit_file(&session, "greeting.txt", "hello\n", "base");

    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "greeting.txt", "hello from feature\n", "feature edit");

    session.checkout("main").unwrap();
    commit_file(&session, "greeting.txt", "hello from main\n", "main edit");

    let outcome = session.merge("feature", false).unwrap();
    let MergeVerbOutcome::Conflict { paths } = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(paths, vec!["greeting.txt".to_string()]);

    let marked = String::from_utf8(session.read_file("greeting.txt").unwrap().unwrap()).unwrap();
    assert!(marked.contains("<<<<<<< HEAD"));
    assert!(marked.contains(">>>>>>> feature"));

    // Resolve by hand, stage, commit.
    session.write_file("greeting.txt", "hello everyone\n").unwrap();
    session.stage_all().unwrap();
    session.commit("resolve greeting").unwrap();
    assert!(session.status().unwrap().is_clean());
}

#[test]
fn merge_commit_joins_divergent_branches() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "a\n", "base");

    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "b.txt", "b\n", "feature adds b");

    session.checkout("main").unwrap();
    commit_file(&session, "c.txt", "c\n", "main adds c");

    let outcome = session.merge("feature", false).unwrap();
    let MergeVerbOutcome::Merged(oid) = outcome else {
        panic!("expected merge commit, got {outcome:?}");
    };
    // Both sides' files are present.
    assert!(session.read_file("b.txt").unwrap().is_some());
    assert!(session.read_file("c.txt").unwrap().is_some());
    // Two parents, mainline first.
    let parents = session
        .with_current_repo(|repo| repo.store.get_commit(&oid).unwrap().parents.clone())
        .unwrap();
    assert_eq!(parents.len(), 2);
    assert_eq!(session.resolve("HEAD^1").unwrap(), parents[0]);
    assert_eq!(session.resolve("HEAD^2").unwrap(), parents[1]);
}

#[test]
fn cherry_pick_copies_one_change_across_branches() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "a\n", "base");

    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "fix.txt", "the fix\n", "important fix");
    let fix = commit_file(&session, "extra.txt", "more\n", "unrelated extra");

    session.checkout("main").unwrap();
    let outcome = session.cherry_pick("feature~1", false).unwrap();
    let ReplayOutcome::Committed(new_oid) = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_ne!(new_oid, fix);
    assert!(session.read_file("fix.txt").unwrap().is_some());
    assert!(session.read_file("extra.txt").unwrap().is_none());
    // Message is reused.
    assert_eq!(session.log(1).unwrap()[0].summary, "important fix");
}

#[test]
fn cherry_picking_already_applied_change_would_be_empty() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "a\n", "base");
    session.branch_create("copy", Some("HEAD")).unwrap();
    let change = commit_file(&session, "a.txt", "changed\n", "the change");

    session.checkout("copy").unwrap();
    commit_file(&session, "a.txt", "changed\n", "same change, different commit");

    let outcome = session.cherry_pick(&change.to_string(), false).unwrap();
    assert_eq!(outcome, ReplayOutcome::WouldBeEmpty);
}

#[test]
fn revert_undoes_a_commit_without_rewriting_history() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "v1\n", "one");
    let bad = commit_file(&session, "a.txt", "v2\n", "bad change");
    commit_file(&session, "b.txt", "b\n", "later work");

    let outcome = session.revert(&bad.to_string(), None).unwrap();
    assert!(matches!(outcome, ReplayOutcome::Committed(_)));
    assert_eq!(
        session.read_file("a.txt").unwrap().unwrap(),
        b"v1\n".to_vec()
    );
    // Later work survives and history only grew.
    assert!(session.read_file("b.txt").unwrap().is_some());
    assert_eq!(session.log(10).unwrap()[0].summary, "Revert \"bad change\"");
    assert_eq!(session.log(10).unwrap().len(), 4);
}

#[test]
fn rebase_replays_branch_onto_moved_mainline() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "a\n", "base");

    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "f1.txt", "1\n", "feature one");
    commit_file(&session, "f2.txt", "2\n", "feature two");

    session.checkout("main").unwrap();
    let main_tip = commit_file(&session, "m.txt", "m\n", "mainline moved");

    session.checkout("feature").unwrap();
    let outcome = session.rebase_onto("main", None, false).unwrap();
    let RebaseOutcome::Completed { new_tip, replayed } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(replayed, 2);
    assert_eq!(session.resolve("HEAD").unwrap(), new_tip);
    // New history sits on top of main; the mainline file is present.
    assert_eq!(session.resolve("HEAD~2").unwrap(), main_tip);
    assert!(session.read_file("m.txt").unwrap().is_some());
    assert!(session.read_file("f2.txt").unwrap().is_some());
    // ORIG_HEAD points at the pre-rebase tip.
    assert!(session.orig_head().unwrap().is_some());
}

#[test]
fn rebase_conflict_stops_midway() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "base\n", "base");

    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "clean.txt", "ok\n", "clean step");
    let clash = commit_file(&session, "a.txt", "feature version\n", "clashing step");

    session.checkout("main").unwrap();
    commit_file(&session, "a.txt", "main version\n", "mainline edit");

    session.checkout("feature").unwrap();
    let outcome = session.rebase_onto("main", None, false).unwrap();
    let RebaseOutcome::Conflict { stopped_at, paths } = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(stopped_at, clash);
    assert_eq!(paths, vec!["a.txt".to_string()]);
    // The clean step is already replayed on the new base.
    assert!(session.read_file("clean.txt").unwrap().is_some());
}

#[test]
fn stash_shelves_and_restores_work_in_progress() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "committed\n", "base");

    session.write_file("a.txt", "committed\nwip\n").unwrap();
    let pushed = session.stash_push().unwrap();
    assert!(matches!(pushed, StashPushOutcome::Stashed(_)));
    assert!(session.status().unwrap().is_clean());

    let entries = session.stash_list().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].to_string().starts_with("stash@{0}: WIP on main:"));

    let popped = session.stash_pop().unwrap();
    assert!(matches!(popped, StashPopOutcome::Applied { .. }));
    assert_eq!(
        session.read_file("a.txt").unwrap().unwrap(),
        b"committed\nwip\n".to_vec()
    );
    // Restored as unstaged changes.
    let status = session.status().unwrap();
    assert!(status.staged.is_empty());
    assert_eq!(status.unstaged, vec!["a.txt".to_string()]);
    assert!(session.stash_list().unwrap().is_empty());
}

#[test]
fn reset_hard_and_orig_head_recovery() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "1\n", "one");
    let tip = commit_file(&session, "a.txt", "2\n", "two");

    session.reset_hard("HEAD~1").unwrap();
    assert_eq!(session.read_file("a.txt").unwrap().unwrap(), b"1\n".to_vec());

    // The discarded tip is still reachable through ORIG_HEAD.
    assert_eq!(session.orig_head().unwrap(), Some(tip.clone()));
    session.reset_hard("ORIG_HEAD").unwrap();
    assert_eq!(session.resolve("HEAD").unwrap(), tip);
    assert_eq!(session.read_file("a.txt").unwrap().unwrap(), b"2\n".to_vec());
}

#[test]
fn reflog_records_each_head_movement() {
    let (_registry, session) = session();
    commit_file(&session, "a.txt", "1\n", "one");
    session.checkout_new_branch("feature").unwrap();
    commit_file(&session, "b.txt", "2\n", "two");
    session.checkout("main").unwrap();

    let lines = session.reflog_lines();
    assert_eq!(
        lines,
        vec![
            "checkout: moving to main".to_string(),
            "commit: two".to_string(),
            "checkout: creating branch feature".to_string(),
            "commit: one".to_string(),
        ]
    );
}

#[test]
fn detached_head_checkout_and_back() {
    let (_registry, session) = session();
    let first = commit_file(&session, "a.txt", "1\n", "one");
    commit_file(&session, "a.txt", "2\n", "two");

    session.checkout(&first.to_string()).unwrap();
    let status = session.status().unwrap();
    assert_eq!(status.branch, None);
    assert_eq!(session.read_file("a.txt").unwrap().unwrap(), b"1\n".to_vec());

    session.checkout("main").unwrap();
    assert_eq!(
        session.status().unwrap().branch.unwrap().as_str(),
        "main"
    );
    assert_eq!(session.read_file("a.txt").unwrap().unwrap(), b"2\n".to_vec());
}
