//! Behavioral tests for the filter engine: rule precedence, the
//! catch-all directory asymmetry, subtree pruning, and the flag- and
//! date-based checks.

use std::path::Path;
use std::time::{Duration, SystemTime};
use velosync_config::SyncTask;
use velosync_filter::{FilterContext, FilterSide};
use velosync_types::{EntryKind, EntryMeta};

fn context(filters: &[&str], side: FilterSide) -> FilterContext {
    let mut task = SyncTask::new("/src", "/dst");
    task.filters = filters.iter().map(|s| s.to_string()).collect();
    FilterContext::new(&task, side).expect("filters must compile")
}

fn file_meta() -> EntryMeta {
    EntryMeta {
        kind: EntryKind::File,
        len: 1,
        mtime: SystemTime::now(),
        hidden: false,
        system: false,
    }
}

fn dir_meta() -> EntryMeta {
    EntryMeta {
        kind: EntryKind::Directory,
        len: 0,
        mtime: SystemTime::now(),
        hidden: false,
        system: false,
    }
}

#[test]
fn first_matching_rule_wins_regardless_of_kind() {
    let ctx = context(&["ex:*.log", "in:keep.log"], FilterSide::Source);
    assert!(!ctx.includes(Path::new("keep.log"), &file_meta()));

    let ctx = context(&["in:keep.log", "ex:*.log"], FilterSide::Source);
    assert!(ctx.includes(Path::new("keep.log"), &file_meta()));
    assert!(!ctx.includes(Path::new("other.log"), &file_meta()));
}

#[test]
fn no_match_defaults_to_include() {
    let ctx = context(&["ex:*.tmp"], FilterSide::Source);
    assert!(ctx.includes(Path::new("report.txt"), &file_meta()));
}

#[test]
fn whitelist_with_catch_all_exclude() {
    let ctx = context(&["in:keep*.*", "ex:**"], FilterSide::Source);
    assert!(ctx.includes(Path::new("keep-1.log"), &file_meta()));
    assert!(!ctx.includes(Path::new("other.log"), &file_meta()));
}

#[test]
fn excluded_subtree_dir_is_itself_included() {
    let ctx = context(&["ex:bbb/**"], FilterSide::Source);
    assert!(ctx.includes(Path::new("bbb"), &dir_meta()));
    assert!(ctx.is_excluded_subtree_dir(Path::new("bbb")));
    assert!(!ctx.includes(Path::new("bbb/inner.txt"), &file_meta()));
    assert!(!ctx.is_excluded_subtree_dir(Path::new("aaa")));
}

#[test]
fn literal_exclude_prunes_and_excludes_the_directory() {
    let ctx = context(&["ex:node_modules"], FilterSide::Source);
    assert!(!ctx.includes(Path::new("node_modules"), &dir_meta()));
    assert!(ctx.is_excluded_subtree_dir(Path::new("node_modules")));
}

#[test]
fn catch_all_spares_directories_on_source_side_only() {
    let src = context(&["in:keep/file.txt", "ex:**"], FilterSide::Source);
    assert!(src.includes(Path::new("keep"), &dir_meta()));
    assert!(!src.includes(Path::new("keep"), &file_meta()));

    let tgt = context(&["in:keep/file.txt", "ex:**"], FilterSide::Target);
    assert!(!tgt.includes(Path::new("keep"), &dir_meta()));
}

#[test]
fn catch_all_without_includes_excludes_directories_everywhere() {
    let src = context(&["ex:**"], FilterSide::Source);
    assert!(!src.includes(Path::new("any"), &dir_meta()));
    assert!(src.is_excluded_subtree_dir(Path::new("any")));
}

#[test]
fn catch_all_pruning_respects_simple_include_prefixes() {
    let ctx = context(&["in:foo/bar", "ex:**"], FilterSide::Source);
    // "foo" may still lead to the include, "other" cannot.
    assert!(!ctx.is_excluded_subtree_dir(Path::new("foo")));
    assert!(ctx.is_excluded_subtree_dir(Path::new("other")));
    // At include depth no descendant can match any more.
    assert!(ctx.is_excluded_subtree_dir(Path::new("foo/bar")));
}

#[test]
fn non_simple_include_disables_catch_all_pruning() {
    let ctx = context(&["in:foo/**", "ex:**"], FilterSide::Source);
    assert!(!ctx.is_excluded_subtree_dir(Path::new("foo")));
    assert!(!ctx.is_excluded_subtree_dir(Path::new("foo/deep")));
    assert!(!ctx.is_excluded_subtree_dir(Path::new("unrelated")));
}

#[test]
fn explicit_directory_include_is_distinguished_from_default() {
    let by_name = context(&["in:foo/bar", "ex:**"], FilterSide::Source);
    assert!(by_name.explicitly_includes_dir(Path::new("foo/bar")));
    assert!(!by_name.explicitly_includes_dir(Path::new("foo")));

    let descendants_only = context(&["in:foo/bar/**", "ex:**"], FilterSide::Source);
    assert!(!descendants_only.explicitly_includes_dir(Path::new("foo/bar")));
}

#[test]
fn anchored_exclude_prunes_anywhere() {
    let ctx = context(&["ex:**/target/**"], FilterSide::Source);
    assert!(ctx.is_excluded_subtree_dir(Path::new("target")));
    assert!(ctx.is_excluded_subtree_dir(Path::new("a/b/target")));
    assert!(!ctx.is_excluded_subtree_dir(Path::new("a/b/src")));
}

#[test]
fn modified_window_applies_to_regular_files_only() {
    let mut task = SyncTask::new("/src", "/dst");
    let cutoff = SystemTime::now();
    task.modified_until = Some(chrono::DateTime::from(cutoff));
    let ctx = FilterContext::new(&task, FilterSide::Source).unwrap();

    let mut old_file = file_meta();
    old_file.mtime = cutoff - Duration::from_secs(60);
    assert!(ctx.includes(Path::new("old.txt"), &old_file));

    let mut exact = file_meta();
    exact.mtime = cutoff;
    // "until" is inclusive.
    assert!(ctx.includes(Path::new("exact.txt"), &exact));

    let mut newer = file_meta();
    newer.mtime = cutoff + Duration::from_secs(60);
    assert!(!ctx.includes(Path::new("new.txt"), &newer));

    // Directories are never excluded by mtime.
    let mut new_dir = dir_meta();
    new_dir.mtime = cutoff + Duration::from_secs(60);
    assert!(ctx.includes(Path::new("newdir"), &new_dir));
}

#[test]
fn modified_before_is_exclusive() {
    let mut task = SyncTask::new("/src", "/dst");
    let cutoff = SystemTime::now();
    task.modified_before = Some(chrono::DateTime::from(cutoff));
    let ctx = FilterContext::new(&task, FilterSide::Source).unwrap();

    let mut exact = file_meta();
    exact.mtime = cutoff;
    assert!(!ctx.includes(Path::new("exact.txt"), &exact));

    let mut older = file_meta();
    older.mtime = cutoff - Duration::from_secs(1);
    assert!(ctx.includes(Path::new("older.txt"), &older));
}

#[test]
fn hidden_and_system_flags() {
    let mut task = SyncTask::new("/src", "/dst");
    task.exclude_hidden_files = true;
    let ctx = FilterContext::new(&task, FilterSide::Source).unwrap();

    let mut hidden = file_meta();
    hidden.hidden = true;
    assert!(!ctx.includes(Path::new(".secret"), &hidden));
    assert!(ctx.includes(Path::new("visible"), &file_meta()));

    let mut task = SyncTask::new("/src", "/dst");
    task.exclude_hidden_system_files = true;
    let ctx = FilterContext::new(&task, FilterSide::Source).unwrap();
    let mut both = file_meta();
    both.hidden = true;
    assert!(ctx.includes(Path::new("hidden-only"), &both));
    both.system = true;
    assert!(!ctx.includes(Path::new("hidden-system"), &both));
}

#[test]
fn other_links_flag() {
    let mut task = SyncTask::new("/src", "/dst");
    task.exclude_other_links = true;
    let ctx = FilterContext::new(&task, FilterSide::Source).unwrap();

    let mut link = file_meta();
    link.kind = EntryKind::OtherSymlink;
    assert!(!ctx.includes(Path::new("weird"), &link));
    link.kind = EntryKind::FileSymlink;
    assert!(ctx.includes(Path::new("normal"), &link));
}

#[test]
fn malformed_specs_are_fatal() {
    let mut task = SyncTask::new("/src", "/dst");
    task.filters = vec!["include:foo".to_string()];
    assert!(FilterContext::new(&task, FilterSide::Source).is_err());
}

#[test]
fn inert_target_context_detection() {
    let task = SyncTask::new("/src", "/dst");
    let ctx = FilterContext::new(&task, FilterSide::Target).unwrap();
    assert!(ctx.is_inert());

    let ctx = context(&["ex:*.tmp"], FilterSide::Target);
    assert!(!ctx.is_inert());
}
