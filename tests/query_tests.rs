// End-to-end query execution against real files

use std::fs;
use std::path::PathBuf;
use teql::session::{QueryResult, Session};
use teql::Error;

const JABBERWOCKY: &str = "Twas brillig, and the slithy toves\n\
    Did gyre and gimble in the wabe:\n\
    All mimsy were the borogoves,\n\
    And the mome raths outgrabe.\n\
    \n\
    Beware the Jabberwock, my son!\n\
    The jaws that bite, the claws that catch!\n\
    \n\
    Twas brillig, and the slithy toves\n\
    Did gyre and gimble in the wabe:\n\
    All mimsy were the borogoves,\n\
    And the mome raths outgrabe.\n";

fn fixture(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn find_and_change_rewrites_both_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();

    let script = format!(r#"UPDATE {} CHANGE "mimsy" TO "whimsy""#, path.display());
    session.execute_all(&script).unwrap();

    let edited = fs::read_to_string(&path).unwrap();
    assert_eq!(edited, JABBERWOCKY.replace("mimsy", "whimsy"));
    assert_eq!(edited.len(), JABBERWOCKY.len() + 2);
}

#[test]
fn show_block_between_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();
    session.execute(&format!("USE {}", path.display())).unwrap();

    let QueryResult::Show(block) = session.execute("SHOW FROM LINE 6 TO LINE 7").unwrap() else {
        panic!("expected show result")
    };
    assert_eq!(
        block,
        vec!["Beware the Jabberwock, my son!\nThe jaws that bite, the claws that catch!\n"]
    );

    let QueryResult::Show(between) = session
        .execute("SHOW BETWEEN LINE 5 AND LINE 8")
        .unwrap()
    else {
        panic!("expected show result")
    };
    assert_eq!(
        between,
        vec!["Beware the Jabberwock, my son!\nThe jaws that bite, the claws that catch!\n"]
    );
}

#[test]
fn show_case_insensitive_regex() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();
    session.execute(&format!("USE {}", path.display())).unwrap();

    let QueryResult::Show(matches) = session.execute("SHOW FIND /jabberwock/i").unwrap() else {
        panic!("expected show result")
    };
    assert_eq!(matches, vec!["Jabberwock"]);
}

#[test]
fn variable_bound_then_used_in_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();

    let script = format!(
        r#"SET $target "borogoves"; UPDATE {} CHANGE $target TO "borogrove""#,
        path.display()
    );
    session.execute_all(&script).unwrap();
    let edited = fs::read_to_string(&path).unwrap();
    assert_eq!(edited.matches("borogrove").count(), 2);
    assert!(!edited.contains("borogoves"));
}

#[test]
fn update_glob_touches_every_matched_file() {
    let dir = tempfile::tempdir().unwrap();
    fixture(&dir, "one.txt", "a tove\n");
    fixture(&dir, "two.txt", "another tove\n");
    fixture(&dir, "skip.md", "a tove survives\n");
    let mut session = Session::new();

    let script = format!(
        r#"UPDATE {}/*.txt CHANGE "tove" TO "dove""#,
        dir.path().display()
    );
    let QueryResult::Update(report) = session.execute(&script).unwrap() else {
        panic!("expected update result")
    };
    assert_eq!(report.files.len(), 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("one.txt")).unwrap(),
        "a dove\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("two.txt")).unwrap(),
        "another dove\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("skip.md")).unwrap(),
        "a tove survives\n"
    );
}

#[test]
fn failing_query_stops_a_batch_after_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();

    let script = format!(
        "USE {}; SHOW LINE 1; SHOW LINE 9999",
        path.display()
    );
    let err = session.execute_all(&script).unwrap_err();
    assert!(matches!(err, Error::Bounds(_)));
}

#[test]
fn parse_error_aborts_before_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "poem.txt", JABBERWOCKY);
    let mut session = Session::new();

    // The script never runs: the trailing query fails to parse
    let script = format!(
        r#"UPDATE {} CHANGE "mimsy" TO "x"; SELECT @@ FROM nowhere"#,
        path.display()
    );
    assert!(matches!(
        session.execute_all(&script),
        Err(Error::Parse { .. })
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), JABBERWOCKY);
}

#[test]
fn delete_first_lines_of_matching_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "notes.txt", "header\nbody one\nbody two\n");
    let mut session = Session::new();

    session
        .execute(&format!("UPDATE {} DELETE LINE 1", path.display()))
        .unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "body one\nbody two\n"
    );
}

#[test]
fn insert_before_a_found_anchor() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "conf.txt", "alpha=1\nomega=9\n");
    let mut session = Session::new();

    session
        .execute(&format!(
            r#"UPDATE {} INSERT LINE "middle=5" AT BEFORE FIND LINE WITH "omega""#,
            path.display()
        ))
        .unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "alpha=1\nmiddle=5\nomega=9\n"
    );
}
