use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const PAGE: &str = r#"# Graphs

Some prose first.

```jac runnable
with entry { print("hello from the page"); }
```

```jac run-dot
node Person { has name: str; }
with entry {
    root ++> Person(name="Alice");
    print("done");
}
```
"#;

#[test]
fn run_jac_file_streams_stdout() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("count.jac"),
        "with entry { for i in range(3) { print(\"Count: \" + str(i)); } }\n",
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "count.jac"])
        .assert()
        .success()
        .stdout("Count: 0\nCount: 1\nCount: 2\n");
    Ok(())
}

#[test]
fn run_python_file_by_extension() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("add.py"), "print(2 + 3)\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "add.py"])
        .assert()
        .success()
        .stdout("5\n");
    Ok(())
}

#[test]
fn run_page_snippet_reads_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("ask.jac"),
        "with entry { x = input(\"name? \"); print(\"Hi \" + x); }\n",
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "ask.jac"])
        .write_stdin("Ada\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hi Ada"))
        .stderr(predicate::str::contains("name? "));
    Ok(())
}

#[test]
fn graph_action_emits_json_transcript() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("page.md"), PAGE)?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args([
            "run", "page.md", "--snippet", "1", "--action", "graph", "--json", "--svg", "graph.svg",
        ])
        .assert()
        .success();

    let out: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(out["stdout"], "done\n");
    assert_eq!(out["input_requests"], 0);
    let dot = out["dot"].as_str().unwrap_or_default();
    assert!(dot.contains("->"), "dot was {:?}", dot);
    assert!(dot.contains("Person(name='Alice')"), "dot was {:?}", dot);
    assert!(out["graph"].as_str().unwrap_or_default().starts_with("graph: "));

    let svg = fs::read_to_string(dir.path().join("graph.svg"))?;
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("class=\"viewport\""));
    Ok(())
}

#[test]
fn dot_action_prints_only_the_graph() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("page.md"), PAGE)?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "page.md", "--snippet", "1", "--action", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("->"))
        .stdout(predicate::str::contains("Person(name='Alice')"))
        .stdout(predicate::str::contains("done").not())
        .stderr(predicate::str::contains("graph: "));
    Ok(())
}

#[test]
fn action_must_be_offered_by_snippet() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("page.md"), PAGE)?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "page.md", "--action", "dot"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn page_without_snippets_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("plain.md"), "# Nothing to run\n\n```jac\nx = 1\n```\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["run", "plain.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No runnable snippets"));
    Ok(())
}
