use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

#[test]
fn snippets_json_lists_runnable_blocks() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("post.md"),
        "# Post\n\n```jac runnable\nwith entry { print(1); }\n```\n\n```python\nignored = True\n```\n\n```python run-serve\nprint(2)\n```\n",
    )?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["snippets", "post.md", "--json"])
        .assert()
        .success();

    let snippets: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let snippets = snippets.as_array().ok_or("expected an array")?;
    assert_eq!(snippets.len(), 2);
    assert_eq!(snippets[0]["index"], 0);
    assert_eq!(snippets[0]["code"], "with entry { print(1); }\n");
    assert_eq!(snippets[1]["index"], 1);
    assert_eq!(snippets[1]["code"], "print(2)\n");
    Ok(())
}

#[test]
fn snippets_text_listing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("post.md"), "```jac run-dot\nwith entry {}\n```\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["snippets", "post.md"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[0] line 1:"))
        .stdout(predicate::str::contains("run, graph"));
    Ok(())
}

#[test]
fn missing_page_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["snippets", "absent.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read page"));
    Ok(())
}

#[test]
fn highlight_prints_page_html() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("post.md"),
        "# Post\n\n```jac runnable\nnode A { has x: int; } # note\n```\n",
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["highlight", "post.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<h1>Post</h1>"))
        .stdout(predicate::str::contains("<span class=\"nc\">A</span>"))
        .stdout(predicate::str::contains("<span class=\"c\"># note</span>"));
    Ok(())
}

#[test]
fn highlight_writes_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("post.md"), "```python\nprint('x')\n```\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["highlight", "post.md", "--output", "post.html"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let html = fs::read_to_string(dir.path().join("post.html"))?;
    assert!(html.contains("<code class=\"language-python\"><span class=\"nb\">print</span>"));
    Ok(())
}

#[test]
fn pack_writes_support_archive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let lib = dir.path().join("jaclib");
    fs::create_dir_all(lib.join("core"))?;
    fs::write(lib.join("__init__.py"), "")?;
    fs::write(lib.join("core/walker.py"), "class Walker: pass\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["pack", "--source", "jaclib", "--output", "out/jaclang.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Packed 2 files"));

    assert!(dir.path().join("out/jaclang.zip").is_file());
    Ok(())
}

#[test]
fn pack_reads_source_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("jaclib"))?;
    fs::write(dir.path().join("jaclib/lib.py"), "x = 1\n")?;
    fs::write(
        dir.path().join("jacblog.yml"),
        "pack:\n  source: jaclib\n  output: build/support.zip\n",
    )?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .arg("pack")
        .assert()
        .success()
        .stdout(predicate::str::contains("Packed 1 files"));

    assert!(dir.path().join("build/support.zip").is_file());
    Ok(())
}

#[test]
fn pack_without_source_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["pack", "--source", "nowhere"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Support library not found"));
    Ok(())
}

#[test]
fn dev_requires_built_site() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    #[allow(deprecated)]
    Command::cargo_bin("jacblog")?
        .current_dir(dir.path())
        .args(["dev", "--site", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}
