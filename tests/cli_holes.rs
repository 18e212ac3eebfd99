use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn command_holes() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("smsn")?;
    let output = cmd
        .arg("holes")
        .arg("tests/smsn/mocked_holes.sam")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout, "4260642\t5\n4260763\t3\n4325503\t3\n");

    Ok(())
}

#[test]
fn command_holes_min_subreads() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("smsn")?;
    let output = cmd
        .arg("holes")
        .arg("tests/smsn/mocked_holes.sam")
        .arg("--min-subreads")
        .arg("3")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("4260642\t5"));

    Ok(())
}

#[test]
fn command_holes_restrict_sam() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let ids = temp.path().join("ids.txt");
    std::fs::write(&ids, "4325503\n")?;

    let mut cmd = Command::cargo_bin("smsn")?;
    let output = cmd
        .arg("holes")
        .arg("tests/smsn/mocked_holes.sam")
        .arg("--restrict")
        .arg(&ids)
        .arg("--sam")
        .arg("--header")
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert_eq!(stdout.lines().count(), 6);
    assert!(stdout.starts_with("@HD"));
    assert_eq!(
        stdout.lines().filter(|l| l.contains("/4325503/")).count(),
        3
    );

    Ok(())
}

#[test]
fn command_holes_stdin_header() -> anyhow::Result<()> {
    let input = std::fs::read_to_string("tests/smsn/mocked_holes.sam")?;

    let mut cmd = Command::cargo_bin("smsn")?;
    let output = cmd
        .arg("holes")
        .arg("stdin")
        .arg("--sam")
        .arg("--header")
        .write_stdin(input)
        .output()?;
    let stdout = String::from_utf8(output.stdout)?;

    assert!(output.status.success());
    assert_eq!(stdout.lines().count(), 14);
    assert_eq!(stdout.lines().filter(|l| l.starts_with('@')).count(), 3);
    assert!(stdout.starts_with("@HD"));
    assert_eq!(
        stdout.lines().filter(|l| l.starts_with("m54063_170928_100556/")).count(),
        11
    );

    Ok(())
}

#[test]
fn command_holes_stdin() -> anyhow::Result<()> {
    let input = std::fs::read_to_string("tests/smsn/mocked_holes.sam")?;

    let mut cmd = Command::cargo_bin("smsn")?;
    let output = cmd
        .arg("holes")
        .arg("stdin")
        .write_stdin(input)
        .output()?;

    assert_eq!(
        String::from_utf8(output.stdout)?,
        "4260642\t5\n4260763\t3\n4325503\t3\n"
    );

    Ok(())
}

#[test]
fn command_holes_unsorted() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("smsn")?;
    cmd.arg("holes")
        .arg("tests/smsn/unsorted_holes.sam")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hole 4260642 reappears at line 4"));

    Ok(())
}

#[test]
fn command_holes_header_needs_sam() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("smsn")?;
    cmd.arg("holes")
        .arg("tests/smsn/mocked_holes.sam")
        .arg("--header")
        .assert()
        .failure();

    Ok(())
}
