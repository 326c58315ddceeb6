use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_churnscope"))
        .args(["init", "--workdir"])
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "churnscope init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".churnscope.toml");
    assert!(config_path.exists(), ".churnscope.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[analyzer]"));
    assert!(content.contains("[mining]"));
    assert!(content.contains("[evolution]"));

    // Verify the template parses with the defaults intact.
    let config = churnscope_core::ChurnConfig::from_toml(&content).unwrap();
    assert_eq!(config.mining.max_workers, 4);
    assert_eq!(config.evolution.min_changes, 2);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".churnscope.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_churnscope"))
        .args(["init", "--workdir"])
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn no_subcommand_prints_welcome() {
    let output = Command::new(env!("CARGO_BIN_EXE_churnscope"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("churnscope"));
    assert!(stdout.contains("mine"));
}
