use assert_cmd::Command;

fn get_cmd() -> Command {
    Command::cargo_bin("rulegen").expect("binary is built by the test harness")
}

#[test]
fn generate_writes_a_wasm_module_to_stdout() {
    let assert = get_cmd()
        .args(["generate", "--seed", "7"])
        .assert()
        .success();
    let stdout = &assert.get_output().stdout;
    assert!(stdout.starts_with(b"\0asm"));
}

#[test]
fn generate_js_harness_emits_a_text_harness() {
    let assert = get_cmd()
        .args(["generate", "--seed", "7", "--js-harness"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("WebAssembly.instantiate"));
}

#[test]
fn generate_rejects_an_unknown_blacklist_type() {
    get_cmd()
        .args(["generate", "--blacklist", "not-a-type"])
        .assert()
        .failure();
}

#[test]
fn batch_writes_count_many_files() {
    let dir = std::env::temp_dir().join("wasm-rulegen-cli-test-batch");
    let _ = std::fs::remove_dir_all(&dir);
    get_cmd()
        .args(["batch", "--seed-start", "1", "--count", "3", "--out-dir"])
        .arg(&dir)
        .assert()
        .success();
    let written = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(written, 3);
    let _ = std::fs::remove_dir_all(&dir);
}
