// CLI integration tests for one-shot commands and the stdio server.
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_red-introspect");
    let mut command = Command::new(exe);
    command.env_remove("RED_INTROSPECT_PATH");
    command
}

fn parse_json(output: &[u8]) -> Value {
    let text = std::str::from_utf8(output).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

#[test]
fn classes_prints_envelope() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("shapes.py");
    fs::write(&file, "class Circle:\n    pass\n").expect("write");

    let output = cmd()
        .args(["classes", path_arg(&file)])
        .output()
        .expect("classes");
    assert!(output.status.success());
    let envelope = parse_json(&output.stdout);
    assert_eq!(envelope["exception"], Value::Null);
    let names: Vec<&str> = envelope["result"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.contains(&"shapes.Circle"));
}

#[test]
fn failures_print_envelope_and_exit_with_kind_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing.py");

    let output = cmd()
        .args(["classes", path_arg(&missing)])
        .output()
        .expect("classes");
    assert_eq!(output.status.code(), Some(3));
    let envelope = parse_json(&output.stdout);
    assert_eq!(envelope["result"], Value::Null);
    assert!(
        envelope["exception"]
            .as_str()
            .expect("exception")
            .starts_with("NotFound: ")
    );

    let broken = temp.path().join("broken.py");
    fs::write(&broken, "x = (\n").expect("write");
    let output = cmd()
        .args(["variables", path_arg(&broken)])
        .output()
        .expect("variables");
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn variables_pass_arguments_and_render_human() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("vars_with_argument.py");
    fs::write(
        &file,
        "def get_variables(suffix):\n    return {'a': '1' + suffix}\n",
    )
    .expect("write");

    let output = cmd()
        .args(["variables", path_arg(&file), "--arg", "_x"])
        .output()
        .expect("variables");
    assert!(output.status.success());
    assert_eq!(parse_json(&output.stdout)["result"]["a"], "1_x");

    let output = cmd()
        .args(["--human", "variables", path_arg(&file), "--arg", "_y"])
        .output()
        .expect("variables human");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "a  1_y");
}

#[test]
fn libdoc_uses_base_search_path_from_env() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("envlib.py"),
        "def do_thing():\n    \"\"\"Does it.\"\"\"\n",
    )
    .expect("write");

    let output = cmd()
        .args(["libdoc", "envlib"])
        .env("RED_INTROSPECT_PATH", temp.path())
        .output()
        .expect("libdoc");
    assert!(output.status.success());
    let envelope = parse_json(&output.stdout);
    assert_eq!(envelope["result"]["keywords"][0]["name"], "Do Thing");

    let output = cmd()
        .args(["--path", path_arg(temp.path()), "libdoc", "envlib"])
        .output()
        .expect("libdoc with --path");
    assert!(output.status.success());
}

#[test]
fn serve_answers_one_line_per_request() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("vars.py");
    fs::write(&file, "print('loading vars')\nname = 'value'\n").expect("write");

    let mut child = cmd()
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn serve");
    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}}").expect("write");
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "get_variables",
            "params": [path_arg(&file), []],
        });
        writeln!(stdin, "{request}").expect("write");
        writeln!(stdin, "not json").expect("write");
    }
    drop(child.stdin.take());
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());

    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["result"]["name"], "red-introspect");
    assert_eq!(lines[1]["result"]["result"]["name"], "value");
    assert_eq!(lines[2]["error"]["code"], -32700);
}

#[test]
fn usage_errors_exit_with_usage_code() {
    let output = cmd()
        .args(["classes", "a.py", "--bogus"])
        .output()
        .expect("bad flag");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("UsageError") || stderr.contains("Usage"));
}

#[test]
fn completion_and_version() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("red-introspect"));

    let output = cmd().arg("version").output().expect("version");
    assert!(output.status.success());
    assert_eq!(parse_json(&output.stdout)["name"], "red-introspect");
}
