use std::process::Command;

use tempfile::tempdir;

#[test]
fn exports_graph_json_to_file() {
    let dir = tempdir().expect("temp dir");
    let sql_path = dir.path().join("input.sql");
    let output_path = dir.path().join("lineage.json");

    std::fs::write(
        &sql_path,
        "CREATE TABLE totals AS SELECT amount FROM orders",
    )
    .expect("write sql");

    let status = Command::new(env!("CARGO_BIN_EXE_flowscope"))
        .args([sql_path.to_str().unwrap(), "--export", output_path.to_str().unwrap()])
        .status()
        .expect("run CLI");

    assert!(status.success());
    let content = std::fs::read_to_string(&output_path).expect("export written");
    assert!(content.contains("\"totals\""));
    assert!(content.contains("\"orders.amount\""));
}

#[test]
fn trace_reports_the_upstream_chain() {
    let dir = tempdir().expect("temp dir");
    let sql_path = dir.path().join("input.sql");
    std::fs::write(
        &sql_path,
        "CREATE TABLE t1 AS SELECT amount FROM orders;\nCREATE TABLE t2 AS SELECT amount * 2 AS doubled FROM t1;",
    )
    .expect("write sql");

    let output = Command::new(env!("CARGO_BIN_EXE_flowscope"))
        .args([sql_path.to_str().unwrap(), "--trace", "t2.doubled"])
        .output()
        .expect("run CLI");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("t1.amount"));
    assert!(stdout.contains("orders.amount"));
}

#[test]
fn missing_script_file_exits_with_the_documented_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_flowscope"))
        .args(["/nonexistent/script.sql"])
        .status()
        .expect("run CLI");

    assert_eq!(status.code(), Some(2));
}

#[test]
fn script_with_a_lineage_error_exits_nonzero_but_still_reports() {
    let dir = tempdir().expect("temp dir");
    let sql_path = dir.path().join("input.sql");
    std::fs::write(&sql_path, "INSERT INTO ghost SELECT id FROM orders").expect("write sql");

    let status = Command::new(env!("CARGO_BIN_EXE_flowscope"))
        .args([sql_path.to_str().unwrap(), "--no-warnings"])
        .status()
        .expect("run CLI");

    assert_eq!(status.code(), Some(1));
}
