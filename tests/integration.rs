mod util;

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::cargo::CommandCargoExt;
use tempfile::tempdir;

fn run(source: &std::path::Path, out: &std::path::Path) -> std::process::Output {
    Command::cargo_bin("dsstore-parser")
        .unwrap()
        .arg("--source")
        .arg(source)
        .arg("--out")
        .arg(out)
        .output()
        .unwrap()
}

fn report(outdir: &std::path::Path, kind: &str) -> PathBuf {
    let mut found = None;
    for entry in fs::read_dir(outdir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with(&format!("DS_Store-{kind}-")) && name.ends_with(".tsv") {
            assert!(found.is_none(), "duplicate {kind} report");
            found = Some(path);
        }
    }
    found.unwrap_or_else(|| panic!("no {kind} report in {}", outdir.display()))
}

#[test]
fn parses_a_tree_and_writes_all_three_reports() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let sub = src.path().join("Users").join("kim");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join(".DS_Store"), util::single_iloc_store()).unwrap();

    let output = run(src.path(), out.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Records Parsed: 1"), "{stdout}");

    let all = fs::read_to_string(report(out.path(), "All_Parsed_Report")).unwrap();
    let lines: Vec<&str> = all.lines().collect();
    assert!(lines[0].starts_with("generated_path\trecord_filename\trecord_type"));
    assert_eq!(lines.len(), 2, "{all}");
    let row = lines[1];
    assert!(row.contains("foo.txt"), "{row}");
    assert!(row.contains("Iloc (Icon Location)"), "{row}");
    assert!(row.contains("blob (IlocCodec)"), "{row}");
    assert!(
        row.contains("Location: (10, 20), Selected Index: Null, Unknown: 00000000"),
        "{row}"
    );
    assert!(row.contains("allocated 2"), "{row}");

    // Iloc is classified as miscellaneous info, not folder access
    let misc = fs::read_to_string(report(out.path(), "Miscellaneous_Info_Report")).unwrap();
    assert_eq!(misc.lines().count(), 2, "{misc}");
    assert!(misc.contains("foo.txt"));
    let folder = fs::read_to_string(report(out.path(), "Folder_Access_Report")).unwrap();
    assert_eq!(folder.lines().count(), 1, "{folder}");
}

#[test]
fn empty_ds_store_leaves_a_placeholder_row() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(src.path().join(".DS_Store"), b"").unwrap();

    let output = run(src.path(), out.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Records Parsed: 0"), "{stdout}");

    let all = fs::read_to_string(report(out.path(), "All_Parsed_Report")).unwrap();
    let lines: Vec<&str> = all.lines().collect();
    assert_eq!(lines.len(), 2, "{all}");
    assert!(lines[1].starts_with("EMPTY DS_STORE: "), "{}", lines[1]);
}

#[test]
fn garbage_files_are_skipped_without_failing_the_run() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(src.path().join("fake.ds_store.bak"), b"certainly not Bud1").unwrap();

    let output = run(src.path(), out.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Records Parsed: 0"), "{stdout}");
}

#[test]
fn view_style_records_render_through_the_style_table() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let store = util::build_store(&[util::record_bytes(".", b"vstl", b"type", b"Nlsv")]);
    fs::write(src.path().join(".DS_Store"), store).unwrap();

    let output = run(src.path(), out.path());
    assert!(output.status.success());
    let all = fs::read_to_string(report(out.path(), "All_Parsed_Report")).unwrap();
    assert!(all.contains("Nlsv: List View"), "{all}");
    // vstl counts as folder interaction
    let folder = fs::read_to_string(report(out.path(), "Folder_Access_Report")).unwrap();
    assert_eq!(folder.lines().count(), 2, "{folder}");
}
