//! Integration tests running whole editing sessions against hive files.

use reg_editor::resolver::find_key_section;
use reg_editor::{EditorOptions, KeyMatch, ParentKeyCache, RegistryEditor, RegistryError, ValueData};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn test_data_path(filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_data")
        .join(filename)
}

/// Copies the `user.reg` fixture into a fresh directory.
fn fixture_copy() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user.reg");
    fs::copy(test_data_path("user.reg"), &path).unwrap();
    (dir, path)
}

fn hive_with(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user.reg");
    fs::write(&path, content).unwrap();
    (dir, path)
}

fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_set_dword_in_empty_file() {
    let (_dir, path) = hive_with("");
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert!(editor.set_dword_value(r"Software\Test", Some("Foo"), 1).unwrap());
    assert_eq!(editor.get_dword_value(r"Software\Test", Some("Foo")).unwrap(), Some(1));
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[Software\\\\Test] "));
    assert!(content.contains("\n\"Foo\"=dword:00000001\n"));
}

#[test]
fn test_string_value_is_escaped() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    let message = r#"He said "hi""#;
    editor.set_string_value(r"Software\Wine\Direct3D", Some("Msg"), message).unwrap();
    assert_eq!(
        editor.get_string_value(r"Software\Wine\Direct3D", Some("Msg")).unwrap().as_deref(),
        Some(message)
    );
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains(r#""Msg"="He said \"hi\"""#));
}

#[test]
fn test_hex_value() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    editor
        .set_hex_value(r"Software\Wine\Direct3D", Some("Blob"), &[0x00, 0x01, 0xff])
        .unwrap();
    assert_eq!(
        editor.get_raw_value(r"Software\Wine\Direct3D", Some("Blob")).unwrap().as_deref(),
        Some("hex:00,01,ff")
    );
    assert_eq!(
        editor.get_hex_value(r"Software\Wine\Direct3D", Some("Blob")).unwrap(),
        Some(vec![0x00, 0x01, 0xff])
    );
}

#[test]
fn test_wrapped_hex_value_in_fixture() {
    let (_dir, path) = fixture_copy();
    let editor = RegistryEditor::open(&path).unwrap();

    let expected: Vec<u8> = (0x00..=0x10).collect();
    assert_eq!(
        editor.get_hex_value(r"Software\Wine\Fonts\Replacements", Some("Blob")).unwrap(),
        Some(expected)
    );
    // the value after the continuation line is still found
    assert_eq!(
        editor
            .get_string_value(r"Software\Wine\Fonts\Replacements", Some("Path"))
            .unwrap()
            .as_deref(),
        Some(r"C:\windows\Fonts")
    );
}

#[test]
fn test_long_hex_value_replaces_in_place() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();
    let key = r"Software\Wine\Fonts\Replacements";

    let bytes: Vec<u8> = (0..200u8).collect();
    editor.set_hex_value(key, Some("Blob"), &bytes).unwrap();
    assert_eq!(editor.get_hex_value(key, Some("Blob")).unwrap(), Some(bytes));
    assert_eq!(editor.get_string_value(key, None).unwrap().as_deref(), Some("Tahoma"));
    assert_eq!(
        editor.get_string_value(key, Some("Path")).unwrap().as_deref(),
        Some(r"C:\windows\Fonts")
    );
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    for line in content.lines() {
        assert!(line.len() <= 56, "line too long: {}", line);
    }
}

#[test]
fn test_missing_target_is_created_on_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("system.reg");
    assert!(!path.exists());

    let mut editor = RegistryEditor::open(&path).unwrap();
    editor.set_dword_value(r"Software\Test", Some("Foo"), 1).unwrap();
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.split('\n').collect();
    assert_eq!(lines.len(), 5, "unexpected content: {:?}", content);
    assert_eq!(lines[0], "");
    assert!(lines[1].starts_with("[Software\\\\Test] "));
    assert!(lines[1]["[Software\\\\Test] ".len()..].bytes().all(|b| b.is_ascii_digit()));
    assert!(lines[2].starts_with("#time="));
    assert!(lines[2]["#time=".len()..].bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(lines[3], "\"Foo\"=dword:00000001");
    assert_eq!(lines[4], "");

    // working and scratch files are gone
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn test_unmodified_session_leaves_target_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user.reg");

    let mut editor = RegistryEditor::open(&path).unwrap();
    assert!(!editor.key_exists("Software").unwrap());
    editor.close();

    assert!(!path.exists());
    assert_eq!(entries(dir.path()), 0);
}

#[test]
fn test_remove_missing_key_is_noop() {
    let (dir, path) = fixture_copy();
    let before = fs::read(&path).unwrap();

    let mut editor = RegistryEditor::open(&path).unwrap();
    assert!(!editor.remove_key(r"Software\Missing", false).unwrap());
    assert!(!editor.remove_key(r"Software\Missing", true).unwrap());
    assert!(!editor.remove_value(r"Software\Wine\Direct3D", Some("missing")).unwrap());
    assert!(!editor.is_modified());
    editor.close();

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn test_edit_only_touches_its_section() {
    let (_dir, path) = fixture_copy();
    let before = fs::read_to_string(&path).unwrap();
    let section = find_key_section(&path, r"Software\Wine\Direct3D", KeyMatch::Exact, &mut ParentKeyCache::new())
        .unwrap()
        .unwrap();

    let mut editor = RegistryEditor::open(&path).unwrap();
    editor
        .set_string_value(r"Software\Wine\Direct3D", Some("shader_backend"), "glsl")
        .unwrap();
    editor.close();

    let end = section.end as usize;
    let expected = format!("{}\n\"shader_backend\"=\"glsl\"{}", &before[..end], &before[end..]);
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_replace_keeps_surrounding_bytes() {
    let (_dir, path) = fixture_copy();
    let before = fs::read_to_string(&path).unwrap();

    let mut editor = RegistryEditor::open(&path).unwrap();
    editor.set_dword_value(r"Software\Wine\Direct3D", Some("csmt"), 3).unwrap();
    editor.close();

    let expected = before.replacen("\"csmt\"=dword:00000001", "\"csmt\"=dword:00000003", 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_batch_matches_sequential_writes() {
    let (_batch_dir, batch_path) = fixture_copy();
    let (_seq_dir, seq_path) = fixture_copy();
    let key = r"Software\Wine\Direct3D";

    let mut batch = RegistryEditor::open(&batch_path).unwrap();
    batch
        .set_values(
            key,
            &[
                (Some("renderer"), ValueData::from("vulkan")),
                (Some("VideoMemorySize"), ValueData::from("4096")),
                (Some("csmt"), ValueData::Dword(3)),
                (None, ValueData::from("on")),
            ],
        )
        .unwrap();
    batch.close();

    // existing values in file order, then new values in the order given
    let mut sequential = RegistryEditor::open(&seq_path).unwrap();
    sequential.set_dword_value(key, Some("csmt"), 3).unwrap();
    sequential.set_string_value(key, Some("renderer"), "vulkan").unwrap();
    sequential.set_string_value(key, Some("VideoMemorySize"), "4096").unwrap();
    sequential.set_string_value(key, None, "on").unwrap();
    sequential.close();

    assert_eq!(fs::read(&batch_path).unwrap(), fs::read(&seq_path).unwrap());
}

#[test]
fn test_remove_key_subtree() {
    let (_dir, path) = hive_with(
        "[A] 1\n#time=1\n\"x\"=dword:00000001\n\
         \n[A\\\\B] 1\n#time=1\n\
         \n[A\\\\B\\\\C] 1\n#time=1\n\"c\"=\"1\"\n\
         \n[A\\\\B\\\\C\\\\D] 1\n#time=1\n\
         \n[A\\\\B2] 1\n#time=1\n\"k\"=\"v\"\n",
    );

    let mut editor = RegistryEditor::open(&path).unwrap();
    assert!(editor.remove_key(r"A\B", true).unwrap());
    assert!(!editor.key_exists(r"A\B").unwrap());
    assert!(!editor.key_exists(r"A\B\C").unwrap());
    assert!(!editor.key_exists(r"A\B\C\D").unwrap());
    assert!(editor.key_exists(r"A\B2").unwrap());
    assert!(editor.key_exists("A").unwrap());
    editor.close();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "[A] 1\n#time=1\n\"x\"=dword:00000001\n\n[A\\\\B2] 1\n#time=1\n\"k\"=\"v\"\n"
    );
}

#[test]
fn test_remove_key_without_subtree_keeps_children() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert!(editor.remove_key(r"Software\Wine\Direct3D", false).unwrap());
    assert!(!editor.key_exists(r"Software\Wine\Direct3D").unwrap());
    assert!(editor.key_exists(r"Software\Wine\Direct3D\Shaders").unwrap());
    assert!(editor.key_exists(r"Software\Wine\Direct3DX").unwrap());
    assert_eq!(
        editor
            .get_dword_value(r"Software\Wine\Direct3D\Shaders", Some("MaxVersionPS"))
            .unwrap(),
        Some(5)
    );
}

#[test]
fn test_remove_value() {
    let (_dir, path) = fixture_copy();
    let before = fs::read_to_string(&path).unwrap();
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert!(editor.remove_value(r"Control Panel\Desktop", Some("FontSmoothing")).unwrap());
    assert_eq!(editor.get_raw_value(r"Control Panel\Desktop", Some("FontSmoothing")).unwrap(), None);
    assert!(!editor.remove_value(r"Control Panel\Desktop", Some("FontSmoothing")).unwrap());
    editor.close();

    let expected = before.replacen("\"FontSmoothing\"=\"2\"\n", "", 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_missing_key_skipped_without_creation() {
    let (dir, path) = fixture_copy();
    let before = fs::read(&path).unwrap();

    let options = EditorOptions {
        create_key_if_not_exist: false,
        ..EditorOptions::default()
    };
    let mut editor = RegistryEditor::open_with_options(&path, options).unwrap();
    assert!(!editor.set_dword_value(r"Software\Wine\Missing", Some("x"), 1).unwrap());
    assert!(!editor.set_string_values(r"Software\Wine\Missing", &[(Some("a"), "b")]).unwrap());
    // existing keys are still written
    assert!(editor.set_dword_value(r"Software\Wine\Direct3D", Some("csmt"), 0).unwrap());
    editor.close();

    assert_ne!(fs::read(&path).unwrap(), before);
    assert!(!fs::read_to_string(&path).unwrap().contains("Missing"));
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn test_fallback_getters() {
    let (_dir, path) = fixture_copy();
    let editor = RegistryEditor::open(&path).unwrap();

    assert_eq!(
        editor.get_string_value_or(r"Software\Wine\Direct3D", Some("renderer"), "vulkan").unwrap(),
        "gl"
    );
    assert_eq!(
        editor.get_string_value_or(r"Software\Wine\Direct3D", Some("missing"), "vulkan").unwrap(),
        "vulkan"
    );
    assert_eq!(editor.get_dword_value_or(r"Software\Wine\Direct3D", Some("csmt"), 9).unwrap(), 1);
    assert_eq!(editor.get_dword_value_or(r"Software\Nope", Some("csmt"), 9).unwrap(), 9);
}

#[test]
fn test_default_value() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert_eq!(
        editor.get_string_value(r"Software\Wine\Fonts\Replacements", None).unwrap().as_deref(),
        Some("Tahoma")
    );
    assert_eq!(editor.get_string_value(r"Software\Wine\Direct3D", None).unwrap(), None);

    editor.set_string_value(r"Software\Wine\Direct3D", None, "default").unwrap();
    assert_eq!(
        editor.get_raw_value(r"Software\Wine\Direct3D", None).unwrap().as_deref(),
        Some("\"default\"")
    );
    assert!(editor.remove_value(r"Software\Wine\Direct3D", None).unwrap());
    assert_eq!(editor.get_raw_value(r"Software\Wine\Direct3D", None).unwrap(), None);
}

#[test]
fn test_similar_key_names_stay_apart() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert_eq!(editor.get_dword_value(r"Software\Wine\Direct3DX", Some("Enabled")).unwrap(), Some(0));
    assert_eq!(editor.get_dword_value(r"Software\Wine\Direct3D", Some("Enabled")).unwrap(), None);

    editor.set_dword_value(r"Software\Wine\Direct3D", Some("Enabled"), 1).unwrap();
    assert_eq!(editor.get_dword_value(r"Software\Wine\Direct3DX", Some("Enabled")).unwrap(), Some(0));
    assert_eq!(editor.get_dword_value(r"Software\Wine\Direct3D", Some("Enabled")).unwrap(), Some(1));
}

#[test]
fn test_new_key_lands_after_ancestor() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    editor.set_string_value(r"Software\Wine\X11 Driver", Some("Decorated"), "N").unwrap();
    editor.set_string_value(r"Software\Wine\X11 Driver", Some("Managed"), "Y").unwrap();
    editor.set_string_value(r"Software\Wine\DllOverrides", Some("d3d9"), "native").unwrap();
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    let wine = content.find("[Software\\\\Wine\\\\Direct3D]").unwrap();
    let x11 = content.find("[Software\\\\Wine\\\\X11 Driver]").unwrap();
    assert!(x11 > wine);
    assert!(content.contains("\"Decorated\"=\"N\"\n\"Managed\"=\"Y\"\n"));
    assert!(content.contains("\"dxgi\"=\"native\"\n\"d3d9\"=\"native\"\n"));
    // one section each, even after repeated writes
    assert_eq!(content.matches("[Software\\\\Wine\\\\X11 Driver]").count(), 1);

    let editor = RegistryEditor::open(&path).unwrap();
    assert_eq!(
        editor.get_string_value(r"Software\Wine\X11 Driver", Some("Managed")).unwrap().as_deref(),
        Some("Y")
    );
    assert_eq!(
        editor.get_dword_value(r"Software\Wine\Direct3D\Shaders", Some("MaxVersionPS")).unwrap(),
        Some(5)
    );
}

#[test]
fn test_create_key_on_existing_key_is_noop() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    editor.create_key(r"Control Panel\Desktop").unwrap();
    assert!(!editor.is_modified());

    editor.create_key(r"Control Panel\Mouse").unwrap();
    assert!(editor.is_modified());
    assert!(editor.key_exists(r"Control Panel\Mouse").unwrap());
    assert_eq!(editor.get_raw_value(r"Control Panel\Mouse", Some("x")).unwrap(), None);
}

#[test]
fn test_type_mismatch_leaves_session_usable() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    let err = editor.get_dword_value(r"Software\Wine\Direct3D", Some("renderer")).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidDword(_)));

    let err = editor
        .set_hex_string(r"Software\Wine\Direct3D", Some("Blob"), "abc")
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidFormat(_)));
    assert!(!editor.is_modified());

    editor.set_hex_string(r"Software\Wine\Direct3D", Some("Blob"), "0001FF").unwrap();
    assert_eq!(
        editor.get_value(r"Software\Wine\Direct3D", Some("Blob")).unwrap(),
        Some(ValueData::Hex(vec![0x00, 0x01, 0xff]))
    );
}

#[test]
fn test_sibling_writes_through_cache() {
    let (_dir, path) = fixture_copy();
    let mut editor = RegistryEditor::open(&path).unwrap();

    // alternate between siblings so cached positions are reused and reset
    for round in 0..3u32 {
        editor.set_dword_value(r"Software\Wine\Direct3D", Some("round"), round).unwrap();
        editor.set_dword_value(r"Software\Wine\DllOverrides", Some("round"), round).unwrap();
        editor.set_dword_value(r"Control Panel\Desktop", Some("round"), round).unwrap();
    }

    for key in [r"Software\Wine\Direct3D", r"Software\Wine\DllOverrides", r"Control Panel\Desktop"] {
        assert_eq!(editor.get_dword_value(key, Some("round")).unwrap(), Some(2));
    }
    editor.close();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches("\"round\"=").count(), 3);
}

#[test]
fn test_drop_commits_changes() {
    let (_dir, path) = fixture_copy();
    {
        let mut editor = RegistryEditor::open(&path).unwrap();
        editor.set_string_value(r"Control Panel\Desktop", Some("Wallpaper"), "").unwrap();
    }
    assert!(fs::read_to_string(&path).unwrap().contains("\"Wallpaper\"=\"\"\n"));
}

#[test]
fn test_line_breaks_cannot_forge_sections() {
    let (dir, path) = fixture_copy();
    let before = fs::read(&path).unwrap();

    let mut editor = RegistryEditor::open(&path).unwrap();
    let key = r"Software\Wine\Direct3D";

    let err = editor.set_string_value(key, Some("Msg"), "x\n[Evil] 1").unwrap_err();
    assert!(matches!(err, RegistryError::InvalidFormat(_)));
    assert!(editor.set_string_value(key, Some("Two"), "a\r\nb").is_err());
    assert!(editor.set_string_values(key, &[(Some("ok"), "fine"), (Some("Two"), "a\n\nb")]).is_err());
    assert!(editor.set_dword_value(key, Some("x\n[Evil]"), 1).is_err());
    assert!(editor.set_dword_value("Software\n[Evil]", Some("x"), 1).is_err());
    assert!(editor.create_key("Software\\Evil\n[Other]").is_err());

    assert!(!editor.key_exists("Evil").unwrap());
    assert!(!editor.is_modified());
    editor.close();

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(entries(dir.path()), 1);
}

#[test]
fn test_bracket_in_key_name_is_a_distinct_key() {
    let (_dir, path) = hive_with("[a]b] 1\n#time=1\n\"v\"=\"1\"\n");
    let mut editor = RegistryEditor::open(&path).unwrap();

    assert!(!editor.key_exists("a").unwrap());
    assert!(!editor.remove_key("a", false).unwrap());
    assert!(!editor.remove_key("a", true).unwrap());
    assert!(editor.key_exists("a]b").unwrap());
    assert_eq!(editor.get_string_value("a]b", Some("v")).unwrap().as_deref(), Some("1"));
    assert!(!editor.is_modified());
}
