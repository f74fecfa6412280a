use rimorder_preset::{decode, encode, stats, validate, Preset, PRESET_PREFIX};

fn sample_preset() -> Preset {
    Preset {
        name: "Colony Essentials".to_string(),
        package_ids: vec![
            "Brrainz.Harmony".to_string(),
            "ludeon.rimworld".to_string(),
            "some.mod".to_string(),
        ],
        workshop_ids: vec!["2009463077".to_string()],
        created_at: "2026-08-06T12:00:00".to_string(),
        description: "starter pack".to_string(),
        author: "tester".to_string(),
        game_version: "1.5".to_string(),
    }
}

#[test]
fn encode_then_decode_preserves_everything() {
    let preset = sample_preset();
    let code = encode(&preset).unwrap();
    assert!(code.starts_with("RMM:v1:"));

    let back = decode(&code).unwrap();
    assert_eq!(back, preset);
}

#[test]
fn decode_tolerates_surrounding_whitespace() {
    let code = encode(&sample_preset()).unwrap();
    let padded = format!("  {code}\n");
    assert_eq!(decode(&padded).unwrap(), sample_preset());
}

#[test]
fn empty_name_becomes_imported_preset() {
    let preset = Preset {
        package_ids: vec!["a.mod".to_string()],
        ..Preset::default()
    };
    let back = decode(&encode(&preset).unwrap()).unwrap();
    assert_eq!(back.name, "Imported Preset");
}

#[test]
fn decode_rejects_foreign_prefix() {
    let code = encode(&sample_preset()).unwrap();
    let foreign = code.replacen(PRESET_PREFIX, "XYZ", 1);
    let err = decode(&foreign).unwrap_err().to_string();
    assert!(err.contains("prefix"), "got: {err}");
}

#[test]
fn decode_rejects_mangled_payload() {
    assert!(decode("RMM:v1:!!!not-base64!!!").is_err());
    assert!(decode("RMM:v1:aGVsbG8=").is_err()); // valid base64, not zlib
    assert!(decode("RMM").is_err());
    assert!(decode("RMM:one:abc").is_err());
}

#[test]
fn newer_version_still_attempts_decode() {
    let code = encode(&sample_preset()).unwrap();
    let payload = code.splitn(3, ':').nth(2).unwrap();
    let newer = format!("RMM:v2:{payload}");
    assert_eq!(decode(&newer).unwrap(), sample_preset());
}

#[test]
fn validate_flags_empty_presets() {
    let empty = encode(&Preset::default()).unwrap();
    let (ok, msg) = validate(&empty);
    assert!(!ok);
    assert!(msg.contains("no mods"), "got: {msg}");

    let (ok, msg) = validate("");
    assert!(!ok);
    assert!(msg.contains("empty"), "got: {msg}");

    let (ok, msg) = validate(&encode(&sample_preset()).unwrap());
    assert!(ok);
    assert!(msg.contains("3 mods"), "got: {msg}");
}

#[test]
fn stats_summarize_without_mutating() {
    let code = encode(&sample_preset()).unwrap();
    let info = stats(&code).unwrap();
    assert_eq!(info.name, "Colony Essentials");
    assert_eq!(info.mod_count, 3);
    assert_eq!(info.workshop_count, 1);
    assert_eq!(info.author, "tester");
    assert_eq!(info.code_length, code.len());
}
