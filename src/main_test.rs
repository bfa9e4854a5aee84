use super::*;

#[test]
fn library_errors_print_their_code() {
    let err = CliError::from(DslError::NoDslFound);
    assert!(err.to_string().starts_with("[E_DSL_NOT_FOUND] "), "{err}");

    let err = CliError::from(ConfigError::InvalidBool { key: "DRAWKIT_DARK_MODE", value: "dark".into() });
    assert!(err.to_string().starts_with("[E_CONFIG_BOOL] DRAWKIT_DARK_MODE"), "{err}");
}

#[test]
fn chunks_split_on_char_boundaries() {
    let pieces: Vec<&str> = chunks("aé世b", 2).collect();
    assert_eq!(pieces, ["aé", "世", "b"]);
    assert_eq!(pieces.concat(), "aé世b");
}
