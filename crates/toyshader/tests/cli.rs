use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

fn toyshader(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_toyshader"))
        .env_remove("SHADERTOY_API_KEY")
        .env("RUST_LOG", "error")
        .args(args)
        .output()
        .expect("failed to run toyshader")
}

#[test]
fn id_without_api_key_fails() {
    let output = toyshader(&["--id", "XsBSRG"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("API key"));
}

#[test]
fn id_and_files_together_fail() {
    let output = toyshader(&["--id", "XsBSRG", "--api-key", "k", "shader.glsl"]);
    assert!(!output.status.success());
}

#[test]
fn more_than_one_bundle_fails() {
    let output = toyshader(&["a.json", "b.json"]);
    assert!(!output.status.success());
}

#[test]
fn keyboard_channel_outside_range_fails() {
    let output = toyshader(&["--keyboard", "4", "shader.glsl"]);
    assert!(!output.status.success());
}

#[test]
fn bad_geometry_and_numbers_fail() {
    assert!(!toyshader(&["--geometry", "640by360", "shader.glsl"]).status.success());
    assert!(!toyshader(&["--fps", "0", "shader.glsl"]).status.success());
    assert!(!toyshader(&["--speedup", "fast", "shader.glsl"]).status.success());
}

#[test]
fn missing_input_file_fails_before_opening_a_window() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.glsl");
    let output = toyshader(&[missing.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn unsupported_bundle_input_fails_before_opening_a_window() {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("music.json");
    fs::write(
        &bundle,
        r#"{"Shader":{"info":{"name":"music"},"renderpass":[
            {"name":"Image","type":"image","code":"void mainImage(out vec4 c, in vec2 f) { c = vec4(0.0); }",
             "inputs":[{"id":1,"channel":0,"ctype":"music","src":"/media/a/track.mp3"}],
             "outputs":[{"id":37,"channel":0}]}]}}"#,
    )
    .unwrap();
    let output = toyshader(&[bundle.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("music"));
}

#[test]
fn unresolved_buffer_fails_before_opening_a_window() {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("dangling.json");
    fs::write(
        &bundle,
        r#"{"Shader":{"info":{"name":"dangling"},"renderpass":[
            {"name":"Image","type":"image","code":"",
             "inputs":[{"id":99,"channel":0,"ctype":"buffer"}]}]}}"#,
    )
    .unwrap();
    let output = toyshader(&[bundle.to_str().unwrap()]);
    assert!(!output.status.success());
}
