use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

#[tokio::test]
async fn run_fails_before_scanning_when_scenes_are_missing() -> anyhow::Result<()> {
    let suffix = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
    let missing = std::env::temp_dir().join(format!("nuimo-bridge-absent-{suffix}.json"));
    let args = nuimo_bridge::Args::try_parse_from([
        "nuimo-bridge".to_string(),
        "--fake".to_string(),
        "--log-format".to_string(),
        "json".to_string(),
        "--scenes".to_string(),
        missing.display().to_string(),
    ])?;

    let error = nuimo_bridge::run(args)
        .await
        .expect_err("missing scene file should be fatal");

    assert!(format!("{error:#}").contains("failed to load scenes"));
    Ok(())
}

#[tokio::test]
async fn run_rejects_invalid_scene_documents() -> anyhow::Result<()> {
    let suffix = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
    let path = std::env::temp_dir().join(format!("nuimo-bridge-invalid-{suffix}.json"));
    std::fs::write(&path, r#"{ "scenes": { "light": { "press": 1 } } }"#)?;
    let args = nuimo_bridge::Args::try_parse_from([
        "nuimo-bridge".to_string(),
        "--fake".to_string(),
        "--log-format".to_string(),
        "json".to_string(),
        "--scenes".to_string(),
        path.display().to_string(),
    ])?;

    let result = nuimo_bridge::run(args).await;
    std::fs::remove_file(&path)?;

    let error = result.expect_err("malformed scene file should be fatal");
    assert!(format!("{error:#}").contains("scene configuration is malformed"));
    Ok(())
}

#[tokio::test]
async fn run_rejects_yaml_scene_files() -> anyhow::Result<()> {
    let args = nuimo_bridge::Args::try_parse_from([
        "nuimo-bridge",
        "--fake",
        "--log-format",
        "json",
        "--scenes",
        "/nonexistent/scenes.yaml",
    ])?;

    let error = nuimo_bridge::run(args)
        .await
        .expect_err("yaml scene file should be fatal");

    assert!(format!("{error:#}").contains("must be a `.json` or `.toml` file"));
    Ok(())
}
