use anyhow::{Context, Result};
use rmcp::{model::CallToolRequestParam, service::ServiceExt, transport::TokioChildProcess};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

fn locate_server_bin() -> Result<PathBuf> {
    if let Some(path) = option_env!("CARGO_BIN_EXE_error-collector-mcp") {
        return Ok(PathBuf::from(path));
    }

    // `.../target/{debug|release}/deps/<test>` → `.../target/{debug|release}/error-collector-mcp`
    if let Ok(exe) = std::env::current_exe() {
        if let Some(target_profile_dir) = exe.parent().and_then(|p| p.parent()) {
            let candidate = target_profile_dir.join("error-collector-mcp");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    anyhow::bail!("failed to locate error-collector-mcp binary")
}

#[tokio::test]
async fn stdio_server_ingests_and_serves_errors() -> Result<()> {
    let bin = locate_server_bin()?;
    let temp = tempfile::TempDir::new().context("tempdir")?;

    let mut cmd = Command::new(bin);
    cmd.env("ERROR_COLLECTOR_CONFIG", temp.path().join("absent.toml"));
    cmd.env("ERROR_COLLECTOR_DATA_DIR", temp.path().join("data"));
    cmd.env_remove("ERROR_COLLECTOR_API_KEY");
    cmd.env_remove("OPENROUTER_API_KEY");
    cmd.env("RUST_LOG", "warn");

    let transport = TokioChildProcess::new(cmd).context("spawn mcp server")?;
    let service = tokio::time::timeout(Duration::from_secs(10), ().serve(transport))
        .await
        .context("timeout starting MCP server")??;

    let tools = tokio::time::timeout(
        Duration::from_secs(10),
        service.list_tools(Default::default()),
    )
    .await
    .context("timeout listing tools")??;
    let tool_names: HashSet<&str> = tools.tools.iter().map(|t| t.name.as_ref()).collect();
    for expected in [
        "query_errors",
        "get_error_summary",
        "get_error_statistics",
        "report_error",
    ] {
        assert!(tool_names.contains(expected), "missing tool {expected}");
    }

    let report_args = serde_json::json!({
        "source": "terminal",
        "message": "npm ERR! code ERESOLVE unable to resolve dependency tree",
        "context": { "command": "npm install", "exit_code": 1 },
    });
    let reported = tokio::time::timeout(
        Duration::from_secs(10),
        service.call_tool(CallToolRequestParam {
            name: "report_error".into(),
            arguments: report_args.as_object().cloned(),
        }),
    )
    .await
    .context("timeout calling report_error")??;
    assert_ne!(reported.is_error, Some(true), "report_error returned error");

    let query_args = serde_json::json!({ "time_range": "1h", "sources": ["terminal"] });
    let queried = tokio::time::timeout(
        Duration::from_secs(10),
        service.call_tool(CallToolRequestParam {
            name: "query_errors".into(),
            arguments: query_args.as_object().cloned(),
        }),
    )
    .await
    .context("timeout calling query_errors")??;
    let text = queried
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.as_str())
        .context("query_errors missing text output")?;
    let body: serde_json::Value = serde_json::from_str(text).context("query_errors JSON")?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["errors"][0]["category"], "resource");

    let summary_args = serde_json::json!({ "action": "list_recent" });
    let summaries = tokio::time::timeout(
        Duration::from_secs(10),
        service.call_tool(CallToolRequestParam {
            name: "get_error_summary".into(),
            arguments: summary_args.as_object().cloned(),
        }),
    )
    .await
    .context("timeout calling get_error_summary")??;
    assert_ne!(summaries.is_error, Some(true));

    service.cancel().await.context("shutdown client")?;
    Ok(())
}
