// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald status` command implementation.
//!
//! Queries the gateway health endpoint and reports whether the server is
//! running and for how long.

use std::io::IsTerminal;
use std::time::Duration;

use herald_config::HeraldConfig;
use herald_core::HeraldError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    version: Option<String>,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub host: String,
    pub port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Wildcard bind addresses are probed on loopback.
fn probe_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "::1",
        other => other,
    }
}

/// Run the `herald status` command.
pub async fn run_status(config: &HeraldConfig, json: bool, plain: bool) -> Result<(), HeraldError> {
    let host = probe_host(&config.server.host).to_string();
    let port = config.server.port;
    let url = if host.contains(':') {
        format!("http://[{host}]:{port}/health")
    } else {
        format!("http://{host}:{port}/health")
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| HeraldError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Some(
            resp.json::<HealthResponse>()
                .await
                .map_err(|e| HeraldError::Internal(format!("failed to parse health response: {e}")))?,
        ),
        _ => None,
    };

    let response = match health {
        Some(health) => StatusResponse {
            running: true,
            uptime_human: Some(format_uptime(health.uptime_secs)),
            status: health.status,
            version: health.version,
            uptime_secs: Some(health.uptime_secs),
            host,
            port,
        },
        None => StatusResponse {
            running: false,
            status: "not running".to_string(),
            version: None,
            uptime_secs: None,
            uptime_human: None,
            host,
            port,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        if response.running {
            print_status_running(&response, use_color);
        } else {
            print_status_offline(&url, use_color);
        }
    }

    Ok(())
}

fn print_status_running(response: &StatusResponse, use_color: bool) {
    let uptime = response.uptime_human.as_deref().unwrap_or("?");
    println!();
    println!("  herald status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!(
            "    State:    {} {} (uptime: {})",
            "✓".green(),
            response.status.green(),
            uptime
        );
    } else {
        println!("    State:    [OK] {} (uptime: {uptime})", response.status);
    }
    if let Some(version) = &response.version {
        println!("    Version:  {version}");
    }
    println!();
}

fn print_status_offline(url: &str, use_color: bool) {
    println!();
    println!("  herald status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    State:    {} {}", "✗".red(), "not running".red());
    } else {
        println!("    State:    [FAIL] not running");
    }

    println!("    Endpoint: {url}");
    println!();
    println!("  Start with: herald serve");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[test]
    fn wildcard_hosts_probe_loopback() {
        assert_eq!(probe_host("0.0.0.0"), "127.0.0.1");
        assert_eq!(probe_host("::"), "::1");
        assert_eq!(probe_host("10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn health_response_parses_gateway_body() {
        let health: HealthResponse =
            serde_json::from_str(r#"{"status":"healthy","version":"0.1.0","uptime_secs":42}"#)
                .unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.uptime_secs, 42);
    }

    #[test]
    fn status_response_offline_serializes() {
        let resp = StatusResponse {
            running: false,
            status: "not running".to_string(),
            version: None,
            uptime_secs: None,
            uptime_human: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"running\":false"));
    }
}
