// Helper functions shared by the engine backend and the presentation layer

use std::process::Stdio;

use time::macros::format_description;
use time::Date;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::config::EngineConfig;

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", timeout_secs))
        }
    }
}

/// Network, retry and certificate flags for yt-dlp
pub fn network_args(config: &EngineConfig) -> Vec<String> {
    let mut args = vec![
        "--socket-timeout".to_string(),
        config.socket_timeout_secs.to_string(),
        "--retries".to_string(),
        config.retries.to_string(),
        "--fragment-retries".to_string(),
        config.fragment_retries.to_string(),
        "--extractor-retries".to_string(),
        config.extractor_retries.to_string(),
        "--user-agent".to_string(),
        config.user_agent.clone(),
    ];

    if !config.check_certificates {
        args.push("--no-check-certificates".to_string());
    }

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// "1:02:03" / "4:05", or "Unknown" when the duration is missing
pub fn format_duration(seconds: Option<u64>) -> String {
    let total = match seconds {
        Some(s) if s > 0 => s,
        _ => return "Unknown".to_string(),
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub fn format_view_count(count: Option<u64>) -> String {
    match count {
        None | Some(0) => "Unknown views".to_string(),
        Some(c) if c >= 1_000_000 => format!("{:.1}M views", c as f64 / 1_000_000.0),
        Some(c) if c >= 1_000 => format!("{:.1}K views", c as f64 / 1_000.0),
        Some(c) => format!("{} views", c),
    }
}

/// Engine dates come as YYYYMMDD; shown as DD/MM/YYYY
pub fn format_upload_date(raw: &str) -> Option<String> {
    let date = Date::parse(raw, format_description!("[year][month][day]")).ok()?;
    date.format(format_description!("[day]/[month]/[year]")).ok()
}

/// Byte count in binary units, e.g. "12.3MiB"
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}
