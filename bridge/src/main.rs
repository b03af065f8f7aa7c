use std::path::{Path, PathBuf};
use std::time::Duration;

use unityctl_bridge::{build_router, tailer, AppState, BridgeConfig};
use unityctl_protocol::{
    compute_project_id, editor_log_path, read_descriptor, write_descriptor, ProjectDescriptor,
};

struct Args {
    project: PathBuf,
    port: Option<u16>,
}

/// Minimal arg scan: `--project <path>` and `--port <u16>`. Everything
/// else comes from the config file and `UNITYCTL_*` env vars.
fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut project = PathBuf::from(".");
    let mut port = None;
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--project" => {
                if let Some(value) = argv.get(i + 1) {
                    project = PathBuf::from(value);
                    i += 1;
                }
            }
            "--port" => {
                if let Some(value) = argv.get(i + 1) {
                    port = value.parse().ok();
                    i += 1;
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Usage: unityctl-bridge [--project <path>] [--port <port>]");
                std::process::exit(2);
            }
        }
        i += 1;
    }
    Args { project, port }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unityctl_bridge=info".into()),
        )
        .init();

    let args = parse_args();

    let project_root = std::fs::canonicalize(&args.project).unwrap_or_else(|e| {
        tracing::error!("Project path {} is not usable: {}", args.project.display(), e);
        std::process::exit(1);
    });
    let project_id = compute_project_id(&project_root);

    tracing::info!(
        "=== unityctl-bridge starting === project={} id={} pid={}",
        project_root.display(),
        project_id,
        std::process::id()
    );

    let mut config = BridgeConfig::load(&project_root);
    if let Some(port) = args.port {
        config.port = port;
    }

    if bridge_already_running(&project_root, &project_id).await {
        tracing::error!(
            "Another bridge is already serving this project (per .unityctl/bridge.json); exiting"
        );
        std::process::exit(1);
    }

    let state = AppState::new(config.clone(), project_id.clone(), project_root.clone());

    let _tailer = tailer::spawn(editor_log_path(&project_root), state.logs.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind 127.0.0.1:{}: {}", config.port, e);
            std::process::exit(1);
        });
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(config.port);

    let descriptor = ProjectDescriptor {
        project_id,
        port,
        pid: std::process::id(),
    };
    if let Err(e) = write_descriptor(&project_root, &descriptor) {
        tracing::error!("Failed to write bridge descriptor: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Listening on http://127.0.0.1:{}", port);

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        });

    // The descriptor is intentionally left behind so the editor can find
    // the next bridge instance after a restart.
    tracing::info!("Bridge shut down");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    tracing::info!("Received Ctrl+C, shutting down...");
}

/// Single-instance check: a descriptor alone proves nothing (bridges leave
/// it behind on shutdown), so require a live pid AND a `/health` answer
/// for the same project on the recorded port.
async fn bridge_already_running(project_root: &Path, project_id: &str) -> bool {
    let Some(descriptor) = read_descriptor(project_root) else {
        return false;
    };
    if !pid_alive(descriptor.pid) {
        return false;
    }
    probe_health(descriptor.port, project_id).await
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap liveness check here; the health probe decides.
    true
}

async fn probe_health(port: u16, project_id: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };
    let url = format!("http://127.0.0.1:{}/health", port);
    let Ok(response) = client.get(&url).send().await else {
        return false;
    };
    let Ok(body) = response.json::<serde_json::Value>().await else {
        return false;
    };
    body.get("projectId").and_then(|v| v.as_str()) == Some(project_id)
}
