//! Marquee - media playback server for unattended displays.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marquee::{
    api::{self, ApiState},
    coordinator::{Coordinator, DEFAULT_UPLOAD_LIMIT},
    library::Library,
    poll::{run_poller, PollConfig, PollEvent},
    store::{PresetStore, SelectionStore},
};

/// Media playback server for unattended displays.
#[derive(Parser)]
#[command(name = "marquee", about = "Media playback server for unattended displays")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP daemon.
    Serve {
        /// Address to bind the API server.
        #[arg(long, default_value = "0.0.0.0:8080", env = "MARQUEE_BIND")]
        bind: String,

        /// Media library directory. Defaults to `<data-dir>/media`.
        #[arg(long, env = "MARQUEE_LIBRARY")]
        library: Option<PathBuf>,

        /// Directory for the state files.
        #[arg(long, env = "MARQUEE_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Upload size ceiling in bytes.
        #[arg(long, default_value_t = DEFAULT_UPLOAD_LIMIT, env = "MARQUEE_UPLOAD_LIMIT")]
        upload_limit: u64,
    },

    /// Show daemon status.
    Status {
        /// Marquee API URL.
        #[arg(long, env = "MARQUEE_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
    },

    /// List library files.
    Files {
        /// Marquee API URL.
        #[arg(long, env = "MARQUEE_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
    },

    /// Select a file for display.
    Select {
        /// Filename inside the library.
        file: String,

        /// Marquee API URL.
        #[arg(long, env = "MARQUEE_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
    },

    /// Activate a preset slot.
    Preset {
        /// Slot key, e.g. "1".
        slot: String,

        /// Marquee API URL.
        #[arg(long, env = "MARQUEE_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
    },

    /// Poll the daemon and print every selection change.
    Watch {
        /// Marquee API URL.
        #[arg(long, env = "MARQUEE_API_URL", default_value = "http://localhost:8080")]
        api_url: String,

        /// Polling interval in seconds.
        #[arg(long, default_value_t = 3)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            library,
            data_dir,
            upload_limit,
        } => {
            run_daemon(&bind, library, data_dir, upload_limit).await?;
        }

        Commands::Status { api_url } => {
            show_status(&api_url).await?;
        }

        Commands::Files { api_url } => {
            list_files(&api_url).await?;
        }

        Commands::Select { file, api_url } => {
            send_action(
                &api_url,
                reqwest::Method::POST,
                "/api/v1/select",
                Some(serde_json::json!({ "filename": file })),
            )
            .await?;
        }

        Commands::Preset { slot, api_url } => {
            send_action(
                &api_url,
                reqwest::Method::POST,
                &format!("/api/v1/presets/{slot}/activate"),
                None,
            )
            .await?;
        }

        Commands::Watch { api_url, interval } => {
            watch(&api_url, interval).await;
        }
    }

    Ok(())
}

/// Resolve the data directory, preferring the explicit flag.
fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        directories::ProjectDirs::from("org", "marquee", "marquee")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".marquee"))
    })
}

/// Run the API daemon.
async fn run_daemon(
    bind: &str,
    library: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    upload_limit: u64,
) -> Result<()> {
    tracing::info!("Starting marquee daemon...");

    let data_dir = resolve_data_dir(data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let library_dir = library.unwrap_or_else(|| data_dir.join("media"));
    let library = Library::new(library_dir.clone());
    library.ensure_exists().await?;

    let selection = SelectionStore::open(data_dir.join("selection.txt"))?;
    let presets = PresetStore::open(
        data_dir.join("config.json"),
        library_dir.to_string_lossy().into_owned(),
    );
    // Seed the preset file only if it has never been written.
    presets.init().await?;

    let coordinator = Coordinator::new(library, selection, presets, upload_limit);
    tracing::info!(
        library = %library_dir.display(),
        data_dir = %data_dir.display(),
        "marquee initialized"
    );

    let state = Arc::new(ApiState::new(coordinator));
    api::serve(state, bind).await?;

    Ok(())
}

/// Show daemon status via API.
async fn show_status(api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/status", api_url);

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to get status: {}", response.status());
    }

    let status: serde_json::Value = response.json().await?;

    println!("Marquee Status");
    println!("==============");
    println!("Status:    {}", status["status"]);
    println!("Version:   {}", status["version"]);
    println!("Files:     {}", status["file_count"]);
    println!("Selection: {}", status["selection"]);
    println!("Token:     {}", status["token"]);

    Ok(())
}

/// List library files via API.
async fn list_files(api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/files", api_url);

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to list files: {}", response.status());
    }

    let listing: serde_json::Value = response.json().await?;
    let files = listing["files"].as_array().cloned().unwrap_or_default();

    if files.is_empty() {
        println!("No media files found.");
        return Ok(());
    }

    println!("{:<40} {:<8} {:<12}", "NAME", "KIND", "SIZE");
    println!("{}", "-".repeat(60));

    for file in files {
        println!(
            "{:<40} {:<8} {:<12}",
            file["name"].as_str().unwrap_or("?"),
            file["kind"].as_str().unwrap_or("?"),
            file["size_bytes"].as_u64().unwrap_or(0),
        );
    }

    Ok(())
}

/// Send a control action and print the result envelope.
async fn send_action(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}{}", api_url, path);

    let mut request = client.request(method, &url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let result: serde_json::Value = response.json().await?;

    if result["success"].as_bool() == Some(true) {
        println!("OK: {}", result["message"].as_str().unwrap_or(""));
    } else {
        anyhow::bail!(
            "{} ({})",
            result["message"].as_str().unwrap_or("request failed"),
            result["error"].as_str().unwrap_or("unknown")
        );
    }

    Ok(())
}

/// Poll the display endpoint and print every observed change.
async fn watch(api_url: &str, interval_secs: u64) {
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/display", api_url);

    let config = PollConfig {
        interval: std::time::Duration::from_secs(interval_secs),
        ..Default::default()
    };

    println!("Watching {} (Ctrl-C to stop)", url);

    let fetch = move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let view: serde_json::Value = client.get(&url).send().await?.json().await?;
            let token = view["token"].as_u64().unwrap_or(0);
            let filename = view["filename"].as_str().unwrap_or("(none)").to_string();
            Ok((token, filename))
        }
    };

    run_poller(config, fetch, |event| match event {
        PollEvent::Baseline((token, file)) => {
            println!("baseline: {file} (token {token})");
        }
        PollEvent::Changed((token, file)) => {
            println!("changed:  {file} (token {token})");
        }
        PollEvent::Unchanged => {}
        PollEvent::FetchFailed { failures } => {
            println!("fetch failed ({failures} consecutive)");
        }
        PollEvent::WentOffline => {
            println!("server offline - probing every 30s");
        }
        PollEvent::Recovered { changed } => {
            println!(
                "server back online{}",
                if *changed { " - selection changed while away" } else { "" }
            );
        }
    })
    .await;
}
