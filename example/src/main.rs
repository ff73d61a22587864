use down_core::{
    format_duration, format_size, format_speed, DownResult, DownloadConfig, DownloadEvent,
    DownloadStatus, Engine, Settings,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> DownResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Down Core - Concurrent Download Engine Example");

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls.push("http://localhost:8080/1.mp4".to_string()); // A test download file
    }

    // Saved download folder, or the platform default
    let settings = Settings::load();
    println!("Save to: {}", settings.download_path.display());

    let config = DownloadConfig::new()
        .with_max_concurrent_downloads(3)
        .with_speed_smoothing(0.3);
    let engine = Engine::new(config)?;

    let start = std::time::Instant::now();

    let mut ids = Vec::new();
    let mut subscriptions = Vec::new();
    for url in &urls {
        let id = match engine.start_download(url, &settings.download_path) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Skipping {}: {}", url, e);
                continue;
            }
        };
        println!("Start downloading {}: {}", id, url);

        subscriptions.push(engine.subscribe(id, move |event| match event {
            DownloadEvent::Progress { progress, .. } => {
                let percentage = progress
                    .percentage()
                    .map(|p| format!("{:.2}%", p))
                    .unwrap_or_else(|| "?".to_string());
                let total = progress
                    .total()
                    .map(format_size)
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "{} Downloaded: {} ({}/{}), Speed: {}, Time remaining: {}",
                    id,
                    percentage,
                    format_size(progress.downloaded()),
                    total,
                    format_speed(progress.speed()),
                    format_duration(progress.eta().unwrap_or(0))
                );
            }
            DownloadEvent::StatusChanged { status, .. } => println!("{} {}", id, status),
        })?);
        ids.push(id);
    }

    // Cancel everything on Ctrl-C
    let canceller = engine.clone();
    let cancel_ids = ids.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling {} download(s)...", cancel_ids.len());
            for id in cancel_ids {
                let _ = canceller.cancel_download(id);
            }
        }
    });

    for id in ids {
        let download = engine.wait(id).await?;
        match &download.status {
            DownloadStatus::Completed => println!(
                "Completed: {}",
                download
                    .destination_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or(download.file_name)
            ),
            status => println!("{}: {}", download.url, status),
        }
    }

    for subscription in subscriptions {
        subscription.finished().await;
    }

    println!("Done! Time elapsed: {:?}", start.elapsed());

    Ok(())
}
