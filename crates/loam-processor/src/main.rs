use bytes::Bytes;
use futures::future::join_all;
use log::{error, info, warn, LevelFilter};
use loam_common::{ChunkCoords, Result};
use loam_logger::{log_with, LogSeverity};
use loam_processor::{ChunkProcessor, ProcessorConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "Usage: loam <config.json|-> <chunk-file>...";

/// `-` means defaults plus overrides looked up through `env`.
fn load_config<F>(arg: &str, env: F) -> Result<ProcessorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if arg == "-" {
        let mut config = ProcessorConfig::default();
        config.apply_env(env)?;
        config.validate()?;
        return Ok(config);
    }
    ProcessorConfig::from_path(arg)
}

/// `<cx>_<cz>.bin` names carry the chunk coordinates.
fn coords_from_path(path: &Path) -> ChunkCoords {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse().ok())
        .unwrap_or(ChunkCoords::new(0, 0))
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        log_with(USAGE.to_owned(), LogSeverity::Error);
        std::process::exit(2);
    }

    let config = match load_config(&args[0], |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(err) => {
            log_with(format!("Failed to load config: {}", err), LogSeverity::Fatal);
            std::process::exit(1);
        }
    };
    if let Err(err) = loam_logger::init(config.level_filter().unwrap_or(LevelFilter::Info)) {
        log_with(format!("Logger already set: {}", err), LogSeverity::Warning);
    }
    info!("Loam init, {} worker threads", config.worker_threads);

    let decoder = match config.load_decoder() {
        Ok(decoder) => decoder,
        Err(err) => {
            error!("Failed to load block tables: {}", err);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let processor = Arc::new(ChunkProcessor::new(
        &config,
        Arc::new(decoder),
        cancel.clone(),
    ));

    let mut pending = Vec::new();
    for file in &args[1..] {
        let data = match tokio::fs::read(file).await {
            Ok(data) => data,
            Err(err) => {
                error!("Failed to read {}: {}", file, err);
                continue;
            }
        };
        let coords = coords_from_path(Path::new(file));
        let decode = processor.decode_async(Bytes::from(data), coords.x, coords.z);
        pending.push(async move { (file, coords, decode.await) });
    }

    for (file, coords, result) in join_all(pending).await {
        match result {
            Some(column) => info!(
                "{} ({}): {} sections, {} non-air blocks, {} block entities",
                file,
                coords,
                column.section_count(),
                column.non_air_count(),
                column.block_entities().len()
            ),
            None => warn!("{} ({}): not decoded", file, coords),
        }
    }

    let stats = processor.stats();
    let translator = processor.decoder().translator();
    info!(
        "Decoded {} chunks, dropped {}, peak {} concurrent decodes, {} unresolved block ids",
        stats.decoded,
        stats.dropped,
        stats.peak_active_decodes,
        translator.unresolved_count()
    );

    let pool = processor.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
        error!("Shutdown failed: {}", err);
    }
}
