use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use image_dataset_builder::config::LoaderConfig;
use image_dataset_builder::core::dataset::{
    ArchiveDescriptor, ArchiveImageDataset, ImageFolder, ImageFolderOptions,
};
use image_dataset_builder::core::{
    load_dataset, ConfigInfos, DatasetBuilder, DatasetInfos, FeatureValue, MetadataPolicy,
    SkipLog, Split, SplitInfo, SplitStream,
};
use image_dataset_builder::fetch::DownloadManager;
use image_dataset_builder::infrastructure::logging::setup_logging;
use image_dataset_builder::publish::{FolderPublisher, Publisher};

mod cli;
use cli::{Cli, Command, SourceArgs};

/// A dataset opened from the command line
enum Source {
    Folder(ImageFolder),
    Archive(ArchiveImageDataset, PathBuf),
}

impl Source {
    /// Where `dataset_infos.json` goes
    fn infos_dir(&self) -> &Path {
        match self {
            Source::Folder(folder) => folder.data_dir(),
            Source::Archive(_, dir) => dir,
        }
    }
}

/// Settings from `--settings`, read before logging exists. A file that cannot be read
/// yields the defaults and a message to log once the subscriber is installed.
fn load_settings(path: Option<&Path>) -> (LoaderConfig, Option<String>) {
    let Some(path) = path else {
        return (LoaderConfig::default(), None);
    };
    match LoaderConfig::read(path) {
        Ok(config) => (config, None),
        Err(e) => (
            LoaderConfig::default(),
            Some(format!("Failed to load settings from {:?}: {}. Using defaults.", path, e)),
        ),
    }
}

fn apply_source_args(config: &mut LoaderConfig, args: &SourceArgs) {
    if args.lenient {
        config.metadata_policy = MetadataPolicy::Lenient;
    }
    if args.drop_labels.is_some() {
        config.drop_labels = args.drop_labels;
    }
    if args.drop_metadata {
        config.drop_metadata = true;
    }
}

fn open_source(args: &SourceArgs, config: &LoaderConfig) -> Result<(Source, DownloadManager)> {
    if args.source.ends_with(".json") {
        let path = PathBuf::from(&args.source);
        let descriptor = ArchiveDescriptor::load(&path)
            .with_context(|| format!("failed to load archive descriptor {:?}", path))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let builder = ArchiveImageDataset::new(descriptor, args.config_name.as_deref())?
            .with_policy(config.metadata_policy);
        let fetcher = DownloadManager::from_config(&base_dir, config);
        return Ok((Source::Archive(builder, base_dir), fetcher));
    }

    if args.config_name.is_some() {
        warn!("--config-name only applies to archive descriptors, ignoring it");
    }
    let mut fetcher = DownloadManager::from_config(".", config);
    let options = ImageFolderOptions::from_config(&args.source, config);
    let folder = ImageFolder::open_with(options, &mut fetcher)
        .with_context(|| format!("failed to open image folder {}", args.source))?;
    Ok((Source::Folder(folder), fetcher))
}

fn print_skips(skips: &SkipLog) {
    let summary = skips.summary();
    if summary.total() == 0 {
        return;
    }
    println!(
        "Skipped {} items ({} dangling references, {} without metadata)",
        summary.total(),
        summary.dangling_references,
        summary.missing_metadata
    );
    for sample in &summary.samples {
        println!("  {}", sample);
    }
}

fn verify<B: DatasetBuilder>(
    builder: &B,
    fetcher: &mut DownloadManager,
    infos_dir: &Path,
    save_infos: bool,
    decode: bool,
) -> Result<()> {
    let info = builder.describe()?;
    info.validate()?;
    let plan = builder.plan_splits(fetcher)?;
    let skips = SkipLog::new();

    println!("{} ({})", builder.name(), builder.config_name());
    let mut splits = Vec::new();
    for generator in &plan {
        let stream = SplitStream::open(builder, &info.features, generator, &skips)?;
        let mut count = 0;
        for record in stream {
            let record = record.with_context(|| format!("split '{}' failed", generator.split))?;
            if decode {
                for value in record.fields.values() {
                    if let FeatureValue::Image(image) = value {
                        image
                            .decode()
                            .with_context(|| format!("record '{}' has an unreadable image", record.key))?;
                    }
                }
            }
            count += 1;
        }
        println!("  {:<12} {:>8} records", generator.split.as_str(), count);
        splits.push(SplitInfo {
            name: generator.split.to_string(),
            num_examples: count,
        });
    }
    print_skips(&skips);

    if save_infos {
        let mut infos = DatasetInfos::default();
        infos
            .configs
            .insert(builder.config_name().to_string(), ConfigInfos { info, splits });
        let path = infos_dir.join(DatasetInfos::FILE_NAME);
        infos.save(&path)?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn inspect<B: DatasetBuilder>(
    builder: &B,
    fetcher: &mut DownloadManager,
    split: Option<&str>,
    limit: usize,
) -> Result<()> {
    let info = builder.describe()?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    let plan = builder.plan_splits(fetcher)?;
    let generator = match split {
        Some(name) => plan.get(&Split::parse(name)),
        None => plan.iter().next(),
    };
    let Some(generator) = generator else {
        bail!(
            "no such split; planned splits: {}",
            plan.splits().map(Split::as_str).collect::<Vec<_>>().join(", ")
        );
    };

    let skips = SkipLog::new();
    let stream = SplitStream::open(builder, &info.features, generator, &skips)?;
    for record in stream.take(limit) {
        let record = record?;
        let fields: serde_json::Map<String, serde_json::Value> = record
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        println!("{}: {}", record.key, serde_json::Value::Object(fields));
    }
    print_skips(&skips);
    Ok(())
}

fn publish<B: DatasetBuilder>(
    builder: &B,
    fetcher: &mut DownloadManager,
    destination: &str,
    out: &Path,
    overwrite: bool,
    test_fraction: Option<f64>,
    seed: u64,
) -> Result<()> {
    let skips = SkipLog::new();
    let mut dataset = load_dataset(builder, fetcher, &skips)?;
    if let Some(fraction) = test_fraction {
        dataset = dataset.train_test_split(&Split::Train, fraction, seed)?;
    }
    let receipt = FolderPublisher::new(out)
        .with_overwrite(overwrite)
        .publish(&dataset, destination)?;
    println!("{}", receipt);
    print_skips(&skips);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, settings_problem) = load_settings(cli.settings.as_deref());
    let log_dir = cli.log_dir.clone().or_else(|| config.log_dir.clone());
    setup_logging(log_dir.as_deref(), cli.verbose).context("failed to set up logging")?;
    if let Some(problem) = settings_problem {
        warn!("{}", problem);
    }
    info!("Cache directory: {:?}", config.cache_dir);

    match cli.command {
        Command::Verify {
            source,
            save_infos,
            decode,
        } => {
            apply_source_args(&mut config, &source);
            let decode = decode || config.verify_images;
            let (dataset, mut fetcher) = open_source(&source, &config)?;
            let dir = dataset.infos_dir().to_path_buf();
            match &dataset {
                Source::Folder(b) => verify(b, &mut fetcher, &dir, save_infos, decode),
                Source::Archive(b, _) => verify(b, &mut fetcher, &dir, save_infos, decode),
            }
        }
        Command::Inspect {
            source,
            split,
            limit,
        } => {
            apply_source_args(&mut config, &source);
            let (dataset, mut fetcher) = open_source(&source, &config)?;
            match &dataset {
                Source::Folder(b) => inspect(b, &mut fetcher, split.as_deref(), limit),
                Source::Archive(b, _) => inspect(b, &mut fetcher, split.as_deref(), limit),
            }
        }
        Command::Publish {
            source,
            destination,
            out,
            overwrite,
            test_fraction,
            seed,
        } => {
            apply_source_args(&mut config, &source);
            let (dataset, mut fetcher) = open_source(&source, &config)?;
            match &dataset {
                Source::Folder(b) => publish(b, &mut fetcher, &destination, &out, overwrite, test_fraction, seed),
                Source::Archive(b, _) => publish(b, &mut fetcher, &destination, &out, overwrite, test_fraction, seed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_unreadable_settings_are_reported_after_loading() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json")?;

        let (config, problem) = load_settings(Some(&path));
        assert_eq!(config.metadata_policy, MetadataPolicy::Strict);
        assert!(problem.is_some_and(|p| p.contains("settings.json")));

        fs::write(&path, r#"{"metadata_policy": "lenient"}"#)?;
        let (config, problem) = load_settings(Some(&path));
        assert_eq!(config.metadata_policy, MetadataPolicy::Lenient);
        assert!(problem.is_none());

        assert!(load_settings(None).1.is_none());
        Ok(())
    }
}
