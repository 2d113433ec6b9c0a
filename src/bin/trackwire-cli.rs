//! CLI для просмотра потоков trackwire.
//!
//! `dump` печатает каждую запись потока строкой JSON, `check` проверяет
//! поток целиком и печатает число записей.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use trackwire::{
    entry::{read_entry, BinaryEntryReader},
    logging::{init_logging, LogFormat},
    Model, Settings,
};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    " ",
    env!("BUILD_TIME"),
    ")"
);

#[derive(Parser)]
#[command(name = "trackwire-cli")]
#[command(version = VERSION)]
#[command(about = "Inspect trackwire entry streams", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Файл настроек (TOML или JSON)
    #[arg(long, global = true, env = "TRACKWIRE_CONFIG")]
    config: Option<PathBuf>,
    /// Уровень логирования (trace/debug/info/warn/error/off)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Формат логов
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormatArg {
    Compact,
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Напечатать записи потока строками JSON
    Dump {
        /// JSON-описание схемы
        #[arg(long, short)]
        schema: PathBuf,
        /// Файл потока; `-` для stdin
        stream: PathBuf,
    },
    /// Проверить поток и напечатать число записей
    Check {
        #[arg(long, short)]
        schema: PathBuf,
        stream: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())
        .with_context(|| match &cli.config {
            Some(path) => format!("loading settings from {}", path.display()),
            None => "loading settings".to_owned(),
        })?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.to_ascii_lowercase();
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format.into();
    }
    settings.validate()?;

    let logging = init_logging(settings.logging.clone())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    debug!(limits = ?settings.limits, "settings loaded");

    let result = match &cli.command {
        Commands::Dump { schema, stream } => dump(&settings, schema, stream),
        Commands::Check { schema, stream } => check(&settings, schema, stream),
    };

    logging.shutdown();
    result
}

fn open_stream(path: &Path) -> Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin().lock())));
    }
    let file = File::open(path).with_context(|| format!("opening stream {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_reader(
    settings: &Settings,
    schema: &Path,
    stream: &Path,
) -> Result<(Model, BinaryEntryReader<Box<dyn Read>>)> {
    let model = Model::from_path(schema)?;
    let ctx = model.value_context().with_limits(settings.limits);
    let reader = BinaryEntryReader::new(open_stream(stream)?, ctx);
    Ok((model, reader))
}

fn dump(
    settings: &Settings,
    schema: &Path,
    stream: &Path,
) -> Result<()> {
    let (model, mut reader) = open_reader(settings, schema, stream)?;
    let mut out = BufWriter::new(io::stdout().lock());

    while let Some(entry) = read_entry(&mut reader, &model)
        .with_context(|| format!("decoding entry #{}", reader.entries_read()))?
    {
        serde_json::to_writer(&mut out, &entry.to_data())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(entries = reader.entries_read(), "stream dumped");
    Ok(())
}

fn check(
    settings: &Settings,
    schema: &Path,
    stream: &Path,
) -> Result<()> {
    let (model, mut reader) = open_reader(settings, schema, stream)?;
    let mut count = 0u64;
    while read_entry(&mut reader, &model)
        .with_context(|| format!("decoding entry #{}", reader.entries_read()))?
        .is_some()
    {
        count += 1;
    }
    println!("{}: {count} entries", stream.display());
    Ok(())
}
