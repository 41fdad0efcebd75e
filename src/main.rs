use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use console::Term;
use lora_scan::{
    FsPorts, Hints, IndicatifProgressReporter, LineProgressReporter, NoProgressReporter, ProgressReporter, ScanError,
    YamlFragment, collect_model_files, load_hints, model_stems, open_output, scan_models,
    validate_wildcards, write_dump, write_jinja_overrides, write_list, write_singulars,
    write_split_places, write_summary, write_variants,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Scan safetensors model files and make support files for wildcards
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Target model files or directories
    #[arg(value_name = "TARGET", required = true)]
    targets: Vec<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "warn", value_parser = parse_log_level)]
    log: Level,

    /// JSON file with metadata overrides keyed by model file name
    #[arg(long, value_name = "PATH")]
    hint: Option<PathBuf>,

    /// Output summary info, stdout is used if - is specified
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,

    /// Output metadata dump, stdout is used if - is specified
    #[arg(long, value_name = "PATH")]
    dump: Option<PathBuf>,

    /// Output Jinja macro overriding the base model inferred from file names
    #[arg(long, value_name = "PATH")]
    jinja: Option<PathBuf>,

    /// Output YAML wildcard fragment grouped by base model
    #[arg(long, value_name = "PATH")]
    list: Option<PathBuf>,

    /// Root item name for --list
    #[arg(long, value_name = "NAME", requires = "list")]
    list_root: Option<String>,

    /// Output YAML fragment for models published for several base models
    #[arg(long, value_name = "PATH")]
    variant: Option<PathBuf>,

    /// Root item name for --variant
    #[arg(long, value_name = "NAME", requires = "variant")]
    variant_root: Option<String>,

    /// Output YAML fragment for models without other base model variants
    #[arg(long, value_name = "PATH")]
    singular: Option<PathBuf>,

    /// Root item name for --singular
    #[arg(long, value_name = "NAME", requires = "singular")]
    singular_root: Option<String>,

    /// Report variants stored in more than one directory
    #[arg(long)]
    check_place: bool,

    /// Wildcard files or directories for LoRA name validation
    #[arg(long, value_name = "PATH")]
    validate: Vec<PathBuf>,

    /// Disable the progress spinner
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn wants_fragment(&self) -> bool {
        self.list.is_some() || self.variant.is_some() || self.singular.is_some() || self.check_place
    }

    /// Summary goes to stdout when nothing else was requested.
    fn summary_output(&self) -> Option<PathBuf> {
        let nothing_else = self.jinja.is_none()
            && !self.wants_fragment()
            && self.validate.is_empty()
            && self.dump.is_none();
        match &self.summary {
            Some(path) => Some(path.clone()),
            None if nothing_else => Some(PathBuf::from("-")),
            None => None,
        }
    }

    fn needs_scan(&self) -> bool {
        self.jinja.is_some()
            || self.wants_fragment()
            || self.dump.is_some()
            || self.summary_output().is_some()
    }
}

fn parse_log_level(value: &str) -> Result<Level, String> {
    match value.to_ascii_lowercase().as_str() {
        "critical" | "error" => Ok(Level::ERROR),
        "warning" | "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(format!("invalid log level: {value}")),
    }
}

fn emit<T>(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> io::Result<T>,
) -> Result<T, ScanError> {
    let mut output = open_output(path)?;
    let result = write(&mut output)?;
    output.flush()?;
    Ok(result)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for target in &cli.targets {
        if !target.exists() {
            return Err(format!("target not found: {}", target.display()).into());
        }
    }

    let ports = FsPorts::new();
    let hints = match &cli.hint {
        Some(path) => load_hints(&ports, path)?,
        None => Hints::default(),
    };
    let files = collect_model_files(&ports, &cli.targets)?;

    let models = if cli.needs_scan() {
        let progress: Box<dyn ProgressReporter> = if cli.no_progress {
            Box::new(NoProgressReporter::new())
        } else if Term::stderr().is_term() {
            Box::new(IndicatifProgressReporter::new())
        } else {
            Box::new(LineProgressReporter::new())
        };
        scan_models(&ports, progress.as_ref(), &files, &hints)?
    } else {
        Vec::new()
    };

    if let Some(path) = &cli.jinja {
        emit(path, |out| write_jinja_overrides(out, &models))?;
    }

    if cli.wants_fragment() {
        let fragment = YamlFragment::build(&models);
        if cli.check_place {
            emit(Path::new("-"), |out| write_split_places(out, &fragment))?;
        }
        if let Some(path) = &cli.list {
            emit(path, |out| write_list(out, &fragment, cli.list_root.as_deref()))?;
        }
        if let Some(path) = &cli.variant {
            emit(path, |out| write_variants(out, &fragment, cli.variant_root.as_deref()))?;
        }
        if let Some(path) = &cli.singular {
            emit(path, |out| write_singulars(out, &fragment, cli.singular_root.as_deref()))?;
        }
    }

    if !cli.validate.is_empty() {
        let stems = model_stems(&files);
        let mut stdout = io::stdout().lock();
        let report = validate_wildcards(&ports, &mut stdout, &cli.validate, &stems)?;
        info!(
            "{} unmatched lora references, {} invalid YAML files",
            report.unmatched, report.invalid_yaml
        );
        stdout.flush()?;
    }

    if let Some(path) = &cli.dump {
        emit(path, |out| write_dump(out, &models))?;
    }

    if let Some(path) = cli.summary_output() {
        emit(&path, |out| write_summary(out, &models))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn root_flags_require_their_output() {
        let result = Cli::try_parse_from(["lora-scan", "loras", "--list-root", "loras"]);

        assert_eq!(
            result.err().map(|err| err.kind()),
            Some(ErrorKind::MissingRequiredArgument)
        );
        assert!(Cli::try_parse_from(["lora-scan", "loras", "--list", "out.yaml", "--list-root", "x"]).is_ok());
    }

    #[test]
    fn summary_is_the_default_output() {
        let cli = Cli::try_parse_from(["lora-scan", "loras"]).unwrap();
        assert_eq!(cli.summary_output(), Some(PathBuf::from("-")));

        let cli = Cli::try_parse_from(["lora-scan", "loras", "--jinja", "o.jinja"]).unwrap();
        assert_eq!(cli.summary_output(), None);
    }

    #[test]
    fn validate_alone_skips_metadata_scan() {
        let cli = Cli::try_parse_from(["lora-scan", "loras", "--validate", "a", "--validate", "b"]).unwrap();

        assert_eq!(cli.validate.len(), 2);
        assert!(!cli.needs_scan());
    }

    #[test]
    fn long_log_level_names_are_accepted() {
        assert_eq!(parse_log_level("WARNING"), Ok(Level::WARN));
        assert_eq!(parse_log_level("critical"), Ok(Level::ERROR));
        assert!(parse_log_level("loud").is_err());
    }
}
