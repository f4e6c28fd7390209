use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studio_contracts::archive::{
    ArchiveBackend, ArchiveExporter, ExportReport, ZipDirectoryBackend,
};
use studio_contracts::codec;
use studio_contracts::history::DisclaimerGate;
use studio_contracts::models::{AppMode, AspectRatio, StoredImage};
use studio_contracts::session::{parse_intent, SESSION_HELP_COMMANDS};
use studio_contracts::storage::JsonFileStore;
use studio_engine::{
    service_for, FlowError, InputImage, PendingReuse, StudioConfig, StudioEngine, SERVICE_NAMES,
};
use tracing_subscriber::EnvFilter;

const DISCLAIMER: &str = "Images are produced by a third-party generative model. Do not upload \
images you do not have rights to, and review results before sharing them.";

#[derive(Debug, Parser)]
#[command(name = "studio", version, about = "Generate, remix and archive images")]
struct Cli {
    /// Directory holding history state, events and exports.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Image service: auto, gemini or dryrun.
    #[arg(long, global = true, default_value = "auto")]
    provider: String,
    #[arg(long, global = true)]
    accept_disclaimer: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Remix(RemixArgs),
    #[command(subcommand)]
    History(HistoryCommand),
    Export(ExportArgs),
    Acknowledge,
    Session,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "1:1")]
    aspect_ratio: AspectRatio,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RemixArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Remove {
        id: String,
    },
    Clear,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, conflicts_with = "ids")]
    all: bool,
    ids: Vec<String>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = StudioConfig::from_env();
    if let Some(data_dir) = cli.data_dir.clone() {
        config = config.with_data_dir(data_dir);
    }

    match cli.command {
        Command::Acknowledge => {
            disclaimer_gate(&config).acknowledge()?;
            println!("Disclaimer acknowledged.");
            Ok(0)
        }
        Command::Generate(ref args) => {
            ensure_disclaimer(&config, cli.accept_disclaimer)?;
            let mut engine = open_engine(&cli, &config)?;
            let entry = engine.submit_generate(&args.prompt, args.aspect_ratio)?;
            report_created(&entry, args.out.as_deref())?;
            Ok(0)
        }
        Command::Remix(ref args) => {
            ensure_disclaimer(&config, cli.accept_disclaimer)?;
            let mut engine = open_engine(&cli, &config)?;
            let image = InputImage::from_path(&args.image)?;
            let result = engine.submit_remix(&args.prompt, &image)?;
            report_created(&result.entry, args.out.as_deref())?;
            println!("{}", result.text);
            Ok(0)
        }
        Command::History(ref command) => {
            let mut engine = open_engine(&cli, &config)?;
            run_history(&mut engine, command)?;
            Ok(0)
        }
        Command::Export(ref args) => {
            let mut engine = open_engine(&cli, &config)?;
            engine.set_exporter(exporter_for(&args.out));
            let report = if args.all {
                engine.export_all()?
            } else if args.ids.is_empty() {
                bail!("select images to export by id, or pass --all");
            } else {
                engine.export(&args.ids)?
            };
            print_export(&report);
            Ok(0)
        }
        Command::Session => {
            ensure_disclaimer(&config, cli.accept_disclaimer)?;
            let mut engine = open_engine(&cli, &config)?;
            run_session(&mut engine)?;
            Ok(0)
        }
    }
}

fn open_engine(cli: &Cli, config: &StudioConfig) -> Result<StudioEngine<JsonFileStore>> {
    let service = service_for(&cli.provider, config).with_context(|| {
        format!(
            "failed to set up image service (known services: {})",
            SERVICE_NAMES.join(", ")
        )
    })?;
    let events_path = cli.events.clone().unwrap_or_else(|| config.events_path());
    StudioEngine::open_with_events(config, service, events_path)
}

fn disclaimer_gate(config: &StudioConfig) -> DisclaimerGate<JsonFileStore> {
    DisclaimerGate::new(JsonFileStore::new(config.state_path()))
}

fn ensure_disclaimer(config: &StudioConfig, accept: bool) -> Result<()> {
    let gate = disclaimer_gate(config);
    if gate.is_acknowledged() {
        return Ok(());
    }
    if accept {
        gate.acknowledge()?;
        return Ok(());
    }
    bail!("{DISCLAIMER}\nRun `studio acknowledge` or pass --accept-disclaimer to continue.")
}

fn exporter_for(out_dir: &Path) -> ArchiveExporter<Box<dyn ArchiveBackend>> {
    let backend: Box<dyn ArchiveBackend> = Box::new(ZipDirectoryBackend::new(out_dir));
    ArchiveExporter::new(backend)
}

fn report_created(entry: &StoredImage, out: Option<&Path>) -> Result<()> {
    println!("Created {} ({})", entry.id, entry.kind);
    if let Some(path) = out {
        let blob = codec::decode(&entry.image_data_url)?;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        fs::write(path, &blob.bytes)
            .with_context(|| format!("failed writing {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn run_history(engine: &mut StudioEngine<JsonFileStore>, command: &HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List { json } => {
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(engine.history().entries())?
                );
            } else {
                print_history(engine.history().entries());
            }
        }
        HistoryCommand::Remove { id } => {
            if engine.remove(id) {
                println!("Removed {id}");
            } else {
                println!("No history entry with id '{id}'.");
            }
        }
        HistoryCommand::Clear => {
            engine.clear_history();
            println!("History cleared.");
        }
    }
    if let Some(warning) = engine.history().persistence_warning() {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn print_history(entries: &[StoredImage]) {
    if entries.is_empty() {
        println!("Your history is empty.");
        return;
    }
    for entry in entries {
        let ratio = entry
            .aspect_ratio
            .map(|ratio| ratio.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<8}  {:<4}  {}  \"{}\"",
            entry.id, entry.kind, ratio, entry.timestamp, entry.prompt
        );
    }
}

fn print_export(report: &ExportReport) {
    println!(
        "Exported {} image(s) to {}",
        report.file_names.len(),
        report.path.display()
    );
}

/// Form state the tabs would otherwise hold.
#[derive(Debug, Default)]
struct SessionForm {
    prompt: Option<String>,
    aspect_ratio: AspectRatio,
    input_image: Option<InputImage>,
}

impl SessionForm {
    fn apply(&mut self, pending: PendingReuse) {
        match pending {
            PendingReuse::Generate {
                prompt,
                aspect_ratio,
            } => {
                self.aspect_ratio = aspect_ratio;
                println!("Generate form restored ({aspect_ratio}): {prompt}");
                println!("Type /again to submit it, or type a new prompt.");
                self.prompt = Some(prompt);
            }
            PendingReuse::Remix { image } => {
                println!("Remix form restored with {}", image.name());
                self.input_image = Some(image);
            }
        }
    }
}

fn run_session(engine: &mut StudioEngine<JsonFileStore>) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    let mut form = SessionForm::default();

    println!(
        "Image studio session started with the {} service. Type /help for commands.",
        engine.service_name()
    );

    loop {
        print!("{}> ", engine.mode());
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                println!("Commands: {}", SESSION_HELP_COMMANDS.join(" "));
            }
            "quit" => break,
            "set_mode" => {
                let mode = intent
                    .arg_str("mode")
                    .and_then(|value| value.parse::<AppMode>().ok())
                    .unwrap_or_default();
                engine.select_mode(mode);
                if mode == AppMode::History {
                    print_history(engine.history().entries());
                }
            }
            "set_aspect_ratio" => match intent.arg_str("value").unwrap_or("").parse() {
                Ok(ratio) => {
                    form.aspect_ratio = ratio;
                    println!("Aspect ratio set to {ratio}");
                }
                Err(message) => println!("{message}"),
            },
            "set_input_image" => {
                let path = intent.arg_str("path").unwrap_or("");
                if path.is_empty() {
                    println!("/image requires a path");
                    continue;
                }
                match InputImage::from_path(Path::new(path)) {
                    Ok(image) => {
                        println!("Image selected: {}", image.name());
                        form.input_image = Some(image);
                    }
                    Err(err) => println!("{err}"),
                }
            }
            "reuse" => match engine.reuse(intent.arg_str("id").unwrap_or("")) {
                Ok(_) => {
                    if let Some(pending) = engine.take_pending() {
                        form.apply(pending);
                    }
                }
                Err(err) => println!("{err}"),
            },
            "delete" => {
                let id = intent.arg_str("id").unwrap_or("");
                if engine.remove(id) {
                    println!("Removed {id}");
                } else {
                    println!("No history entry with id '{id}'.");
                }
            }
            "clear_history" => {
                engine.clear_history();
                println!("History cleared.");
            }
            "export" => {
                let out = intent.arg_str("out").unwrap_or("");
                if out.is_empty() {
                    println!("/export requires an output directory");
                    continue;
                }
                engine.set_exporter(exporter_for(Path::new(out)));
                let ids = intent.arg_strings("ids");
                let result = if ids.is_empty() {
                    engine.export_all()
                } else {
                    engine.export(&ids)
                };
                match result {
                    Ok(report) => print_export(&report),
                    Err(err) => println!("{err}"),
                }
            }
            "submit" => {
                form.prompt = intent.prompt.clone();
                submit_in_mode(engine, &form);
            }
            "resubmit" => {
                if form.prompt.is_some() {
                    submit_in_mode(engine, &form);
                } else {
                    println!("No prompt to submit yet.");
                }
            }
            "unknown" => {
                println!(
                    "Unknown command /{}. Type /help for commands.",
                    intent.arg_str("command").unwrap_or("")
                );
            }
            other => {
                tracing::debug!(action = other, "unhandled session action");
            }
        }
        if let Some(warning) = engine.history().persistence_warning() {
            println!("warning: {warning}");
        }
    }
    Ok(())
}

fn submit_in_mode(engine: &mut StudioEngine<JsonFileStore>, form: &SessionForm) {
    let prompt = form.prompt.as_deref().unwrap_or("");
    let outcome: Result<(), FlowError> = match engine.mode() {
        AppMode::Generate => {
            println!("Generating...");
            engine
                .submit_generate(prompt, form.aspect_ratio)
                .map(|entry| println!("Created {} ({})", entry.id, form.aspect_ratio))
        }
        AppMode::Remix => {
            let Some(image) = form.input_image.as_ref() else {
                println!("Select an image with /image PATH first.");
                return;
            };
            println!("Remixing {}...", image.name());
            engine.submit_remix(prompt, image).map(|result| {
                println!("Created {}", result.entry.id);
                println!("{}", result.text);
            })
        }
        AppMode::History => {
            println!("Switch to /generate or /remix to submit a prompt.");
            return;
        }
    };
    if let Err(err) = outcome {
        println!("{err}");
    }
}
