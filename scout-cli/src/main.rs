mod picker;
mod render;
mod runners;
mod ui;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scout_core::app::App;
use scout_core::config::{Discovery, ScoutConfig};
use scout_core::event::{AppEvent, EventBus, EventEnvelope, drain_envelopes};
use scout_core::project::{DirField, Environment, OutputStyle, ProjectKey, ProjectRecord};
use scout_core::store::JsonFileStore;

use picker::PromptPicker;
use runners::CompassRunner;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Register Compass projects and watch them", long_about = None)]
struct Cli {
    /// Config file to use instead of discovering one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a project directory; asks for one when omitted
    Add { dir: Option<String> },
    /// Register a project from a dropped file:// uri
    Drop { uri: String },
    /// List registered projects
    List,
    /// Show one project's configuration
    Show { name: String },
    /// Change a project's configuration
    Set {
        name: String,
        #[arg(short, long)]
        environment: Option<Environment>,
        #[arg(short = 's', long)]
        output_style: Option<OutputStyle>,
        #[arg(long)]
        sass_dir: Option<String>,
        #[arg(long)]
        css_dir: Option<String>,
        #[arg(long)]
        javascripts_dir: Option<String>,
        #[arg(long)]
        images_dir: Option<String>,
    },
    /// Choose one of a project's directories interactively
    Pick { name: String, field: DirField },
    /// Remove a project
    Remove { name: String },
    /// Remove every project
    Nuke {
        #[arg(short, long)]
        yes: bool,
    },
    /// Watch projects and stream their output until Ctrl+C
    Watch {
        #[arg(required = true)]
        names: Vec<String>,
        /// Write each project's log as HTML into this directory on exit
        #[arg(long, value_name = "DIR")]
        html: Option<PathBuf>,
    },
    /// Browse, configure and watch projects interactively (the default)
    Ui,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SCOUT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "scout=info,scout_core=info,warn".into())
}

/// Log to stderr, or to `scout.log` in the data directory while the
/// full-screen browser owns the terminal.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());
    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<Discovery> {
    if let Some(path) = explicit {
        let config =
            ScoutConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(Discovery::found(path.to_path_buf(), config));
    }
    let cwd = std::env::current_dir().context("reading current directory")?;
    ScoutConfig::discover(&cwd).context("loading config")
}

/// Called once the subscriber is installed
fn report_config(discovery: &Discovery) {
    if let Some(path) = &discovery.missing_env_path {
        tracing::warn!(path = %path.display(), "SCOUT_CONFIG points at a missing file");
    }
    match &discovery.path {
        Some(path) => tracing::debug!(path = %path.display(), "config loaded"),
        None => tracing::debug!("no config file, using defaults"),
    }
}

async fn cmd_add(app: &mut App, dir: Option<String>) -> Result<()> {
    let key = match dir {
        Some(dir) => {
            let path = std::fs::canonicalize(&dir).with_context(|| format!("resolving {}", dir))?;
            app.create_project_from_dir(&path.to_string_lossy()).await?
        }
        None => {
            let start = std::env::current_dir()?;
            match app.create_project_by_browsing(&PromptPicker, &start).await? {
                Some(key) => key,
                None => return Ok(()),
            }
        }
    };
    print!("{}", render::project_details(&app.project(&key).await?));
    Ok(())
}

async fn cmd_list(app: &App) -> Result<()> {
    let projects = app.projects().await?;
    if projects.is_empty() {
        println!("No projects. Add one with `scout add <dir>`.");
        return Ok(());
    }
    println!("{:<20} {:<12} {:<11} {}", "NAME", "ENVIRONMENT", "STYLE", "DIRECTORY");
    for p in &projects {
        println!("{}", render::project_row(p));
    }
    Ok(())
}

async fn cmd_set(
    app: &mut App,
    name: &str,
    environment: Option<Environment>,
    output_style: Option<OutputStyle>,
    dirs: [(DirField, Option<String>); 4],
) -> Result<()> {
    let key = app.find_by_name(name).await?.key;
    if let Some(environment) = environment {
        app.set_environment(&key, environment).await?;
    }
    if let Some(output_style) = output_style {
        app.set_output_style(&key, output_style).await?;
    }
    for (field, dir) in dirs {
        if let Some(dir) = dir {
            app.set_directory(&key, field, &dir).await?;
        }
    }
    print!("{}", render::project_details(&app.project(&key).await?));
    Ok(())
}

async fn cmd_pick(app: &mut App, name: &str, field: DirField) -> Result<()> {
    let key = app.find_by_name(name).await?.key;
    match app.choose_directory(&key, field, &PromptPicker).await? {
        Some(record) => print!("{}", render::project_details(&record)),
        None => eprintln!("Cancelled, {} unchanged.", name),
    }
    Ok(())
}

async fn cmd_watch(app: &mut App, names: Vec<String>, html: Option<PathBuf>) -> Result<()> {
    let mut events = app.bus().subscribe();
    let mut labels: BTreeMap<ProjectKey, String> = BTreeMap::new();

    let mut records: Vec<ProjectRecord> = Vec::new();
    for name in &names {
        records.push(app.find_by_name(name).await?);
    }
    for record in records {
        labels.insert(record.key.clone(), record.name.clone());
        let outcome = app.start_watching(&record.key).await?;
        if let Err(e) = outcome.into_result(&record.key) {
            eprintln!("{}: {}", record.name, e);
        }
    }

    let mut interrupted = false;
    loop {
        render_events(&labels, drain_envelopes(&mut events));
        if app.active_keys().is_empty() {
            break;
        }

        tokio::select! {
            event = app.next_runner_event() => match event {
                Some(event) => app.handle_runner_event(event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    tracing::warn!("second interrupt, not waiting for watchers");
                    app.stop_all();
                } else {
                    interrupted = true;
                    eprintln!("\nStopping... (Ctrl+C again to force)");
                    for key in app.active_keys() {
                        app.stop_watching(&key).await?;
                    }
                }
            }
        }
    }
    render_events(&labels, drain_envelopes(&mut events));

    if let Some(dir) = html {
        export_html(app, &labels, &dir)?;
    }
    Ok(())
}

fn export_html(app: &App, labels: &BTreeMap<ProjectKey, String>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (key, name) in labels {
        let path = dir.join(format!("{}.html", name));
        let page = render::html_page(name, &app.log_markup(key));
        std::fs::write(&path, page).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("{}log written to {}", render::prefix(name), path.display());
    }
    Ok(())
}

fn render_events(labels: &BTreeMap<ProjectKey, String>, envelopes: Vec<EventEnvelope>) {
    let label = |key: &ProjectKey| labels.get(key).cloned().unwrap_or_else(|| key.to_string());
    for envelope in envelopes {
        match envelope.event {
            AppEvent::NewLogOutput { key, fragments } => {
                print!("{}{}", render::prefix(&label(&key)), render::fragments(&fragments));
            }
            AppEvent::StateChanged { key, state } => {
                eprintln!(
                    "{}{} {}",
                    render::prefix(&label(&key)),
                    render::clock(envelope.at),
                    render::state(state)
                );
            }
            _ => {}
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let discovery = load_config(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Ui);
    let log_file =
        matches!(command, Commands::Ui).then(|| discovery.config.data_dir().join("scout.log"));
    init_tracing(log_file.as_deref())?;
    report_config(&discovery);
    let config = discovery.config;

    let bus = EventBus::default();
    let table = config.table_path();
    let store = JsonFileStore::open(&table, bus.clone())
        .await
        .with_context(|| format!("opening project table {}", table.display()))?;
    tracing::debug!(path = %store.path().display(), "project table open");
    let runner = CompassRunner::new(config.compass.command.clone());
    let mut app = App::new(Arc::new(store), Box::new(runner), bus, config.log_capacity);

    match command {
        Commands::Add { dir } => cmd_add(&mut app, dir).await?,
        Commands::Drop { uri } => {
            let key = app.create_project_by_dropping(&uri).await?;
            print!("{}", render::project_details(&app.project(&key).await?));
        }
        Commands::List => cmd_list(&app).await?,
        Commands::Show { name } => {
            print!("{}", render::project_details(&app.find_by_name(&name).await?));
        }
        Commands::Set {
            name,
            environment,
            output_style,
            sass_dir,
            css_dir,
            javascripts_dir,
            images_dir,
        } => {
            let dirs = [
                (DirField::Sass, sass_dir),
                (DirField::Css, css_dir),
                (DirField::Javascripts, javascripts_dir),
                (DirField::Images, images_dir),
            ];
            cmd_set(&mut app, &name, environment, output_style, dirs).await?
        }
        Commands::Pick { name, field } => cmd_pick(&mut app, &name, field).await?,
        Commands::Remove { name } => {
            let record = app.find_by_name(&name).await?;
            app.delete_project(&record.key).await?;
            println!("Removed {}.", record.name);
        }
        Commands::Nuke { yes } => {
            if !yes {
                bail!("refusing to remove every project without --yes");
            }
            app.nuke_all().await?;
            println!("All projects removed.");
        }
        Commands::Watch { names, html } => cmd_watch(&mut app, names, html).await?,
        Commands::Ui => ui::run(&mut app).await?,
    }

    Ok(())
}
