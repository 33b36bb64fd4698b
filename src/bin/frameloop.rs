use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "frameloop", version)]
struct Cli {
    /// Runtime config JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the apps directory from the config.
    #[arg(long, global = true)]
    apps_dir: Option<PathBuf>,

    /// Override the catalog URL from the config.
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Log level for frameloop targets (`RUST_LOG` wins when set).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install or update an app from the catalog.
    Install {
        /// App id.
        id: String,
    },
    /// Remove an installed app.
    Uninstall {
        /// App id.
        id: String,
    },
    /// List installed apps with their render health.
    List,
    /// Print the config schema of an installed app or a source file as JSON.
    Schema(SchemaArgs),
    /// Show the stored config of an app, or replace it with `key=value` pairs.
    Config {
        /// App id.
        id: String,
        /// New values. Without any, the current values are printed.
        values: Vec<String>,
    },
    /// Include an app in the rotation.
    Enable {
        /// App id.
        id: String,
    },
    /// Exclude an app from the rotation.
    Disable {
        /// App id.
        id: String,
    },
    /// Render an app once and write the scaled frames as PNGs.
    Render {
        /// App id.
        id: String,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the display loop, logging what is on screen.
    Run {
        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Parser, Debug)]
struct SchemaArgs {
    /// Installed app id.
    #[arg(required_unless_present = "source", conflicts_with = "source")]
    id: Option<String>,

    /// Extract from a source file instead of an installed app.
    #[arg(long)]
    source: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => frameloop::RuntimeConfig::load(path)?,
        None => frameloop::RuntimeConfig::default(),
    };
    if let Some(dir) = cli.apps_dir {
        cfg.apps_dir = dir;
    }
    if let Some(url) = cli.catalog {
        cfg.catalog_url = Some(url);
    }
    let level = cli.log_level.as_deref().unwrap_or(&cfg.log.level).to_owned();
    frameloop::init_logging(&level, cfg.log.json);

    match cli.cmd {
        Command::Schema(SchemaArgs {
            source: Some(path), ..
        }) => cmd_schema_source(&path),
        cmd => {
            let runtime = frameloop::AppRuntime::new(cfg)?;
            let result = dispatch(&runtime, cmd);
            runtime.shutdown();
            result
        }
    }
}

fn dispatch(runtime: &frameloop::AppRuntime, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Install { id } => {
            let record = runtime.install(&app_id(&id)?)?;
            println!("installed {} ({})", record.id, record.name);
            // Let the first render land so the app is ready to show.
            runtime.wait_idle(runtime.config().renderer.timeout() + Duration::from_secs(5));
            Ok(())
        }
        Command::Uninstall { id } => {
            runtime.uninstall(&app_id(&id)?)?;
            println!("uninstalled {id}");
            Ok(())
        }
        Command::List => cmd_list(runtime),
        Command::Schema(SchemaArgs { id, .. }) => {
            let id = id.context("app id or --source required")?;
            let schema = runtime.get_schema(&app_id(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Config { id, values } => cmd_config(runtime, &app_id(&id)?, &values),
        Command::Enable { id } => Ok(runtime.set_enabled(&app_id(&id)?, true)?),
        Command::Disable { id } => Ok(runtime.set_enabled(&app_id(&id)?, false)?),
        Command::Render { id, out } => cmd_render(runtime, &app_id(&id)?, &out),
        Command::Run { ticks } => cmd_run(runtime, ticks),
    }
}

fn app_id(raw: &str) -> anyhow::Result<frameloop::AppId> {
    Ok(frameloop::AppId::new(raw)?)
}

fn cmd_schema_source(path: &Path) -> anyhow::Result<()> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("read source '{}'", path.display()))?;
    let schema = frameloop::extract_schema(&source);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn cmd_list(runtime: &frameloop::AppRuntime) -> anyhow::Result<()> {
    for record in runtime.list_apps() {
        let health = runtime.health(&record.id).unwrap_or_default();
        println!(
            "{}\t{}\t{}\tframes={}\tfailures={}",
            record.id,
            record.name,
            if record.enabled { "enabled" } else { "disabled" },
            health.has_frames,
            health.consecutive_failures,
        );
    }
    Ok(())
}

fn cmd_config(
    runtime: &frameloop::AppRuntime,
    app: &frameloop::AppId,
    values: &[String],
) -> anyhow::Result<()> {
    if values.is_empty() {
        let config = runtime.get_config(app)?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let mut config = frameloop::AppConfig::new();
    for pair in values {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        config.set(key, value);
    }
    runtime.set_config(app, config)?;
    runtime.wait_idle(runtime.config().renderer.timeout() + Duration::from_secs(5));
    Ok(())
}

fn cmd_render(
    runtime: &frameloop::AppRuntime,
    app: &frameloop::AppId,
    out: &Path,
) -> anyhow::Result<()> {
    let success = runtime.render_now(app)?.map_err(|e| anyhow::anyhow!("{e}"))?;
    std::fs::create_dir_all(out).with_context(|| format!("create '{}'", out.display()))?;

    let mut index = Vec::with_capacity(success.animation.frames.len());
    for (i, frame) in success.animation.frames.iter().enumerate() {
        let name = format!("frame_{i:03}.png");
        let path = out.join(&name);
        frame
            .image
            .save(&path)
            .with_context(|| format!("write '{}'", path.display()))?;
        index.push(serde_json::json!({ "file": name, "delay_ms": frame.delay_ms }));
    }
    let meta = serde_json::json!({
        "app": app,
        "size": success.animation.size,
        "fingerprint": success.fingerprint.to_string(),
        "frames": index,
    });
    let meta_path = out.join("frames.json");
    std::fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
        .with_context(|| format!("write '{}'", meta_path.display()))?;
    println!(
        "wrote {} frame(s) to {}",
        success.animation.frames.len(),
        out.display()
    );
    Ok(())
}

fn cmd_run(runtime: &frameloop::AppRuntime, ticks: Option<u64>) -> anyhow::Result<()> {
    let period = Duration::from_millis(runtime.config().schedule.tick_ms.max(1));
    let mut showing: Option<frameloop::AppId> = None;
    let mut n = 0u64;
    while ticks.is_none_or(|limit| n < limit) {
        let now = runtime.tick();
        let app = now.as_ref().map(|s| s.app.clone());
        if app != showing {
            match &now {
                Some(s) => tracing::info!(
                    app = %s.app,
                    frames = s.frames.frames.len(),
                    duration_ms = s.frames.total_duration_ms(),
                    stale = s.stale,
                    "now showing"
                ),
                None => tracing::info!("display idle"),
            }
            showing = app;
        }
        n += 1;
        std::thread::sleep(period);
    }
    Ok(())
}
