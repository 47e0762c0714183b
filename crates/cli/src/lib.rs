use access::{AccessTokenResolver, LocalAccess, PathBookmarks};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use doc_model::{format_file_size, DedupKey, EntryId, Preferences};
use pdf_engine::{default_engine, LopdfEngine, OpenSource, PdfEngine};
use pdf_reader_app::{
    DocumentPicker, OpenOutcome, PresetPicker, ReaderCommand, ReaderScreen, UiEvent, UiHandle,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use storage::{FileKeyValueStore, KeyValueRecentFiles, RecentFilesStore, Storage};

const VIEWPORT_WIDTH_PX: f32 = 800.0;
const VIEWPORT_HEIGHT_PX: f32 = 1000.0;
const SCROLL_STEP_PX: f32 = 250.0;

type Store = RecentFilesStore<KeyValueRecentFiles<FileKeyValueStore>>;
type Screen = ReaderScreen<KeyValueRecentFiles<FileKeyValueStore>, LopdfEngine>;

#[derive(Debug, Parser)]
#[command(name = "pdf-reader")]
#[command(about = "Read PDFs and pick up where you left off")]
pub struct Cli {
    /// Directory holding preferences and the recent files list.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a PDF and page through it with commands read from stdin.
    Open {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Choose a PDF with the system file dialog.
    #[cfg(feature = "dialog")]
    Pick,
    /// List recently opened files, most recent first.
    Recent {
        /// Print the stored list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Reopen a recent file at its saved page.
    Resume {
        /// Entry id or 1-based position in `recent`; defaults to the most recent.
        #[arg(value_name = "ENTRY")]
        entry: Option<String>,
    },
    /// Remove a file from the recent list.
    Forget {
        #[arg(value_name = "ENTRY")]
        entry: String,
    },
    /// Remove every file from the recent list.
    Clear,
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Show preferences, updating any that are given.
    Config {
        #[arg(long, value_name = "SECONDS")]
        autosave_secs: Option<u64>,
        #[arg(long, value_enum)]
        dedup: Option<DedupArg>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DedupArg {
    Name,
    FileIdentity,
}

impl From<DedupArg> for DedupKey {
    fn from(value: DedupArg) -> Self {
        match value {
            DedupArg::Name => DedupKey::Name,
            DedupArg::FileIdentity => DedupKey::FileIdentity,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
    file_size: String,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Open { file } => run_open(&storage(cli.data_dir)?, file),
        #[cfg(feature = "dialog")]
        Commands::Pick => run_pick(&storage(cli.data_dir)?),
        Commands::Recent { json } => run_recent(&storage(cli.data_dir)?, json),
        Commands::Resume { entry } => run_resume(&storage(cli.data_dir)?, entry.as_deref()),
        Commands::Forget { entry } => run_forget(&storage(cli.data_dir)?, &entry),
        Commands::Clear => run_clear(&storage(cli.data_dir)?),
        Commands::Info { file } => run_info(&file),
        Commands::Config { autosave_secs, dedup } => {
            run_config(&storage(cli.data_dir)?, autosave_secs, dedup)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn storage(data_dir: Option<PathBuf>) -> Result<Storage> {
    match data_dir {
        Some(root) => Ok(Storage::with_root(root)),
        None => Storage::from_default_project().context("failed to locate data directory"),
    }
}

fn open_store(storage: &Storage, preferences: &Preferences) -> Store {
    RecentFilesStore::open(KeyValueRecentFiles::new(storage.key_value_store()), preferences.dedup_key)
}

fn build_screen(storage: &Storage) -> Screen {
    let preferences = storage.load_preferences();

    ReaderScreen::new(
        open_store(storage, &preferences),
        AccessTokenResolver::new(Arc::new(PathBookmarks::new())),
        Arc::new(LocalAccess::new()),
        default_engine(),
        preferences.autosave_interval(),
    )
}

fn run_open(storage: &Storage, file: PathBuf) -> Result<()> {
    pick_and_read(storage, &mut PresetPicker::new(file))
}

#[cfg(feature = "dialog")]
fn run_pick(storage: &Storage) -> Result<()> {
    pick_and_read(storage, &mut pdf_reader_app::DialogPicker::new().with_title("Open PDF"))
}

fn pick_and_read(storage: &Storage, picker: &mut dyn DocumentPicker) -> Result<()> {
    let mut screen = build_screen(storage);
    let outcome = screen.pick_document(picker).context("failed to open PDF")?;

    read_interactively(&mut screen, outcome)
}

fn run_resume(storage: &Storage, selector: Option<&str>) -> Result<()> {
    let mut screen = build_screen(storage);
    let id = match selector {
        Some(selector) => select_entry(screen.store(), selector)?,
        None => screen.recent_files().first().map(|entry| entry.id).context("no recent files")?,
    };

    let outcome = screen.open_recent(id).context("failed to open PDF")?;
    read_interactively(&mut screen, outcome)
}

fn read_interactively(screen: &mut Screen, outcome: OpenOutcome) -> Result<()> {
    match outcome {
        OpenOutcome::Opened { .. } => {}
        OpenOutcome::Cancelled => {
            println!("cancelled");
            return Ok(());
        }
        OpenOutcome::AccessDenied => anyhow::bail!("access to the file was denied"),
        OpenOutcome::MissingFile => anyhow::bail!("file does not exist"),
        OpenOutcome::Removed => {
            anyhow::bail!("recent file is no longer available and was removed from the list")
        }
    }

    let name = screen.viewer().file().map(|file| file.display_name()).unwrap_or_default();
    println!("opened {name} ({} pages)", screen.total_pages().unwrap_or(0));

    screen.dispatch(UiEvent::Command(ReaderCommand::Resize {
        width_px: VIEWPORT_WIDTH_PX,
        height_px: VIEWPORT_HEIGHT_PX,
    }))?;
    screen.pump();
    if let Some(label) = screen.page_label() {
        println!("{label}");
    }

    spawn_command_reader(screen.handle())?;
    screen.run_until_closed(|screen, event| {
        if let UiEvent::PageChanged { .. } = event {
            if let Some(label) = screen.page_label() {
                println!("{label}");
            }
        }
    });

    Ok(())
}

/// Forwards stdin lines to the UI thread as commands. End of input closes the viewer.
fn spawn_command_reader(handle: UiHandle) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match parse_command(line) {
                    Some(command) => {
                        if !handle.command(command) || command == ReaderCommand::Close {
                            return;
                        }
                    }
                    None => eprintln!("unknown command `{line}` (n, p, g PAGE, d, u, q)"),
                }
            }

            handle.command(ReaderCommand::Close);
        })
        .context("failed to start input thread")?;

    Ok(())
}

fn parse_command(line: &str) -> Option<ReaderCommand> {
    let mut parts = line.split_whitespace();
    let command = match (parts.next()?, parts.next()) {
        ("n" | "next", None) => ReaderCommand::NextPage,
        ("p" | "prev", None) => ReaderCommand::PreviousPage,
        ("g" | "goto", Some(page)) => {
            let page = page.parse::<u32>().ok().filter(|page| *page >= 1)?;
            ReaderCommand::GoToPage(page - 1)
        }
        ("d" | "down", None) => ReaderCommand::ScrollBy(SCROLL_STEP_PX),
        ("u" | "up", None) => ReaderCommand::ScrollBy(-SCROLL_STEP_PX),
        ("q" | "quit", None) => ReaderCommand::Close,
        _ => return None,
    };

    parts.next().is_none().then_some(command)
}

fn run_recent(storage: &Storage, json: bool) -> Result<()> {
    let store = open_store(storage, &storage.load_preferences());

    if json {
        println!("{}", serde_json::to_string_pretty(store.entries())?);
        return Ok(());
    }

    if store.entries().is_empty() {
        println!("no recent files");
        return Ok(());
    }

    let now = Utc::now();
    for (position, entry) in store.entries().iter().enumerate() {
        println!(
            "{:>2}. {}  {}  page {}/{}  {}  {}",
            position + 1,
            entry.name,
            entry.file_size,
            entry.last_page_number.saturating_add(1),
            entry.total_pages,
            format_age(entry.date_added, now),
            entry.id,
        );
    }

    Ok(())
}

fn run_forget(storage: &Storage, selector: &str) -> Result<()> {
    let mut store = open_store(storage, &storage.load_preferences());
    let id = select_entry(&store, selector)?;

    if let Some(entry) = store.remove(id) {
        println!("forgot {}", entry.name);
    }

    Ok(())
}

fn run_clear(storage: &Storage) -> Result<()> {
    let mut store = open_store(storage, &storage.load_preferences());
    let count = store.entries().len();
    store.clear();
    println!("cleared {count} recent files");

    Ok(())
}

/// Accepts an entry id or a 1-based position in the recent list.
fn select_entry(store: &Store, selector: &str) -> Result<EntryId> {
    if let Ok(id) = selector.parse::<EntryId>() {
        if store.get(id).is_some() {
            return Ok(id);
        }
        anyhow::bail!("no recent file with id {id}");
    }

    selector
        .parse::<usize>()
        .ok()
        .and_then(|position| position.checked_sub(1))
        .and_then(|index| store.entries().get(index))
        .map(|entry| entry.id)
        .with_context(|| format!("no recent file matches `{selector}`"))
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let first_page_size_pt = if page_count > 0 {
        let size = engine.page_size(handle, 0)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };
    let file_size = format_file_size(fs::metadata(file)?.len());

    let payload =
        InfoOutput { path: file.display().to_string(), page_count, first_page_size_pt, file_size };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_config(storage: &Storage, autosave_secs: Option<u64>, dedup: Option<DedupArg>) -> Result<()> {
    let mut preferences = storage.load_preferences();

    if autosave_secs.is_some() || dedup.is_some() {
        if let Some(secs) = autosave_secs {
            anyhow::ensure!(secs >= 1, "--autosave-secs must be at least 1");
            preferences.autosave_interval_secs = secs;
        }
        if let Some(dedup) = dedup {
            preferences.dedup_key = dedup.into();
        }
        storage.save_preferences(&preferences).context("failed to save preferences")?;
    }

    println!("{}", serde_json::to_string_pretty(&preferences)?);
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn format_age(added: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - added).num_seconds().max(0);

    let (amount, unit) = match seconds {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (seconds / 60, "minute"),
        3_600..=86_399 => (seconds / 3_600, "hour"),
        _ => (seconds / 86_400, "day"),
    };

    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}
