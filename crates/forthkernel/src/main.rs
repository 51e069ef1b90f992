mod logging;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use forthkernel_common::manifest::{self, KernelManifest, ManifestError};
use forthkernel_common::{
    CompleteRequest, ContentsConfig, ExecuteReply, ExecuteRequest, KernelEvent,
};
use forthkernel_runtime::contents::from_config;
use forthkernel_runtime::{ContentsProvider, ForthKernel, FsContents, KernelBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

/// Forth notebook kernel, driven from the command line.
#[derive(Parser)]
#[command(
    name = "forthkernel",
    version,
    about,
    long_about = "Forth notebook kernel.\n\nRuns Forth cells through the same execution path a notebook front-end uses.\n\nExamples:\n  forthkernel run setup.fs demo.fs       Run each file as one cell\n  forthkernel repl                       One cell per input line\n  forthkernel complete ': SQ' --load lib.fs\n  forthkernel info                       Print the kernel-info descriptor"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to Kernel.toml (default: searched upwards from the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not upper-case cell code before interpreting it
    #[arg(long, global = true)]
    case_sensitive: bool,

    /// Leave EVAL out of the dictionary
    #[arg(long, global = true)]
    no_eval: bool,

    /// Prefix for relative INCLUDE paths
    #[arg(long, global = true)]
    base_path: Option<String>,

    /// Let the engine print its own "ok" / "compiled" prompts
    #[arg(long, global = true)]
    prompts: bool,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Execute files, each as a single cell
    Run {
        /// Source files, executed in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Continue with the next file after an error
        #[arg(long)]
        keep_going: bool,
    },

    /// Read cells from stdin, one per line
    Repl,

    /// Print completion matches for a buffer
    Complete {
        /// The buffer to complete
        code: String,

        /// Cursor position in characters (default: end of buffer)
        #[arg(long)]
        cursor: Option<usize>,

        /// Files to execute before completing
        #[arg(long)]
        load: Vec<PathBuf>,
    },

    /// Print the kernel-info descriptor
    Info,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Command::Info = cli.command {
        print_json(&forthkernel_runtime::kernel::kernel_info());
        return;
    }

    let manifest = match load_manifest(cli.config.as_deref()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    let (kernel, events) = match start_kernel(&cli, manifest) {
        Ok(k) => k,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };
    let mut printer = Printer::new(events, cli.json);

    let status = match cli.command {
        Command::Run { files, keep_going } => {
            run_files(&kernel, &mut printer, &files, keep_going).await
        }
        Command::Repl => repl(&kernel, &mut printer).await,
        Command::Complete { code, cursor, load } => {
            complete(&kernel, &mut printer, &code, cursor, &load).await
        }
        Command::Info => Ok(()),
    };

    kernel.dispose().await;
    if let Err(msg) = status {
        eprintln!("{}", msg);
        process::exit(1);
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_manifest(config: Option<&Path>) -> Result<KernelManifest, ManifestError> {
    if let Some(path) = config {
        return manifest::load_manifest(path);
    }
    let cwd = std::env::current_dir()?;
    match manifest::find_and_load_manifest(&cwd) {
        Err(ManifestError::NotFound(_)) => {
            tracing::debug!("no Kernel.toml found; using defaults");
            Ok(KernelManifest {
                kernel: Default::default(),
                contents: None,
                root_dir: cwd,
            })
        }
        other => other,
    }
}

/// The `INCLUDE` source. Filesystem roots are relative to the manifest's
/// directory; without a `[contents]` table that directory itself is used.
fn contents_provider(manifest: &KernelManifest) -> Result<Arc<dyn ContentsProvider>, String> {
    match &manifest.contents {
        None => Ok(Arc::new(FsContents::new(&manifest.root_dir))),
        Some(ContentsConfig::Fs { root }) => {
            let root = root.as_deref().unwrap_or(Path::new("."));
            Ok(Arc::new(FsContents::new(manifest.root_dir.join(root))))
        }
        Some(config) => from_config(config).map_err(|e| format!("error: {}", e)),
    }
}

fn start_kernel(
    cli: &Cli,
    manifest: KernelManifest,
) -> Result<(ForthKernel, UnboundedReceiver<KernelEvent>), String> {
    let contents = contents_provider(&manifest)?;

    let mut options = manifest.kernel;
    if cli.case_sensitive {
        options.case_sensitive = true;
    }
    if cli.no_eval {
        options.allow_eval = false;
    }
    if cli.prompts {
        options.silent = false;
    }
    if let Some(base_path) = &cli.base_path {
        options.base_path = base_path.clone();
    }

    KernelBuilder::new(options)
        .contents(contents)
        .start()
        .map_err(|e| format!("error: failed to start kernel: {}", e))
}

// ============================================================================
// Commands
// ============================================================================

/// Execute one cell. Returns whether the cell succeeded.
async fn execute(
    kernel: &ForthKernel,
    printer: &mut Printer,
    code: String,
) -> Result<bool, String> {
    let reply = kernel
        .execute(&ExecuteRequest { code })
        .await
        .map_err(|e| format!("error: {}", e))?;
    printer.drain();
    Ok(matches!(reply, ExecuteReply::Ok { .. }))
}

async fn run_files(
    kernel: &ForthKernel,
    printer: &mut Printer,
    files: &[PathBuf],
    keep_going: bool,
) -> Result<(), String> {
    let mut failed = false;
    for file in files {
        let code = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("error: cannot read '{}': {}", file.display(), e))?;
        tracing::debug!(file = %file.display(), "running file");

        if !execute(kernel, printer, code).await? {
            failed = true;
            if !keep_going {
                break;
            }
        }
    }
    if failed {
        return Err(format!(
            "error: execution failed after {} cell(s)",
            kernel.execution_count()
        ));
    }
    Ok(())
}

async fn repl(kernel: &ForthKernel, printer: &mut Printer) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| format!("error: reading stdin: {}", e))?;
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        execute(kernel, printer, line).await?;
    }
}

async fn complete(
    kernel: &ForthKernel,
    printer: &mut Printer,
    code: &str,
    cursor: Option<usize>,
    load: &[PathBuf],
) -> Result<(), String> {
    run_files(kernel, printer, load, false).await?;

    let reply = kernel
        .complete(&CompleteRequest {
            code: code.to_string(),
            cursor_pos: cursor.unwrap_or_else(|| code.chars().count()),
        })
        .await
        .map_err(|e| format!("error: {}", e))?;
    print_json(&reply);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::warn!(error = %e, "cannot serialize reply"),
    }
}

/// Writes kernel events to the terminal: streams to stdout, errors and
/// alerts to stderr.
struct Printer {
    events: UnboundedReceiver<KernelEvent>,
    json: bool,
    at_line_start: bool,
}

impl Printer {
    fn new(events: UnboundedReceiver<KernelEvent>, json: bool) -> Self {
        Self {
            events,
            json,
            at_line_start: true,
        }
    }

    /// Print everything published so far. All events of a request are sent
    /// before its reply returns.
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if self.json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "cannot serialize event"),
                }
            } else {
                self.print(event);
            }
        }
        let _ = std::io::stdout().flush();
    }

    fn print(&mut self, event: KernelEvent) {
        match event {
            KernelEvent::Stream(chunk) => {
                print!("{}", chunk.text);
                self.at_line_start = chunk.text.ends_with('\n');
            }
            KernelEvent::ExecuteResult(result) => {
                self.line_start();
                if let Some(text) = result.text() {
                    println!("{}", text);
                }
            }
            KernelEvent::ExecuteError(err) => {
                self.line_start();
                eprintln!("{}", err.evalue);
            }
            KernelEvent::Alert(alert) => {
                self.line_start();
                eprintln!("alert: {}", alert.message);
            }
        }
    }

    fn line_start(&mut self) {
        if !self.at_line_start {
            println!();
            self.at_line_start = true;
        }
    }
}
