use std::io::Write;

use anyhow::Context;
use clap::Parser;

/// View and patch text files of any size without loading them into memory.
#[derive(Parser, Debug)]
#[command(name = "bigview")]
#[command(about = "View and patch very large text files", long_about = None)]
#[command(version)]
struct Args {
    #[arg(value_name = "FILE")]
    path: std::path::PathBuf,

    /// JSON file with engine settings; flags below override it.
    #[arg(long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Skip detection: utf-8, utf-8-sig, utf-16-le or utf-16-be.
    #[arg(long, value_name = "LABEL", value_parser = parse_encoding)]
    encoding: Option<io::encoding::Encoding>,

    /// Bytes scanned per indexing step.
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Decoded lines kept in memory.
    #[arg(long, value_name = "LINES")]
    cache_capacity: Option<usize>,

    /// First line to print (0-based).
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Number of lines to print.
    #[arg(long, default_value_t = 20)]
    count: usize,

    /// Replace a line.
    #[arg(long = "set", value_name = "LINE=TEXT", value_parser = parse_set)]
    sets: Vec<Edit>,

    /// Insert text at a column.
    #[arg(long = "insert", value_name = "LINE:COL=TEXT", value_parser = parse_insert)]
    inserts: Vec<Edit>,

    /// Delete a column range.
    #[arg(long = "delete", value_name = "LINE:START-END", value_parser = parse_delete)]
    deletes: Vec<Edit>,

    /// Write the edits back (keeps `<FILE>.backup`).
    #[arg(long)]
    save: bool,

    /// Print right away instead of waiting for the whole file to be indexed.
    /// Ignored when editing or saving.
    #[arg(long)]
    no_wait: bool,
}

impl Args {
    fn edits(&self) -> impl Iterator<Item = &Edit> {
        self.sets.iter().chain(&self.inserts).chain(&self.deletes)
    }

    /// Edits address lines by number, so they wait for the full index.
    fn must_wait(&self) -> bool {
        !self.no_wait || self.save || self.edits().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Edit {
    Set { line: usize, text: String },
    Insert { line: usize, col: usize, text: String },
    Delete { line: usize, start: usize, end: usize },
}

impl Edit {
    fn apply(&self, buffer: &mut editor_core::text::VirtualTextBuffer) {
        match self {
            Edit::Set { line, text } => buffer.set_line(*line, text),
            Edit::Insert { line, col, text } => buffer.insert_text_at_line(*line, *col, text),
            Edit::Delete { line, start, end } => buffer.delete_text_at_line(*line, *start, *end),
        }
    }
}

fn parse_encoding(label: &str) -> Result<io::encoding::Encoding, String> {
    io::encoding::Encoding::from_label(label).ok_or_else(|| format!("unknown encoding `{label}`"))
}

fn parse_number(value: &str, what: &str) -> Result<usize, String> {
    value
        .trim()
        .parse()
        .map_err(|e| format!("invalid {what} `{value}`: {e}"))
}

/// `LINE=TEXT`
fn parse_set(arg: &str) -> Result<Edit, String> {
    let (line, text) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected LINE=TEXT, got `{arg}`"))?;

    Ok(Edit::Set {
        line: parse_number(line, "line")?,
        text: text.to_owned(),
    })
}

/// `LINE:COL=TEXT`
fn parse_insert(arg: &str) -> Result<Edit, String> {
    let (position, text) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected LINE:COL=TEXT, got `{arg}`"))?;
    let (line, col) = position
        .split_once(':')
        .ok_or_else(|| format!("expected LINE:COL, got `{position}`"))?;

    Ok(Edit::Insert {
        line: parse_number(line, "line")?,
        col: parse_number(col, "column")?,
        text: text.to_owned(),
    })
}

/// `LINE:START-END`
fn parse_delete(arg: &str) -> Result<Edit, String> {
    let (line, range) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected LINE:START-END, got `{arg}`"))?;
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got `{range}`"))?;

    Ok(Edit::Delete {
        line: parse_number(line, "line")?,
        start: parse_number(start, "start column")?,
        end: parse_number(end, "end column")?,
    })
}

fn load_config(args: &Args) -> anyhow::Result<editor_core::config::EditorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;

            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => editor_core::config::EditorConfig::default(),
    };

    if args.encoding.is_some() {
        config.encoding = args.encoding;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.index_chunk_size = chunk_size;
    }
    if let Some(capacity) = args.cache_capacity {
        config.line_cache_capacity = capacity;
    }

    Ok(config)
}

/// Blocks until the index reports completion, logging progress on the way.
fn wait_for_index(
    state: &editor_state::EditorState,
    events: &crossbeam_channel::Receiver<editor_core::line_index::IndexEvent>,
) {
    loop {
        match events.recv_timeout(std::time::Duration::from_secs(1)) {
            Ok(editor_core::line_index::IndexEvent::Finished { lines }) => {
                tracing::debug!(lines, "index finished");
                return;
            }
            Ok(editor_core::line_index::IndexEvent::Progress { .. }) => {
                tracing::info!("{}", state.progress());
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if state.is_indexed() || !state.buffer().index().is_running() {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut state = editor_state::EditorState::open(&args.path, config)
        .with_context(|| format!("opening {}", args.path.display()))?;
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    state.subscribe(events_tx);
    state.start_indexing().context("starting the line index")?;

    if args.must_wait() {
        wait_for_index(&state, &events_rx);
    }

    for edit in args.edits() {
        edit.apply(state.buffer_mut());
    }

    let lines = state.buffer_mut().get_lines_range(args.start, args.count);
    let mut out = std::io::stdout().lock();

    for (offset, text) in lines.iter().enumerate() {
        writeln!(out, "{:>8}  {text}", args.start + offset + 1)?;
    }
    out.flush()?;

    if args.save && state.buffer().is_dirty() {
        state
            .save()
            .with_context(|| format!("saving {}", args.path.display()))?;
    }

    tracing::info!("{}", state.progress());

    state.close().context("closing the file")?;

    Ok(())
}
