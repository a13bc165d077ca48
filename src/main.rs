use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use time::OffsetDateTime;

mod diff;
mod encoding;
mod files;
mod index;
mod logging;
mod markup;
mod menu;
mod plan;
mod sanitize;
mod scanner;
mod toggle;
use encoding::{DecodedText, EncodingSource, EncodingStrategy};
use files::RadioFile;
use index::{Entry, EntryState, RadioIndex};
use logging::{LineSpan, LineSpanKind, record_change};
use menu::{Menu, MenuOutcome};
use toggle::{ToggleEvent, ToggleOutcome};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let Cli { common, command } = cli;
    match command.unwrap_or(Command::Menu) {
        Command::Menu => handle_menu(&common)?,
        Command::Stations => handle_stations(&common)?,
        Command::List(cmd) => handle_list(&common, cmd)?,
        Command::Toggle(cmd) => run_edit("toggle", &common, &cmd.sound_names, None)?,
        Command::Enable(cmd) => {
            run_edit("enable", &common, &cmd.sound_names, Some(EntryState::Live))?
        }
        Command::Disable(cmd) => run_edit(
            "disable",
            &common,
            &cmd.sound_names,
            Some(EntryState::Commented),
        )?,
        Command::Batch(cmd) => handle_batch(&common, cmd)?,
        Command::Revert(cmd) => handle_revert(&common, cmd)?,
        Command::Log(cmd) => handle_log(cmd)?,
    }

    Ok(())
}

/// A decoded radio info file and its index.
struct LoadedFile {
    path: PathBuf,
    decoded: DecodedText,
    index: RadioIndex,
}

fn load_radio_file(file: &RadioFile, encoding: &EncodingStrategy) -> Result<LoadedFile> {
    let bytes =
        fs::read(&file.path).with_context(|| format!("reading {}", file.path.display()))?;
    let decoded = encoding.decode(&bytes);
    if decoded.had_errors {
        // Lossy decodes are only accepted under an explicit override.
        if decoded.decision.source != EncodingSource::Override {
            bail!(
                "{} is not valid {} ({}); pass --encoding to load it anyway",
                file.path.display(),
                decoded.decision.encoding.name(),
                decoded.decision.source
            );
        }
        println!(
            "warning: {} is not valid {}; undecodable bytes were replaced",
            file.path.display(),
            decoded.decision.encoding.name()
        );
    }
    let index = RadioIndex::build(&decoded.text)
        .with_context(|| format!("parsing {}", file.path.display()))?;
    Ok(LoadedFile {
        path: file.path.clone(),
        decoded,
        index,
    })
}

fn handle_menu(common: &CommonArgs) -> Result<()> {
    let encoding = resolve_encoding_strategy(common)?;
    let files = resolve_files(common)?;
    let [file] = files.as_slice() else {
        bail!(
            "the menu edits one file at a time; {} files matched",
            files.len()
        );
    };
    let loaded = load_radio_file(file, &encoding)?;
    let outcome = Menu::new(
        &loaded.decoded.text,
        &loaded.index,
        io::stdin().lock(),
        io::stdout(),
    )
    .run()?;
    let MenuOutcome::Toggle(targets) = outcome else {
        return Ok(());
    };

    let toggled = toggle::toggle(&loaded.decoded.text, &targets)
        .with_context(|| format!("toggling entries in {}", loaded.path.display()))?;
    let mut session = ApplySession::new("menu", common, true);
    session.review(&loaded, &toggled)?;
    session.stats.print("menu");
    Ok(())
}

fn handle_stations(common: &CommonArgs) -> Result<()> {
    let encoding = resolve_encoding_strategy(common)?;
    for file in resolve_files(common)? {
        let loaded = load_radio_file(&file, &encoding)?;
        if common.json {
            for station in loaded.index.stations() {
                println!(
                    "{}",
                    json!({
                        "path": loaded.path.display().to_string(),
                        "name": station.name,
                        "number": station.number,
                        "playlists": station.playlist_types(),
                    })
                );
            }
            continue;
        }
        let decision = &loaded.decoded.decision;
        println!(
            "{} [{} via {}]:",
            loaded.path.display(),
            decision.encoding.name(),
            decision.source
        );
        for station in loaded.index.stations() {
            println!(
                "  {:<24} {}",
                station.label(),
                station.playlist_types().join(", ")
            );
        }
    }
    Ok(())
}

fn handle_list(common: &CommonArgs, cmd: ListCommand) -> Result<()> {
    let encoding = resolve_encoding_strategy(common)?;
    for file in resolve_files(common)? {
        let loaded = load_radio_file(&file, &encoding)?;
        let raw = &loaded.decoded.text;
        let Some(station) = loaded.index.find_station(&cmd.station) else {
            bail!(
                "no station named '{}' in {}",
                cmd.station,
                loaded.path.display()
            );
        };

        let mut selected: Vec<&str> = Vec::new();
        if cmd.playlists.is_empty() {
            selected = station.playlist_types();
        } else {
            for kind in &cmd.playlists {
                if station.has_playlist(kind) {
                    selected.push(kind);
                } else {
                    println!("warning: {} has no playlist '{kind}'", station.name);
                }
            }
        }

        let scan = scanner::find_commented_entries(raw, station, &selected);
        for fragment in &scan.skipped {
            let (line, _) = markup::line_column(raw, fragment.offset);
            println!(
                "skipping commented entry in {} / {} at line {line}: {}",
                fragment.station, fragment.playlist, fragment.reason
            );
        }
        let mut rows = if cmd.commented_only {
            Vec::new()
        } else {
            station.live_entries(&selected)
        };
        rows.extend(scan.entries);

        if common.json {
            for entry in &rows {
                println!(
                    "{}",
                    json!({
                        "path": loaded.path.display().to_string(),
                        "line": markup::line_column(raw, entry.span.start).0,
                        "station": station.name,
                        "playlist": entry.playlist,
                        "state": entry.state,
                        "sound_name": entry.sound_name(),
                        "display_name": entry.display_name(),
                    })
                );
            }
            continue;
        }

        println!(
            "{}:{}: {} ({})",
            loaded.path.display(),
            markup::line_column(raw, station.span.start).0,
            station.label(),
            selected.join(" & ")
        );
        if rows.is_empty() {
            println!("  no entries found.");
        }
        for entry in &rows {
            let line = markup::line_column(raw, entry.span.start).0;
            println!("  {line:>5}  {}", format_entry_row(entry));
        }
    }
    Ok(())
}

fn format_entry_row(entry: &Entry) -> String {
    format!(
        "{:<9} {:<16} {:<24} {}",
        entry.state.label(),
        entry.playlist,
        entry.sound_name().unwrap_or("(no SoundName)"),
        entry.display_name()
    )
}

/// Shared body of `toggle`, `enable`, `disable` and plan steps.
fn run_edit(
    label: &str,
    common: &CommonArgs,
    sound_names: &[String],
    desired: Option<EntryState>,
) -> Result<()> {
    let encoding = resolve_encoding_strategy(common)?;
    let files = resolve_files(common)?;
    print_command_summary(
        label,
        common,
        &encoding,
        &files,
        &[format!("sound names: {}", sound_names.join(" "))],
    );

    let mut session = ApplySession::new(label, common, common.apply);
    for file in &files {
        let loaded = load_radio_file(file, &encoding)?;
        let raw = &loaded.decoded.text;
        let outcome = match desired {
            None => toggle::toggle(raw, sound_names),
            Some(state) => toggle::set_state(raw, sound_names, state),
        }
        .with_context(|| format!("toggling entries in {}", loaded.path.display()))?;
        if session.review(&loaded, &outcome)? == Flow::Stop {
            break;
        }
    }
    session.stats.print(label);
    Ok(())
}

fn handle_batch(common: &CommonArgs, cmd: BatchCommand) -> Result<()> {
    let toggle_plan = plan::load_plan(&cmd.plan)?;
    if toggle_plan.steps.is_empty() {
        bail!("plan {} does not contain any steps", cmd.plan.display());
    }
    let total = toggle_plan.steps.len();
    for (idx, step) in toggle_plan.steps.iter().enumerate() {
        println!("\n=== Batch Step {}/{total}: {} ===", idx + 1, step.kind());
        let targets = step.targets();
        if targets.sound_names.is_empty() {
            bail!("step {} ({}) lists no sound_names", idx + 1, step.kind());
        }
        let merged = merge_common(common, &targets.common);
        run_edit(
            step.kind(),
            &merged,
            &targets.sound_names,
            step.desired_state(),
        )?;
    }
    Ok(())
}

fn handle_revert(common: &CommonArgs, cmd: RevertCommand) -> Result<()> {
    let patch_text = fs::read_to_string(&cmd.patch)
        .with_context(|| format!("reading patch {}", cmd.patch.display()))?;
    let encoding = resolve_encoding_strategy(common)?;
    let files = resolve_files(common)?;
    print_command_summary(
        "revert",
        common,
        &encoding,
        &files,
        &[format!("patch: {}", cmd.patch.display())],
    );

    let mut session = ApplySession::new("revert", common, common.apply);
    for file in &files {
        let loaded = load_radio_file(file, &encoding)?;
        let reverted = diff::apply_patch_preserving_newlines(&loaded.decoded.text, &patch_text)
            .with_context(|| {
                format!(
                    "applying {} to {}",
                    cmd.patch.display(),
                    file.path.display()
                )
            })?;
        RadioIndex::build(&reverted).with_context(|| {
            format!(
                "{} would leave {} unparseable",
                cmd.patch.display(),
                file.path.display()
            )
        })?;
        let outcome = ToggleOutcome {
            text: reverted,
            events: Vec::new(),
        };
        if session.review(&loaded, &outcome)? == Flow::Stop {
            break;
        }
    }
    session.stats.print("revert");
    Ok(())
}

fn handle_log(cmd: LogCommand) -> Result<()> {
    let entries = logging::read_recent(cmd.tail)?;
    if entries.is_empty() {
        println!("change log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "[{}] {:<8} {:<8} {:<8} {}",
            entry.timestamp, entry.command, entry.action, entry.line_summary, entry.path
        );
        if !entry.toggled.is_empty() {
            println!("    toggled: {}", entry.toggled.join(" "));
        }
        if !entry.spans.is_empty() {
            println!("    spans: {}", describe_spans(&entry.spans));
        }
    }
    Ok(())
}

fn describe_spans(spans: &[LineSpan]) -> String {
    spans
        .iter()
        .map(|span| {
            let kind = match span.kind {
                LineSpanKind::Modified => "M",
                LineSpanKind::Added => "A",
            };
            if span.end > span.start {
                format!("{kind} L{}-L{}", span.start, span.end)
            } else {
                format!("{kind} L{}", span.start)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Preview, approval and write state shared across the files of one command.
struct ApplySession<'a> {
    command: &'a str,
    common: &'a CommonArgs,
    apply_mode: bool,
    apply_all: bool,
    diff_config: diff::DiffDisplayConfig,
    stats: CommandStats,
}

impl<'a> ApplySession<'a> {
    fn new(command: &'a str, common: &'a CommonArgs, apply_mode: bool) -> Self {
        Self {
            command,
            common,
            apply_mode,
            apply_all: common.auto_apply && apply_mode,
            diff_config: common.diff_display_config(common.color.should_color()),
            stats: CommandStats::default(),
        }
    }

    fn review(&mut self, loaded: &LoadedFile, outcome: &ToggleOutcome) -> Result<Flow> {
        let path = loaded.path.as_path();
        let old_text = &loaded.decoded.text;
        if !self.common.json {
            report_events(path, &outcome.events);
        }
        let toggled: Vec<String> = outcome
            .edited_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let events = serde_json::to_value(&outcome.events)?;

        if outcome.text == *old_text {
            self.stats.no_op += 1;
            let mut extra = status_extra(false, !self.apply_mode);
            extra.insert("events".into(), events);
            if self.apply_mode {
                self.log_change(path, "no-op", "no changes", &toggled, &[], extra);
            } else {
                emit_json_diff_event(
                    self.common,
                    self.command,
                    path,
                    "no-op",
                    "no changes",
                    &[],
                    Some(extra),
                );
            }
            return Ok(Flow::Continue);
        }

        let line_summary = diff::summarize_lines(old_text, &outcome.text);
        let line_spans = diff::collect_line_spans(old_text, &outcome.text);
        if !self.common.json {
            println!("--- preview: {} ---", path.display());
            diff::display_diff(old_text, &outcome.text, &self.diff_config)?;
        }

        if !self.apply_mode {
            self.stats.dry_run += 1;
            println!("dry-run: rerun with --apply to write this change.");
            let mut extra = status_extra(false, true);
            extra.insert("events".into(), events);
            self.log_change(path, "dry-run", &line_summary, &toggled, &line_spans, extra);
            return Ok(Flow::Continue);
        }

        let decision = if self.apply_all {
            ApprovalDecision::Apply
        } else {
            prompt_approval(path)?
        };
        match decision {
            ApprovalDecision::Apply | ApprovalDecision::ApplyAll => {
                if matches!(decision, ApprovalDecision::ApplyAll) {
                    self.apply_all = true;
                }
                apply_edit(
                    path,
                    &loaded.decoded,
                    &outcome.text,
                    self.common.undo_log.as_deref(),
                    self.common.backup,
                )?;
                self.stats.applied += 1;
                let mut extra = status_extra(true, false);
                extra.insert("events".into(), events);
                self.log_change(path, "applied", &line_summary, &toggled, &line_spans, extra);
                Ok(Flow::Continue)
            }
            ApprovalDecision::Skip => {
                println!("skipped {}", path.display());
                self.stats.skipped += 1;
                let mut extra = status_extra(false, false);
                extra.insert("events".into(), events);
                self.log_change(path, "skipped", &line_summary, &toggled, &line_spans, extra);
                Ok(Flow::Continue)
            }
            ApprovalDecision::Quit => {
                println!("stopping after user request.");
                self.stats.skipped += 1;
                Ok(Flow::Stop)
            }
        }
    }

    fn log_change(
        &self,
        path: &Path,
        action: &str,
        line_summary: &str,
        toggled: &[String],
        spans: &[LineSpan],
        extra: JsonMap<String, JsonValue>,
    ) {
        let _ = record_change(self.command, path, action, line_summary, toggled, spans);
        emit_json_diff_event(
            self.common,
            self.command,
            path,
            action,
            line_summary,
            spans,
            Some(extra),
        );
    }
}

fn report_events(path: &Path, events: &[ToggleEvent]) {
    for event in events {
        if event.is_warning() {
            println!("warning: {}: {event}", path.display());
        } else if event.is_edit() {
            println!("{event}");
        } else {
            println!("{event}; skipping");
        }
    }
}

fn emit_json_diff_event(
    common: &CommonArgs,
    command: &str,
    path: &Path,
    action: &str,
    line_summary: &str,
    spans: &[LineSpan],
    extra: Option<JsonMap<String, JsonValue>>,
) {
    if !common.json {
        return;
    }
    let mut event = JsonMap::new();
    event.insert("command".into(), JsonValue::String(command.to_string()));
    event.insert("path".into(), JsonValue::String(path.display().to_string()));
    event.insert("action".into(), JsonValue::String(action.to_string()));
    event.insert(
        "line_summary".into(),
        JsonValue::String(line_summary.to_string()),
    );
    event.insert("spans".into(), spans_to_json(spans));
    if let Some(extra_map) = extra {
        for (key, value) in extra_map {
            event.insert(key, value);
        }
    }
    println!("{}", JsonValue::Object(event));
}

fn spans_to_json(spans: &[LineSpan]) -> JsonValue {
    serde_json::to_value(spans).unwrap_or(JsonValue::Null)
}

fn status_extra(applied: bool, dry_run: bool) -> JsonMap<String, JsonValue> {
    let mut map = JsonMap::new();
    map.insert("applied".into(), JsonValue::Bool(applied));
    map.insert("dry_run".into(), JsonValue::Bool(dry_run));
    map
}

fn print_command_summary(
    command: &str,
    common: &CommonArgs,
    encoding: &EncodingStrategy,
    files: &[RadioFile],
    details: &[String],
) {
    if common.json {
        return;
    }
    println!("command: {command}");
    println!(
        "mode: {}{}",
        if common.apply { "apply" } else { "dry-run" },
        if common.auto_apply {
            " (auto-approve)"
        } else {
            ""
        }
    );
    println!("encoding strategy: {}", encoding.describe());
    println!("context lines: {}", common.context);
    if common.backup {
        println!("backups enabled");
    }
    if let Some(log) = &common.undo_log {
        println!("undo log dir: {}", log.display());
    }
    if !common.globs.is_empty() {
        println!("globs:");
        for glob in &common.globs {
            println!("  - {glob}");
        }
    }
    println!("resolved files ({}):", files.len());
    for file in files.iter().take(10) {
        println!("  - {} ({} bytes)", file.path.display(), file.len);
    }
    if files.len() > 10 {
        println!("  ...");
    }
    for detail in details {
        println!("{detail}");
    }
    println!("---");
}

fn resolve_files(common: &CommonArgs) -> Result<Vec<RadioFile>> {
    files::resolve_targets(&common.files, &common.globs)
}

fn resolve_encoding_strategy(common: &CommonArgs) -> Result<EncodingStrategy> {
    EncodingStrategy::new(common.encoding.as_deref())
}

#[derive(Debug, Clone, Copy)]
enum ApprovalDecision {
    Apply,
    Skip,
    ApplyAll,
    Quit,
}

fn prompt_approval(path: &Path) -> Result<ApprovalDecision> {
    loop {
        print_prompt(&format!(
            "Apply change to {}? [y]es/[n]o/[a]ll/[q]uit: ",
            path.display()
        ))?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(ApprovalDecision::Quit);
        }
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" | "" => return Ok(ApprovalDecision::Apply),
            "n" | "no" => return Ok(ApprovalDecision::Skip),
            "a" | "all" => return Ok(ApprovalDecision::ApplyAll),
            "q" | "quit" => return Ok(ApprovalDecision::Quit),
            _ => {
                println!("Please enter y, n, a, or q.");
            }
        }
    }
}

fn print_prompt(message: &str) -> Result<()> {
    print!("{message}");
    io::stdout().flush()?;
    Ok(())
}

fn apply_edit(
    path: &Path,
    decoded: &DecodedText,
    new_text: &str,
    undo_dir: Option<&Path>,
    keep_backup: bool,
) -> Result<()> {
    if let Some(dir) = undo_dir {
        write_undo_patch(dir, path, &decoded.text, new_text)?;
    }
    let (encoded, had_errors) = decoded.encode_like_source(new_text);
    if had_errors {
        println!(
            "warning: encoding fallback occurred when writing {}; output may be lossy",
            path.display()
        );
    }
    let backup = create_backup_if_needed(path, keep_backup)?;
    write_via_temp(path, &encoded).with_context(|| format!("writing {}", path.display()))?;
    if let Some(bak) = backup {
        println!("backup saved: {} -> {}", path.display(), bak.display());
    }
    println!("Saved changes to {}", path.display());
    Ok(())
}

fn create_backup_if_needed(path: &Path, enabled: bool) -> Result<Option<PathBuf>> {
    if !enabled || !path.exists() {
        return Ok(None);
    }

    let mut attempt = 0usize;
    loop {
        let candidate = backup_candidate(path, attempt);
        if !candidate.exists() {
            fs::copy(path, &candidate)
                .with_context(|| format!("creating backup {}", candidate.display()))?;
            return Ok(Some(candidate));
        }
        attempt += 1;
    }
}

fn backup_candidate(path: &Path, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("RadioInfo.xml");
    let suffix = if index == 0 {
        ".bak".to_string()
    } else {
        format!(".bak{index}")
    };
    path.with_file_name(format!("{name}{suffix}"))
}

fn write_via_temp(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let base_dir = parent.unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".radiotoggle-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp file {}", temp_path.display()))?;
    }
    fs::rename(&temp_path, path).or_else(|err| {
        let _ = fs::remove_file(&temp_path);
        Err(err).with_context(|| format!("replacing {}", path.display()))
    })?;
    Ok(())
}

fn write_undo_patch(dir: &Path, path: &Path, old_text: &str, new_text: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating undo dir {}", dir.display()))?;
    let timestamp = logging::now_rfc3339();
    let file_name = format!(
        "{}_{}.patch",
        sanitize_path(Path::new(&timestamp)),
        sanitize_path(path)
    );
    let patch_path = dir.join(file_name);
    let patch = diff::unified_diff(path, new_text, old_text, 3);
    fs::write(&patch_path, patch)
        .with_context(|| format!("writing undo patch {}", patch_path.display()))?;
    println!("undo patch: {}", patch_path.display());
    Ok(patch_path)
}

fn sanitize_path(path: &Path) -> String {
    path.display()
        .to_string()
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect()
}

#[derive(Default)]
struct CommandStats {
    applied: usize,
    skipped: usize,
    dry_run: usize,
    no_op: usize,
}

impl CommandStats {
    fn print(&self, label: &str) {
        let total = self.applied + self.skipped + self.dry_run + self.no_op;
        if total == 0 {
            return;
        }
        println!(
            "{label} summary: applied={}, skipped={}, dry-run={}, no-op={}",
            self.applied, self.skipped, self.dry_run, self.no_op
        );
    }
}

fn merge_common(base: &CommonArgs, overrides: &plan::PlanCommon) -> CommonArgs {
    let mut merged = base.clone();
    if let Some(files) = &overrides.files {
        merged.files = files.clone();
    }
    if let Some(globs) = &overrides.globs {
        merged.globs = globs.clone();
    }
    if let Some(encoding) = &overrides.encoding {
        merged.encoding = Some(encoding.clone());
    }
    if let Some(apply) = overrides.apply {
        merged.apply = apply;
    }
    if let Some(auto) = overrides.auto_apply {
        merged.auto_apply = auto;
    }
    if let Some(backup) = overrides.backup {
        merged.backup = backup;
    }
    if let Some(context) = overrides.context {
        merged.context = context;
    }
    if let Some(color) = overrides.color {
        merged.color = color;
    }
    if let Some(json) = overrides.json {
        merged.json = json;
    }
    if let Some(undo_log) = &overrides.undo_log {
        merged.undo_log = Some(undo_log.clone());
    }
    merged
}

#[derive(Debug, Parser)]
#[command(
    name = "radiotoggle",
    version,
    about = "Enable and disable radio station tracks by commenting their entries"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive station, playlist and entry picker (default).
    Menu,
    /// List stations and their playlist types.
    Stations,
    /// List the entries of one station.
    List(ListCommand),
    /// Flip each named entry between live and commented.
    Toggle(TargetsCommand),
    /// Make each named entry live.
    Enable(TargetsCommand),
    /// Comment out each named entry.
    Disable(TargetsCommand),
    /// Run a YAML or JSON plan of toggle steps.
    Batch(BatchCommand),
    /// Apply an undo patch written by --undo-log.
    Revert(RevertCommand),
    /// Show recent entries of the change log.
    Log(LogCommand),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    #[arg(long = "file", value_name = "PATH", global = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
    #[arg(long = "glob", value_name = "GLOB", global = true)]
    globs: Vec<String>,
    #[arg(long, value_name = "ENCODING", global = true)]
    encoding: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    apply: bool,
    #[arg(long = "yes", action = ArgAction::SetTrue, global = true)]
    auto_apply: bool,
    /// Keep a numbered `.bak` copy of each file before overwriting it.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    backup: bool,
    #[arg(long, default_value_t = 3, global = true)]
    context: usize,
    #[arg(long = "color", value_enum, default_value = "auto", global = true)]
    color: ColorChoice,
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    json: bool,
    #[arg(long = "undo-log", value_name = "DIR", global = true, value_hint = ValueHint::DirPath)]
    undo_log: Option<PathBuf>,
}

impl CommonArgs {
    fn diff_display_config(&self, colorize: bool) -> diff::DiffDisplayConfig {
        diff::DiffDisplayConfig {
            context: self.context,
            colorize,
        }
    }
}

#[derive(Debug, Args)]
struct ListCommand {
    /// Station name or number.
    #[arg(long, value_name = "NAME")]
    station: String,
    #[arg(long = "playlist", value_name = "TYPE")]
    playlists: Vec<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    commented_only: bool,
}

#[derive(Debug, Args)]
struct TargetsCommand {
    #[arg(value_name = "SOUNDNAME", required = true)]
    sound_names: Vec<String>,
}

#[derive(Debug, Args)]
struct BatchCommand {
    #[arg(value_name = "PLAN", value_hint = ValueHint::FilePath)]
    plan: PathBuf,
}

#[derive(Debug, Args)]
struct RevertCommand {
    #[arg(value_name = "PATCH", value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

#[derive(Debug, Args)]
struct LogCommand {
    #[arg(long = "tail", default_value_t = 20)]
    tail: usize,
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn no_subcommand_means_menu() {
        let cli = Cli::try_parse_from(["radiotoggle"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.common.files.is_empty());
        assert!(!cli.common.apply);
        assert!(!cli.common.backup);
    }

    #[test]
    fn shared_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "radiotoggle",
            "--file",
            "a.xml",
            "disable",
            "track01",
            "track02",
            "--apply",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.common.files, [PathBuf::from("a.xml")]);
        assert!(cli.common.apply && cli.common.auto_apply);
        let Some(Command::Disable(cmd)) = cli.command else {
            panic!("expected disable");
        };
        assert_eq!(cmd.sound_names, ["track01", "track02"]);
    }

    #[test]
    fn toggle_needs_a_sound_name() {
        assert!(Cli::try_parse_from(["radiotoggle", "toggle"]).is_err());
    }

    #[test]
    fn plan_overrides_replace_shared_flags() {
        let cli = Cli::try_parse_from(["radiotoggle", "--context", "5"]).unwrap();
        let overrides = plan::PlanCommon {
            apply: Some(true),
            color: Some(ColorChoice::Never),
            files: Some(vec![PathBuf::from("b.xml")]),
            ..Default::default()
        };
        let merged = merge_common(&cli.common, &overrides);
        assert!(merged.apply);
        assert_eq!(merged.context, 5);
        assert_eq!(merged.color, ColorChoice::Never);
        assert_eq!(merged.files, [PathBuf::from("b.xml")]);
    }

    #[test]
    fn spans_are_described_compactly() {
        let spans = [
            LineSpan {
                kind: LineSpanKind::Modified,
                start: 4,
                end: 6,
            },
            LineSpan {
                kind: LineSpanKind::Added,
                start: 9,
                end: 9,
            },
        ];
        assert_eq!(describe_spans(&spans), "M L4-L6, A L9");
    }
}
