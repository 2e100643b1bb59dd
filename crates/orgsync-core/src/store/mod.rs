//! Local store adapter over an orgplan markdown file.
//!
//! One scope file per month: a `# TODO List` section of task lines followed
//! by top-level `# <title>` detail sections. The store parses the file into
//! canonical [`TaskRecord`]s, applies field-level mutations back onto the
//! original lines, and persists with an idempotent write-back (rewriting an
//! unchanged file produces no diff). Untouched lines are preserved
//! byte-for-byte; only mutated task lines are re-rendered.

pub mod markup;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::record::{CompletionState, PriorityTier, TaskRecord};
use markup::{DueStyle, LocalStatus, ParsedLine};

/// Header of the TODO list section.
const TODO_HEADER: &str = "# TODO List";

/// One task as it sits in the file.
#[derive(Debug, Clone)]
struct LocalTask {
    parsed: ParsedLine,
    /// Index of the task line in `lines`.
    line_idx: usize,
    /// Detail body with identity markers excluded; `None` when empty.
    detail: Option<String>,
    /// Marker name → identity value, as found in the detail section.
    identities: BTreeMap<String, String>,
}

/// Orgplan file store.
pub struct OrgplanStore {
    path: PathBuf,
    lines: Vec<String>,
    tasks: Vec<LocalTask>,
}

impl OrgplanStore {
    /// Read and parse the scope file. A file that cannot be read at all is
    /// fatal; malformed portions inside it only produce warnings.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<String>), StoreError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|source| StoreError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let mut store = Self {
            path,
            lines: content.lines().map(String::from).collect(),
            tasks: Vec::new(),
        };
        let warnings = store.parse();
        Ok((store, warnings))
    }

    /// Store over in-memory content, for tests.
    #[cfg(test)]
    fn from_content(path: impl Into<PathBuf>, content: &str) -> (Self, Vec<String>) {
        let mut store = Self {
            path: path.into(),
            lines: content.lines().map(String::from).collect(),
            tasks: Vec::new(),
        };
        let warnings = store.parse();
        (store, warnings)
    }

    fn parse(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        self.tasks.clear();

        let mut in_todo = false;
        let mut saw_todo = false;
        for (i, line) in self.lines.iter().enumerate() {
            if line.trim() == TODO_HEADER {
                in_todo = true;
                saw_todo = true;
                continue;
            }
            if in_todo && line.starts_with("# ") {
                in_todo = false;
            }
            if !in_todo {
                continue;
            }
            if line.trim().starts_with("- ") {
                if let Some(parsed) = markup::parse_task_line(line) {
                    self.tasks.push(LocalTask {
                        parsed,
                        line_idx: i,
                        detail: None,
                        identities: BTreeMap::new(),
                    });
                }
            } else if !line.trim().is_empty() && !line.starts_with('#') {
                warnings.push(format!(
                    "Line {}: TODO List section should only contain task items (starting with '- ')",
                    i + 1
                ));
            }
        }

        if !saw_todo {
            warnings.push(format!("File is missing '{TODO_HEADER}' section"));
        }

        for idx in 0..self.tasks.len() {
            self.attach_detail(idx);
        }

        warnings
    }

    fn attach_detail(&mut self, idx: usize) {
        let title = self.tasks[idx].parsed.title.clone();
        let Some((header, end)) = self.section_bounds(&title) else {
            return;
        };

        let section = &self.lines[header + 1..end];
        let mut identities = BTreeMap::new();
        let mut body_lines = Vec::new();
        for line in section {
            let markers = markup::identity_markers(line);
            if markers.is_empty() {
                body_lines.push(line.clone());
            } else {
                identities.extend(markers);
            }
        }
        let body = body_lines.join("\n").trim().to_string();

        let task = &mut self.tasks[idx];
        task.identities = identities;
        task.detail = if body.is_empty() { None } else { Some(body) };

        // Due dates may live in the detail section instead of the task line.
        if task.parsed.due_date.is_none() {
            let section_text = section.join("\n");
            let (deadlines, scheduled, plain) = markup::parse_timestamps(&section_text);
            task.parsed.due_date = markup::select_due_date(&deadlines, &scheduled, &plain);
            if task.parsed.due_date.is_some() {
                task.parsed.due_style = None; // marker lives in the detail, not the line
            }
        }
    }

    /// Canonical records in file order. Identity markers are reported under
    /// their marker name (`ms-todo-id`, `google-tasks-id`).
    pub fn records(&self) -> Vec<TaskRecord> {
        self.tasks
            .iter()
            .map(|task| TaskRecord {
                title: task.parsed.title.clone(),
                completion: LocalStatus::completion(task.parsed.status),
                priority: task.parsed.priority_level.map(PriorityTier::from_level),
                due_date: task.parsed.due_date,
                detail: task.detail.clone(),
                tags: task.parsed.tags.clone(),
                identities: task.identities.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the task with this exact normalized title, if present.
    pub fn find_by_title(&self, title: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.parsed.title == title)
    }

    /// Mark a task completed (status `[DONE]` on the task line).
    pub fn mark_completed(&mut self, idx: usize) -> Result<(), StoreError> {
        let task = self.task_mut(idx)?;
        if !matches!(
            task.parsed.status,
            Some(LocalStatus::Done) | Some(LocalStatus::Delegated) | Some(LocalStatus::Canceled)
        ) {
            task.parsed.status = Some(LocalStatus::Done);
            self.rerender_line(idx);
        }
        Ok(())
    }

    /// Set the `#pN` priority tag from a tier.
    pub fn set_priority(&mut self, idx: usize, tier: PriorityTier) -> Result<(), StoreError> {
        let task = self.task_mut(idx)?;
        if task.parsed.priority_level != Some(tier.level()) {
            task.parsed.priority_level = Some(tier.level());
            self.rerender_line(idx);
        }
        Ok(())
    }

    /// Set the due date. An existing marker keeps its style; a new marker is
    /// written in the plain `<YYYY-MM-DD>` style.
    pub fn set_due(&mut self, idx: usize, date: NaiveDate) -> Result<(), StoreError> {
        let task = self.task_mut(idx)?;
        if task.parsed.due_date == Some(date) {
            return Ok(());
        }
        task.parsed.due_date = Some(date);
        if task.parsed.due_style.is_none() {
            task.parsed.due_style = Some(DueStyle::Plain);
        }
        self.rerender_line(idx);
        Ok(())
    }

    /// Adopt a detail body. Identity markers already in the section are kept.
    pub fn set_detail(&mut self, idx: usize, body: &str) -> Result<(), StoreError> {
        let title = self.task_mut(idx)?.parsed.title.clone();
        let body = body.trim();

        match self.section_bounds(&title) {
            Some((header, end)) => {
                let kept: Vec<String> = self.lines[header + 1..end]
                    .iter()
                    .filter(|l| markup::is_identity_marker(l))
                    .cloned()
                    .collect();
                let mut replacement = kept;
                replacement.push(String::new());
                replacement.extend(body.lines().map(String::from));
                replacement.push(String::new());
                self.replace_range(header + 1, end, replacement);
            }
            None => {
                let mut section = vec![String::new(), format!("# {title}"), String::new()];
                section.extend(body.lines().map(String::from));
                let at = self.lines.len();
                self.insert_lines(at, section);
            }
        }

        self.tasks[idx].detail = if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        };
        Ok(())
    }

    /// Ensure the task's detail section carries `<!-- marker: id -->`.
    /// An existing marker with a different value is rewritten in place.
    pub fn ensure_identity(
        &mut self,
        idx: usize,
        marker: &str,
        id: &str,
    ) -> Result<(), StoreError> {
        let title = self.task_mut(idx)?.parsed.title.clone();
        if self.tasks[idx].identities.get(marker).map(String::as_str) == Some(id) {
            return Ok(());
        }

        let marker_line = markup::format_identity_marker(marker, id);
        match self.section_bounds(&title) {
            Some((header, end)) => {
                let mut rewritten = false;
                for i in header + 1..end {
                    let existing = markup::identity_markers(&self.lines[i]);
                    if existing.iter().any(|(name, _)| name == marker) {
                        self.lines[i] = marker_line.clone();
                        rewritten = true;
                        break;
                    }
                }
                if !rewritten {
                    // After any existing markers, right below the header.
                    let mut at = header + 1;
                    while at < end && markup::is_identity_marker(&self.lines[at]) {
                        at += 1;
                    }
                    self.insert_lines(at, vec![marker_line]);
                }
            }
            None => {
                let at = self.lines.len();
                self.insert_lines(at, vec![String::new(), format!("# {title}"), marker_line]);
            }
        }

        self.tasks[idx]
            .identities
            .insert(marker.to_string(), id.to_string());
        Ok(())
    }

    /// Append a new task to the TODO list, with a detail section carrying the
    /// given identity markers and the record's notes. Returns the new index.
    pub fn append_task(
        &mut self,
        record: &TaskRecord,
        markers: &[(String, String)],
    ) -> Result<usize, StoreError> {
        let parsed = ParsedLine {
            status: match record.completion {
                CompletionState::Completed => Some(LocalStatus::Done),
                CompletionState::Open => None,
            },
            priority_level: record.priority.map(|t| t.level()),
            tags: record.tags.clone(),
            title: record.title.clone(),
            due_date: record.due_date,
            due_style: record.due_date.map(|_| DueStyle::Plain),
        };
        let task_line = markup::format_task_line(&parsed);

        let at = self.todo_insert_position();
        self.insert_lines(at, vec![task_line]);

        let mut section = vec![String::new(), format!("# {}", record.title)];
        for (name, value) in markers {
            section.push(markup::format_identity_marker(name, value));
        }
        if let Some(detail) = record.detail.as_deref().filter(|d| !d.trim().is_empty()) {
            section.push(String::new());
            section.extend(detail.trim().lines().map(String::from));
        }
        let end = self.lines.len();
        self.insert_lines(end, section);

        let identities: BTreeMap<String, String> = markers.iter().cloned().collect();
        self.tasks.push(LocalTask {
            parsed,
            line_idx: at,
            detail: record
                .detail
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
            identities,
        });
        Ok(self.tasks.len() - 1)
    }

    /// Append free-form lines to a task's detail section, creating the
    /// section when missing.
    pub fn append_detail_lines(
        &mut self,
        idx: usize,
        entry_lines: &[String],
    ) -> Result<(), StoreError> {
        let title = self.task_mut(idx)?.parsed.title.clone();
        let at = match self.section_bounds(&title) {
            Some((_, end)) => end,
            None => {
                let at = self.lines.len();
                self.insert_lines(at, vec![String::new(), format!("# {title}")]);
                self.lines.len()
            }
        };
        self.insert_lines(at, entry_lines.to_vec());

        // Reparse the body so records() reflects the new content.
        self.refresh_detail(idx, &title);
        Ok(())
    }

    /// Persist the buffer when it differs from the file on disk. Returns
    /// whether anything was written.
    pub fn write_back(&self) -> Result<bool, StoreError> {
        let mut content = self.lines.join("\n");
        content.push('\n');

        if let Ok(existing) = fs::read(&self.path) {
            if existing == content.as_bytes() {
                return Ok(false);
            }
        }
        fs::write(&self.path, content).map_err(|source| StoreError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        Ok(true)
    }

    fn task_mut(&mut self, idx: usize) -> Result<&mut LocalTask, StoreError> {
        let len = self.tasks.len();
        self.tasks
            .get_mut(idx)
            .ok_or_else(|| StoreError::MissingTask(format!("index {idx} of {len}")))
    }

    fn rerender_line(&mut self, idx: usize) {
        let task = &self.tasks[idx];
        self.lines[task.line_idx] = markup::format_task_line(&task.parsed);
    }

    fn refresh_detail(&mut self, idx: usize, title: &str) {
        if let Some((header, end)) = self.section_bounds(title) {
            let body: Vec<String> = self.lines[header + 1..end]
                .iter()
                .filter(|l| !markup::is_identity_marker(l))
                .cloned()
                .collect();
            let body = body.join("\n").trim().to_string();
            self.tasks[idx].detail = if body.is_empty() { None } else { Some(body) };
        }
    }

    /// `(header index, end exclusive)` of the `# <title>` detail section.
    fn section_bounds(&self, title: &str) -> Option<(usize, usize)> {
        let header = format!("# {title}");
        let start = self
            .lines
            .iter()
            .position(|l| l.trim() == header && l.trim() != TODO_HEADER)?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| l.starts_with("# "))
            .map(|off| start + 1 + off)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }

    /// Position right after the last task line of the TODO section (or right
    /// after its header). Creates the section when the file lacks one.
    fn todo_insert_position(&mut self) -> usize {
        let Some(header) = self.lines.iter().position(|l| l.trim() == TODO_HEADER) else {
            self.insert_lines(0, vec![TODO_HEADER.to_string()]);
            return 1;
        };

        let mut at = header + 1;
        for i in header + 1..self.lines.len() {
            if self.lines[i].starts_with("# ") {
                break;
            }
            if self.lines[i].trim().starts_with("- ") {
                at = i + 1;
            }
        }
        at
    }

    /// Insert lines at `pos`, shifting tracked task line indices.
    fn insert_lines(&mut self, pos: usize, new_lines: Vec<String>) {
        let count = new_lines.len();
        for (offset, line) in new_lines.into_iter().enumerate() {
            self.lines.insert(pos + offset, line);
        }
        for task in &mut self.tasks {
            if task.line_idx >= pos {
                task.line_idx += count;
            }
        }
    }

    /// Replace `[start, end)` with `replacement`, shifting tracked indices.
    fn replace_range(&mut self, start: usize, end: usize, replacement: Vec<String>) {
        let removed = end - start;
        let added = replacement.len();
        self.lines.splice(start..end, replacement);
        for task in &mut self.tasks {
            if task.line_idx >= end {
                task.line_idx = task.line_idx + added - removed;
            }
        }
    }
}
