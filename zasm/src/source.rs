//! Source preprocessing: include expansion, insert recording, shebang
//! stripping and source-directory rooting. The output is a flat line list
//! with file/line attribution; conditional assembly happens later, so
//! includes are expanded unconditionally.

use crate::error::{AsmError, ErrorKind};
use std::fs;
use std::path::{Component, Path, PathBuf};

const MAX_INCLUDE_DEPTH: usize = 20;

/// Position of a line in the (pre-include) source tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Location {
    pub file: u16,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LineKind {
    Text(String),
    /// An included file starts here; block scopes left open inside it are
    /// popped at the matching `FileEnd`.
    FileBegin,
    FileEnd,
    /// Raw bytes from `#insert`, emitted at this position every pass.
    Insert(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceLine {
    pub loc: Location,
    pub kind: LineKind,
}

/// File-id to display-name mapping for diagnostics.
#[derive(Clone, Debug, Default)]
pub struct SourceFiles {
    names: Vec<String>,
}

impl SourceFiles {
    pub fn add(&mut self, name: &str) -> u16 {
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    pub fn name(&self, id: u16) -> &str {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("<source>")
    }
}

struct Preprocessor {
    files: SourceFiles,
    lines: Vec<SourceLine>,
    root_dir: PathBuf,
    cgi_mode: bool,
    stack: Vec<PathBuf>,
}

/// Lexical `..` resolution; never touches the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn directive_argument(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    if rest.len() >= 2 && rest.starts_with('"') {
        rest[1..].find('"').map(|end| &rest[1..=end])
    } else {
        None
    }
}

impl Preprocessor {
    fn resolve(&self, file: &str, loc: Location) -> Result<PathBuf, AsmError> {
        let joined = normalize(&self.root_dir.join(file));
        if self.cgi_mode && !joined.starts_with(&self.root_dir) {
            return Err(AsmError::new(
                ErrorKind::Io,
                format!("path \"{}\" escapes the source directory", file),
            )
            .at(self.files.name(loc.file), loc.line));
        }
        Ok(joined)
    }

    fn process_file(&mut self, path: &Path, display: &str) -> Result<(), AsmError> {
        if self.stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(AsmError::new(
                ErrorKind::Io,
                format!("include depth exceeds {}", MAX_INCLUDE_DEPTH),
            ));
        }
        if self.stack.iter().any(|p| p == path) {
            return Err(AsmError::new(
                ErrorKind::Io,
                format!("recursive include of \"{}\"", display),
            ));
        }
        let text = fs::read_to_string(path).map_err(|err| {
            AsmError::new(ErrorKind::Io, format!("reading \"{}\" failed: {}", display, err))
        })?;
        self.stack.push(path.to_path_buf());
        let result = self.process_text(&text, display);
        self.stack.pop();
        result
    }

    fn process_text(&mut self, text: &str, display: &str) -> Result<(), AsmError> {
        let file = self.files.add(display);
        for (index, raw) in text.lines().enumerate() {
            let loc = Location {
                file,
                line: index as u32 + 1,
            };
            // Shebang only on the very first line of a file.
            if index == 0 && raw.starts_with("#!") {
                continue;
            }
            let trimmed = raw.trim_start();
            let lower = trimmed.to_ascii_lowercase();
            if lower.starts_with("#include") {
                let name = directive_argument(&trimmed["#include".len()..]).ok_or_else(|| {
                    AsmError::new(ErrorKind::Syntax, "#include expects a quoted file name")
                        .at(display, loc.line)
                })?;
                let path = self.resolve(name, loc)?;
                self.lines.push(SourceLine {
                    loc,
                    kind: LineKind::FileBegin,
                });
                self.process_file(&path, name)?;
                self.lines.push(SourceLine {
                    loc,
                    kind: LineKind::FileEnd,
                });
            } else if lower.starts_with("#insert") {
                let name = directive_argument(&trimmed["#insert".len()..]).ok_or_else(|| {
                    AsmError::new(ErrorKind::Syntax, "#insert expects a quoted file name")
                        .at(display, loc.line)
                })?;
                let path = self.resolve(name, loc)?;
                let bytes = fs::read(&path).map_err(|err| {
                    AsmError::new(ErrorKind::Io, format!("reading \"{}\" failed: {}", name, err))
                        .at(display, loc.line)
                })?;
                self.lines.push(SourceLine {
                    loc,
                    kind: LineKind::Insert(bytes),
                });
            } else {
                self.lines.push(SourceLine {
                    loc,
                    kind: LineKind::Text(raw.to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Preprocesses an in-memory source; `#include`/`#insert` resolve relative
/// to `root_dir` when given.
pub fn preprocess_str(
    text: &str,
    display: &str,
    root_dir: Option<&Path>,
    cgi_mode: bool,
) -> Result<(Vec<SourceLine>, SourceFiles), AsmError> {
    let mut pp = Preprocessor {
        files: SourceFiles::default(),
        lines: Vec::new(),
        root_dir: root_dir.map(normalize).unwrap_or_default(),
        cgi_mode,
        stack: Vec::new(),
    };
    pp.process_text(text, display)?;
    Ok((pp.lines, pp.files))
}

/// Reads and preprocesses a root file; nested paths resolve relative to it.
pub fn preprocess_file(path: &Path, cgi_mode: bool) -> Result<(Vec<SourceLine>, SourceFiles), AsmError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path)
        .map_err(|err| AsmError::new(ErrorKind::Io, format!("reading \"{}\" failed: {}", display, err)))?;
    let root_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    preprocess_str(&text, &display, Some(&root_dir), cgi_mode)
}
