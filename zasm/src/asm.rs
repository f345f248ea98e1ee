//! The assembly driver: pass loop, per-line dispatch, conditional stack,
//! macro expansion and label convergence bookkeeping.

use crate::error::{AsmError, ErrorKind, ErrorList};
use crate::expr::{self, EvalContext, Expr};
use crate::labels::{LabelId, LabelPool, LabelScope};
use crate::parser::{pratt, pratt_flat, Rule};
use crate::segments::{Segment, SegmentKind, TestSpec};
use crate::source::{self, LineKind, Location, SourceFiles, SourceLine};
use crate::value::{Validity, Value};
use byteorder::ByteOrder;
use pest::pratt_parser::PrattParser;
use util::Endian;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use z80::CpuKind;

pub const MAX_COND_DEPTH: usize = 32;
const MAX_EXPANSION_DEPTH: usize = 64;
const MAX_REPT_COUNT: i32 = 0x1_0000;

/// Configuration knobs; the compiler-path hints are carried for the front
/// end but the core never invokes a compiler itself.
#[derive(Clone, Debug)]
pub struct Options {
    pub cpu: CpuKind,
    pub max_errors: usize,
    pub max_passes: u32,
    pub verbose: u8,
    pub default_target: Option<String>,
    pub ixcbr2_enabled: bool,
    pub ixcbxh_enabled: bool,
    pub syntax_8080: bool,
    pub convert_8080: bool,
    pub allow_dotnames: bool,
    pub require_colon: bool,
    pub casefold: bool,
    pub flat_operators: bool,
    pub cgi_mode: bool,
    pub compare_to_old: bool,
    pub c_compiler: Option<PathBuf>,
    pub c_includes: Option<PathBuf>,
    pub stdlib_dir: Option<PathBuf>,
    pub sdcc_compiler_path: Option<PathBuf>,
    pub sdcc_include_path: Option<PathBuf>,
    pub sdcc_library_path: Option<PathBuf>,
    pub vcc_compiler_path: Option<PathBuf>,
    pub vcc_include_path: Option<PathBuf>,
    pub vcc_library_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            cpu: CpuKind::Z80,
            max_errors: 30,
            max_passes: 10,
            verbose: 0,
            default_target: None,
            ixcbr2_enabled: false,
            ixcbxh_enabled: false,
            syntax_8080: false,
            convert_8080: false,
            allow_dotnames: false,
            require_colon: false,
            casefold: false,
            flat_operators: false,
            cgi_mode: false,
            compare_to_old: false,
            c_compiler: None,
            c_includes: None,
            stdlib_dir: None,
            sdcc_compiler_path: None,
            sdcc_include_path: None,
            sdcc_library_path: None,
            vcc_compiler_path: None,
            vcc_include_path: None,
            vcc_library_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinalSegment {
    pub name: String,
    pub is_data: bool,
    pub is_test: bool,
    pub address: u32,
    pub bytes: Vec<u8>,
    /// Logical size beyond the emitted bytes (space reservations).
    pub reserved: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Assembly {
    pub segments: Vec<FinalSegment>,
    pub symbols: Vec<(String, i32)>,
    pub target: Option<String>,
}

impl Assembly {
    /// Image of everything that produces bytes (code and test segments).
    pub fn image(&self) -> romfile::Image {
        let mut image = romfile::Image::new();
        for seg in self.segments.iter().filter(|s| !s.is_data) {
            image.push(seg.address, seg.bytes.clone());
        }
        image
    }

    pub fn segment(&self, name: &str) -> Option<&FinalSegment> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn symbol(&self, name: &str) -> Option<i32> {
        self.symbols
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }
}

#[derive(Clone, Copy, Debug)]
struct CondFrame {
    taking: bool,
    taken_before: bool,
    saw_else: bool,
}

struct MacroDef {
    params: Vec<String>,
    body: Vec<SourceLine>,
}

enum CollectKind {
    Macro(String, Vec<String>),
    Rept(u32),
}

struct Collecting {
    kind: CollectKind,
    body: Vec<SourceLine>,
    depth: u32,
}

struct Frame {
    lines: Rc<Vec<SourceLine>>,
    pos: usize,
}

pub struct Assembler {
    pub(crate) opts: Options,
    files: SourceFiles,
    lines: Rc<Vec<SourceLine>>,
    pratt: PrattParser<Rule>,
    pub(crate) pass: u32,
    pub(crate) final_pass: bool,
    pub(crate) labels: LabelPool,
    pub(crate) segments: Vec<Segment>,
    pub(crate) cur: Option<usize>,
    macros: HashMap<String, Rc<MacroDef>>,
    macro_counter: u32,
    cond: Vec<CondFrame>,
    cond_off: u32,
    if_values: Vec<bool>,
    if_idx: usize,
    local_ordinal: usize,
    pub(crate) errors: ErrorList,
    labels_changed: u32,
    labels_resolved: u32,
    preliminary_refs: u32,
    invalid_refs: Vec<(LabelId, Location)>,
    last_regular: String,
    pub(crate) loc: Location,
    pub(crate) cpu: CpuKind,
    syntax_8080: bool,
    target: Option<String>,
    scope_marks: Vec<usize>,
    collecting: Option<Collecting>,
    ended: bool,
    aborted: bool,
    /// Something (rept count, defs size) could not be sized this pass and
    /// wants a retry.
    retry_needed: bool,
}

/// Assembles in-memory source text. `#include`/`#insert` are unavailable
/// without a source directory; use [`assemble_path`] for file input.
pub fn assemble(source: &str, opts: Options) -> Result<Assembly, ErrorList> {
    match source::preprocess_str(source, "<source>", None, opts.cgi_mode) {
        Ok((lines, files)) => Assembler::new(opts, lines, files).run(),
        Err(err) => {
            let mut list = ErrorList::new(1);
            list.push(err);
            Err(list)
        }
    }
}

pub fn assemble_path(path: &Path, opts: Options) -> Result<Assembly, ErrorList> {
    match source::preprocess_file(path, opts.cgi_mode) {
        Ok((lines, files)) => Assembler::new(opts, lines, files).run(),
        Err(err) => {
            let mut list = ErrorList::new(1);
            list.push(err);
            Err(list)
        }
    }
}

impl Assembler {
    fn new(opts: Options, lines: Vec<SourceLine>, files: SourceFiles) -> Assembler {
        let pratt = if opts.flat_operators {
            pratt_flat()
        } else {
            pratt()
        };
        let errors = ErrorList::new(opts.max_errors);
        let cpu = opts.cpu;
        let syntax_8080 = opts.syntax_8080;
        let target = opts.default_target.clone();
        Assembler {
            opts,
            files,
            lines: Rc::new(lines),
            pratt,
            pass: 0,
            final_pass: false,
            labels: LabelPool::new(),
            segments: Vec::new(),
            cur: None,
            macros: HashMap::new(),
            macro_counter: 0,
            cond: Vec::new(),
            cond_off: 0,
            if_values: Vec::new(),
            if_idx: 0,
            local_ordinal: 0,
            errors,
            labels_changed: 0,
            labels_resolved: 0,
            preliminary_refs: 0,
            invalid_refs: Vec::new(),
            last_regular: String::new(),
            loc: Location::default(),
            cpu,
            syntax_8080,
            target,
            scope_marks: Vec::new(),
            collecting: None,
            ended: false,
            aborted: false,
            retry_needed: false,
        }
    }

    fn run(mut self) -> Result<Assembly, ErrorList> {
        let mut prev_bufs: Vec<Vec<u8>> = Vec::new();
        let mut pass = 0;
        loop {
            pass += 1;
            self.begin_pass(pass);
            self.run_pass();
            if self.opts.verbose >= 3 {
                eprintln!(
                    "pass {}: {} labels changed, {} resolved, {} errors",
                    pass,
                    self.labels_changed,
                    self.labels_resolved,
                    self.errors.len()
                );
            }

            if self.final_pass {
                let current: Vec<Vec<u8>> = self.segments.iter().map(|s| s.buf.clone()).collect();
                if self.errors.is_empty() && current != prev_bufs {
                    self.errors.push(AsmError::new(
                        ErrorKind::Convergence,
                        "emitted bytes changed between stable passes",
                    ));
                }
                break;
            }
            if self.aborted {
                break;
            }

            let stable = self.labels_changed == 0 && !self.retry_needed && !self.has_pending_refs();
            if stable {
                self.final_pass = true;
            } else if pass >= self.opts.max_passes {
                self.errors.push(AsmError::new(
                    ErrorKind::Convergence,
                    format!("assembly did not converge after {} passes", pass),
                ));
                break;
            }
            prev_bufs = self.segments.iter().map(|s| s.buf.clone()).collect();
        }

        if self.errors.is_empty() {
            self.run_tests();
        }
        if self.errors.is_empty() {
            Ok(self.finish())
        } else {
            Err(self.errors)
        }
    }

    fn begin_pass(&mut self, pass: u32) {
        self.pass = pass;
        self.errors.clear();
        self.labels_changed = 0;
        self.labels_resolved = 0;
        self.preliminary_refs = 0;
        self.invalid_refs.clear();
        self.cond.clear();
        self.cond_off = 0;
        self.if_idx = 0;
        self.local_ordinal = 0;
        self.labels.begin_pass();
        for seg in &mut self.segments {
            seg.begin_pass();
        }
        self.cur = None;
        self.macros.clear();
        self.macro_counter = 0;
        self.last_regular.clear();
        self.scope_marks.clear();
        self.collecting = None;
        self.ended = false;
        self.aborted = false;
        self.retry_needed = false;
        self.cpu = self.opts.cpu;
        self.syntax_8080 = self.opts.syntax_8080;
        self.target = self.opts.default_target.clone();
    }

    fn run_pass(&mut self) {
        let mut frames = vec![Frame {
            lines: Rc::clone(&self.lines),
            pos: 0,
        }];
        loop {
            if self.ended || self.aborted {
                break;
            }
            let next = match frames.last_mut() {
                Some(frame) => {
                    let line = frame.lines.get(frame.pos).cloned();
                    if line.is_some() {
                        frame.pos += 1;
                    }
                    line
                }
                None => break,
            };
            let line = match next {
                Some(line) => line,
                None => {
                    frames.pop();
                    continue;
                }
            };
            self.loc = line.loc;
            match line.kind {
                LineKind::FileBegin => self.scope_marks.push(self.labels.depth()),
                LineKind::FileEnd => {
                    if let Some(depth) = self.scope_marks.pop() {
                        self.labels.truncate_to(depth);
                    }
                }
                LineKind::Insert(bytes) => {
                    if self.cond_off == 0 && self.collecting.is_none() {
                        self.emit_slice(&bytes);
                    }
                }
                LineKind::Text(text) => {
                    if let Some(expansion) = self.handle_text(&text) {
                        if frames.len() >= MAX_EXPANSION_DEPTH {
                            self.error(ErrorKind::Syntax, "macro expansion too deep");
                        } else {
                            frames.push(Frame {
                                lines: expansion,
                                pos: 0,
                            });
                        }
                    }
                }
            }
        }

        if self.collecting.is_some() {
            self.error(ErrorKind::Syntax, "macro or rept body not closed by endm");
            self.collecting = None;
        }
        if !self.cond.is_empty() {
            self.error(ErrorKind::Syntax, "#if without matching #endif");
        }
        self.end_of_pass_segments();
        if self.final_pass {
            self.final_checks();
        }
    }

    /// Chains addresses of segments declared without one onto their
    /// predecessor, and closes dangling `.phase` blocks.
    fn end_of_pass_segments(&mut self) {
        for i in 0..self.segments.len() {
            if self.segments[i].phase.is_some() {
                let name = self.segments[i].name.clone();
                let loc = self.segments[i].declared_at;
                self.error_at(
                    ErrorKind::Segment,
                    format!(".phase without .dephase in segment '{}'", name),
                    loc,
                );
            }
            if i > 0 && !self.segments[i].has_explicit_address {
                let prev = &self.segments[i - 1];
                let chained = prev.address + Value::valid(prev.lpos as i32);
                if self.segments[i].address != chained {
                    self.segments[i].address = chained;
                    self.labels_changed += 1;
                }
            }
        }
    }

    fn final_checks(&mut self) {
        let mut reported: HashSet<usize> = HashSet::new();
        for (id, loc) in self.invalid_refs.clone() {
            let label = self.labels.get(id);
            if label.is_used && !label.is_defined && reported.insert(id.0) {
                let message = if label.is_global {
                    format!("undefined label '{}' (declared .globl)", label.name)
                } else {
                    format!("undefined label '{}'", label.name)
                };
                self.error_at(ErrorKind::Label, message, loc);
            }
        }
        let missing: Vec<String> = self
            .labels
            .iter()
            .filter(|l| l.is_required && !l.is_defined)
            .map(|l| l.name.clone())
            .collect();
        for name in missing {
            self.error(
                ErrorKind::Label,
                format!("required label '{}' was never defined", name),
            );
        }
        for i in 0..self.segments.len() {
            if !self.segments[i].address.is_valid() {
                let name = self.segments[i].name.clone();
                let loc = self.segments[i].declared_at;
                self.error_at(
                    ErrorKind::Segment,
                    format!("address of segment '{}' did not resolve", name),
                    loc,
                );
            }
        }
    }

    fn has_pending_refs(&self) -> bool {
        self.preliminary_refs > 0
            || self
                .invalid_refs
                .iter()
                .any(|(id, _)| self.labels.get(*id).value.validity != Validity::Invalid)
    }

    // ---- per-line handling ----

    fn handle_text(&mut self, text: &str) -> Option<Rc<Vec<SourceLine>>> {
        if self.collecting.is_some() {
            return self.collect_line(text);
        }

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return None;
        }

        if self.cond_off > 0 {
            let (word, rest) = first_word(trimmed);
            match word.to_ascii_lowercase().as_str() {
                "#if" => self.dir_if_suppressed(),
                "#elif" => self.dir_elif(rest),
                "#else" => self.dir_else(),
                "#endif" => self.dir_endif(),
                _ => {}
            }
            return None;
        }

        let text = if text.contains('{') {
            match self.substitute_braces(text) {
                Some(t) => t,
                None => return None,
            }
        } else {
            text.to_string()
        };

        let (label, rest) = split_label(&text, self.opts.require_colon);
        let rest = rest.trim();
        let (word, args) = first_word(rest);
        let word_lc = word.to_ascii_lowercase();

        if let Some(name) = &label {
            match word_lc.as_str() {
                "equ" => {
                    let v = self.eval_text(args);
                    self.set_label(name, v);
                    return None;
                }
                "macro" => {
                    self.begin_macro(name, args);
                    return None;
                }
                _ => self.define_position_label(name),
            }
        }
        if rest.is_empty() || rest.starts_with(';') {
            return None;
        }

        self.dispatch(&word_lc, args)
    }

    fn dispatch(&mut self, word: &str, args: &str) -> Option<Rc<Vec<SourceLine>>> {
        match word {
            "#if" => self.dir_if(args),
            "#elif" => self.dir_elif(args),
            "#else" => self.dir_else(),
            "#endif" => self.dir_endif(),
            "#code" => self.dir_segment(args, false, false),
            "#data" => self.dir_segment(args, true, false),
            "#test" => self.dir_segment(args, false, true),
            "#target" => {
                let (name, _) = first_word(args);
                self.target = Some(name.to_ascii_lowercase());
            }
            "#cpu" => self.dir_cpu(args),
            "#define" => {
                let (name, rest) = first_word(args);
                if name.is_empty() {
                    self.error(ErrorKind::Syntax, "#define expects a name");
                } else {
                    let v = if rest.trim().is_empty() || rest.trim_start().starts_with(';') {
                        Value::valid(1)
                    } else {
                        self.eval_text(rest)
                    };
                    self.set_label(name, v);
                }
            }
            "#assert" => {
                let v = self.eval_text(args);
                if self.final_pass {
                    if !v.is_valid() {
                        self.error(ErrorKind::Value, "assertion did not resolve");
                    } else if v.value == 0 {
                        self.error(ErrorKind::Value, format!("assertion failed: {}", args.trim()));
                    }
                }
            }
            "#end" | "end" => self.ended = true,
            "#include" | "#insert" => self.error(
                ErrorKind::Syntax,
                format!("{} cannot be produced by macro expansion", word),
            ),
            "#charset" | "#compress" => self.error(
                ErrorKind::Syntax,
                format!("{} is handled by the target writers", word),
            ),
            "#cflags" => {}
            w if w.starts_with('#') => {
                self.error(ErrorKind::Syntax, format!("unknown directive '{}'", w))
            }

            "org" => self.op_org(args),
            "align" => self.op_align(args),
            "defb" | "db" => self.op_defb(args, 1),
            "defw" | "dw" => self.op_defb(args, 2),
            "defm" | "dm" => self.op_defb(args, 1),
            "defs" | "ds" => self.op_defs(args),
            "hex" => self.op_hex(args),
            "phase" | ".phase" => self.op_phase(args),
            "dephase" | ".dephase" => self.op_dephase(),
            ".local" => {
                self.local_ordinal += 1;
                let ordinal = self.local_ordinal;
                self.labels.enter_block(ordinal);
            }
            ".endlocal" => {
                if !self.labels.leave_block() {
                    self.error(ErrorKind::Syntax, ".endlocal without .local");
                }
            }
            ".globl" => {
                let (name, _) = first_word(args);
                if name.is_empty() {
                    self.error(ErrorKind::Syntax, ".globl expects a label name");
                } else {
                    let key = self.label_key(name);
                    let id = self.labels.find_or_create_global(&key);
                    self.labels.get_mut(id).is_global = true;
                }
            }
            ".z80" => {
                self.cpu = CpuKind::Z80;
                self.syntax_8080 = false;
            }
            ".z180" => {
                self.cpu = CpuKind::Z180;
                self.syntax_8080 = false;
            }
            ".8080" => {
                self.cpu = CpuKind::I8080;
                self.syntax_8080 = true;
            }
            ".seed" => self.op_seed(args),
            ".expect" => self.op_expect(args),

            "macro" => {
                let (name, params) = first_word(args);
                if name.is_empty() {
                    self.error(ErrorKind::Syntax, "macro expects a name");
                } else {
                    let name = name.to_string();
                    self.begin_macro(&name, params.trim_start_matches(','));
                }
            }
            "rept" => self.begin_rept(args),
            "endm" => self.error(ErrorKind::Syntax, "endm without macro or rept"),
            "equ" => self.error(ErrorKind::Syntax, "equ requires a label"),

            _ => {
                if let Some(mac) = self.macros.get(&self.fold_name(word)).cloned() {
                    return self.expand_macro(&mac, args);
                }
                let result = if self.syntax_8080 {
                    self.asm_8080_instr(word, args)
                } else {
                    self.asm_z80_instr(word, args)
                };
                if let Err(message) = result {
                    self.error(ErrorKind::Syntax, message);
                }
            }
        }
        None
    }

    // ---- conditionals ----

    fn eval_condition(&mut self, args: &str) -> bool {
        let idx = self.if_idx;
        self.if_idx += 1;
        let v = self.eval_text(args);
        if v.is_valid() {
            let truth = v.value != 0;
            if idx < self.if_values.len() {
                if self.if_values[idx] != truth {
                    self.if_values[idx] = truth;
                    self.labels_changed += 1;
                }
            } else {
                self.if_values.push(truth);
            }
            truth
        } else if idx < self.if_values.len() {
            self.if_values[idx]
        } else {
            // First pass defaults an undecidable condition to assembling.
            self.if_values.push(true);
            true
        }
    }

    fn dir_if(&mut self, args: &str) {
        if self.cond.len() >= MAX_COND_DEPTH {
            self.error(ErrorKind::Syntax, "conditionals nested too deeply");
            return;
        }
        let truth = self.eval_condition(args);
        self.cond.push(CondFrame {
            taking: truth,
            taken_before: truth,
            saw_else: false,
        });
        if !truth {
            self.cond_off += 1;
        }
        self.check_cond_invariant();
    }

    /// `#if` inside a suppressed block: the whole frame is inert.
    fn dir_if_suppressed(&mut self) {
        if self.cond.len() >= MAX_COND_DEPTH {
            self.error(ErrorKind::Syntax, "conditionals nested too deeply");
            return;
        }
        self.cond.push(CondFrame {
            taking: false,
            taken_before: true,
            saw_else: false,
        });
        self.cond_off += 1;
        self.check_cond_invariant();
    }

    fn dir_elif(&mut self, args: &str) {
        let frame = match self.cond.last() {
            Some(f) => *f,
            None => {
                self.error(ErrorKind::Syntax, "#elif without #if");
                return;
            }
        };
        if frame.saw_else {
            self.error(ErrorKind::Syntax, "#elif after #else");
            return;
        }
        let outer_off = self.cond_off - if frame.taking { 0 } else { 1 };
        if frame.taking {
            let top = self.cond.last_mut().unwrap();
            top.taking = false;
            self.cond_off += 1;
        } else if !frame.taken_before && outer_off == 0 {
            let truth = self.eval_condition(args);
            if truth {
                let top = self.cond.last_mut().unwrap();
                top.taking = true;
                top.taken_before = true;
                self.cond_off -= 1;
            }
        }
        self.check_cond_invariant();
    }

    fn dir_else(&mut self) {
        let frame = match self.cond.last() {
            Some(f) => *f,
            None => {
                self.error(ErrorKind::Syntax, "#else without #if");
                return;
            }
        };
        if frame.saw_else {
            self.error(ErrorKind::Syntax, "duplicate #else");
            return;
        }
        let outer_off = self.cond_off - if frame.taking { 0 } else { 1 };
        let top = self.cond.last_mut().unwrap();
        top.saw_else = true;
        if frame.taking {
            top.taking = false;
            self.cond_off += 1;
        } else if !frame.taken_before && outer_off == 0 {
            top.taking = true;
            top.taken_before = true;
            self.cond_off -= 1;
        }
        self.check_cond_invariant();
    }

    fn dir_endif(&mut self) {
        match self.cond.pop() {
            Some(frame) => {
                if !frame.taking {
                    self.cond_off -= 1;
                }
            }
            None => self.error(ErrorKind::Syntax, "#endif without #if"),
        }
        self.check_cond_invariant();
    }

    fn check_cond_invariant(&self) {
        debug_assert_eq!(
            self.cond_off as usize,
            self.cond.iter().filter(|f| !f.taking).count()
        );
    }

    // ---- segments ----

    fn dir_segment(&mut self, args: &str, data: bool, test: bool) {
        let parts = split_list(args);
        if parts.is_empty() {
            self.error(ErrorKind::Syntax, "segment directive expects a name");
            return;
        }
        let name = self.fold_name(&parts[0]);
        if !is_ident(&name) {
            self.error(
                ErrorKind::Syntax,
                format!("'{}' is not a valid segment name", parts[0]),
            );
            return;
        }
        let address = parts.get(1).map(|t| self.eval_text(t));
        let third = parts.get(2).map(|t| self.eval_text(t));

        let index = match self.segments.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                let kind = if data {
                    SegmentKind::Data
                } else if test {
                    SegmentKind::Test(TestSpec::default())
                } else {
                    SegmentKind::Code
                };
                self.segments.push(Segment::new(&name, kind, self.loc));
                self.segments.len() - 1
            }
        };
        let matches_kind = match &self.segments[index].kind {
            SegmentKind::Data => data,
            SegmentKind::Test(_) => test,
            SegmentKind::Code => !data && !test,
        };
        if !matches_kind {
            self.error(
                ErrorKind::Segment,
                format!("segment '{}' redeclared with a different kind", name),
            );
            return;
        }
        if let Some(v) = address {
            self.segments[index].address = v;
            self.segments[index].has_explicit_address = true;
        }
        if let Some(v) = third {
            if test {
                if let SegmentKind::Test(spec) = &mut self.segments[index].kind {
                    spec.cycle_limit = Some(v);
                }
            } else {
                self.segments[index].max_size = v;
            }
        }
        self.cur = Some(index);
    }

    fn dir_cpu(&mut self, args: &str) {
        let (name, _) = first_word(args);
        match name.to_ascii_lowercase().as_str() {
            "z80" => {
                self.cpu = CpuKind::Z80;
                self.syntax_8080 = false;
            }
            "z180" | "hd64180" => {
                self.cpu = CpuKind::Z180;
                self.syntax_8080 = false;
            }
            "8080" | "i8080" => {
                self.cpu = CpuKind::I8080;
                self.syntax_8080 = true;
            }
            other => self.error(ErrorKind::Syntax, format!("unknown cpu '{}'", other)),
        }
    }

    // ---- labels ----

    pub(crate) fn fold_name(&self, name: &str) -> String {
        if self.opts.casefold {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        }
    }

    /// Full lookup key; reusable (dot) labels attach to the last regular
    /// label's name.
    pub(crate) fn label_key(&self, name: &str) -> String {
        let folded = self.fold_name(name);
        if folded.starts_with('.') && !self.opts.allow_dotnames {
            format!("{}{}", self.last_regular, folded)
        } else {
            folded
        }
    }

    fn scope_kind_for(&self, name: &str) -> LabelScope {
        if name.starts_with('.') && !self.opts.allow_dotnames {
            LabelScope::Reusable
        } else if self.labels.depth() > 1 {
            LabelScope::Block
        } else {
            LabelScope::Global
        }
    }

    fn define_position_label(&mut self, name: &str) {
        self.ensure_segment();
        let v = self.here();
        self.set_label(name, v);
    }

    pub(crate) fn set_label(&mut self, name: &str, new: Value) {
        let key = self.label_key(name);
        let scope_kind = self.scope_kind_for(name);
        if !name.starts_with('.') {
            self.last_regular = self.fold_name(name);
        }
        let id = self.labels.define(&key, scope_kind);
        let loc = self.loc;
        let pass = self.pass;

        let label = self.labels.get_mut(id);
        if label.defined_in_pass == pass {
            let message = match label.defined_at {
                Some(at) if at != loc => format!(
                    "label '{}' redefined (first defined on line {})",
                    label.name, at.line
                ),
                _ => format!("label '{}' redefined", label.name),
            };
            self.error(ErrorKind::Label, message);
            return;
        }
        let old = label.value;
        label.is_defined = true;
        label.defined_in_pass = pass;
        label.defined_at = Some(loc);

        let value_kept = old.validity != Validity::Invalid && old.value == new.value;
        if old.validity == Validity::Valid && !value_kept {
            let message = format!(
                "label '{}' redefined (was {}, now {})",
                label.name, old.value, new.value
            );
            self.error(ErrorKind::Label, message);
            return;
        }

        // A definition makes progress when a value appears or changes; a
        // still-Invalid reassignment is no progress at all.
        let changed = if old.validity == Validity::Invalid {
            new.validity != Validity::Invalid
        } else {
            old.value != new.value
        };
        let validity = if value_kept {
            // Monotone: an unchanged value never loses validity.
            std::cmp::max(old.validity, new.validity)
        } else if changed {
            std::cmp::min(new.validity, Validity::Preliminary)
        } else {
            Validity::Invalid
        };
        let label = self.labels.get_mut(id);
        label.value = Value::new(new.value, validity);
        if changed {
            self.labels_changed += 1;
        }
        if old.validity == Validity::Preliminary && validity == Validity::Valid {
            self.labels_resolved += 1;
        }
    }

    // ---- macros ----

    fn begin_macro(&mut self, name: &str, params_text: &str) {
        let name = self.fold_name(name);
        let params = split_list(params_text);
        for p in &params {
            if !is_ident(p) {
                self.error(
                    ErrorKind::Syntax,
                    format!("'{}' is not a valid macro parameter", p),
                );
                return;
            }
        }
        self.collecting = Some(Collecting {
            kind: CollectKind::Macro(name, params),
            body: Vec::new(),
            depth: 0,
        });
    }

    fn begin_rept(&mut self, args: &str) {
        let count = self.eval_text(args);
        let n = if !count.is_valid() {
            // Retried next pass once the count settles.
            self.retry_needed = true;
            if self.final_pass {
                self.error(ErrorKind::Value, "rept count did not resolve");
            }
            0
        } else if count.value < 0 || count.value > MAX_REPT_COUNT {
            self.error(
                ErrorKind::Value,
                format!("rept count {} out of range", count.value),
            );
            0
        } else {
            count.value as u32
        };
        self.collecting = Some(Collecting {
            kind: CollectKind::Rept(n),
            body: Vec::new(),
            depth: 0,
        });
    }

    fn collect_line(&mut self, text: &str) -> Option<Rc<Vec<SourceLine>>> {
        let trimmed = text.trim();
        let (word, rest) = first_word(trimmed);
        let word_lc = word.to_ascii_lowercase();
        let (second, _) = first_word(rest.trim());
        let second_lc = second.to_ascii_lowercase();

        if word_lc == "endm" {
            let collecting = self.collecting.as_mut().unwrap();
            if collecting.depth > 0 {
                collecting.depth -= 1;
            } else {
                let Collecting { kind, body, .. } = self.collecting.take().unwrap();
                match kind {
                    CollectKind::Macro(name, params) => {
                        let def = Rc::new(MacroDef { params, body });
                        if self.macros.insert(name.clone(), def).is_some() {
                            self.error(
                                ErrorKind::Label,
                                format!("macro '{}' redefined", name),
                            );
                        }
                    }
                    CollectKind::Rept(n) => {
                        let mut lines = Vec::with_capacity(body.len() * n as usize);
                        for _ in 0..n {
                            lines.extend(body.iter().cloned());
                        }
                        return Some(Rc::new(lines));
                    }
                }
            }
            return None;
        }

        if word_lc == "macro" || word_lc == "rept" || second_lc == "macro" {
            self.collecting.as_mut().unwrap().depth += 1;
        }
        self.collecting.as_mut().unwrap().body.push(SourceLine {
            loc: self.loc,
            kind: LineKind::Text(text.to_string()),
        });
        None
    }

    fn expand_macro(&mut self, mac: &Rc<MacroDef>, args_text: &str) -> Option<Rc<Vec<SourceLine>>> {
        self.macro_counter += 1;
        let counter = self.macro_counter;
        let args = split_list(args_text);
        if args.len() != mac.params.len() {
            self.error(
                ErrorKind::Syntax,
                format!(
                    "macro expects {} argument(s), got {}",
                    mac.params.len(),
                    args.len()
                ),
            );
            return None;
        }
        let lines: Vec<SourceLine> = mac
            .body
            .iter()
            .map(|line| {
                let kind = match &line.kind {
                    LineKind::Text(text) => LineKind::Text(substitute_tokens(
                        text,
                        &mac.params,
                        &args,
                        counter,
                        self.opts.allow_dotnames,
                    )),
                    other => other.clone(),
                };
                SourceLine {
                    loc: line.loc,
                    kind,
                }
            })
            .collect();
        Some(Rc::new(lines))
    }

    // ---- brace substitution ----

    fn substitute_braces(&mut self, text: &str) -> Option<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        loop {
            match find_unquoted(rest, '{') {
                None => {
                    out.push_str(rest);
                    return Some(out);
                }
                Some(open) => {
                    out.push_str(&rest[..open]);
                    let tail = &rest[open + 1..];
                    let close = match find_unquoted(tail, '}') {
                        Some(c) => c,
                        None => {
                            self.error(ErrorKind::Syntax, "unmatched '{' in line");
                            return None;
                        }
                    };
                    let v = self.eval_text(&tail[..close]);
                    if !v.is_valid() && self.final_pass {
                        self.error(ErrorKind::Value, "braced expression did not resolve");
                    }
                    out.push_str(&v.value.to_string());
                    rest = &tail[close + 1..];
                }
            }
        }
    }

    // ---- evaluation and emission plumbing ----

    pub(crate) fn pratt_table(&self) -> &PrattParser<Rule> {
        &self.pratt
    }

    /// Flags that something could not be sized this pass and needs another.
    pub(crate) fn request_retry(&mut self) {
        self.retry_needed = true;
    }

    pub(crate) fn parse_expr_text(&mut self, text: &str) -> Option<Expr> {
        let parsed = expr::parse(text, &self.pratt);
        match parsed {
            Ok(e) => Some(e),
            Err(message) => {
                self.error(ErrorKind::Syntax, message);
                None
            }
        }
    }

    pub(crate) fn eval_text(&mut self, text: &str) -> Value {
        match self.parse_expr_text(text) {
            Some(e) => self.eval_expr(&e),
            None => Value::invalid(),
        }
    }

    pub(crate) fn eval_expr(&mut self, e: &Expr) -> Value {
        let result = expr::eval(e, self);
        match result {
            Ok(v) => v,
            Err(message) => {
                self.error(ErrorKind::Value, message);
                Value::invalid()
            }
        }
    }

    pub(crate) fn ensure_segment(&mut self) -> usize {
        if let Some(index) = self.cur {
            return index;
        }
        let index = match self.segments.iter().position(|s| s.name == "(code)") {
            Some(index) => index,
            None => {
                self.segments
                    .push(Segment::new("(code)", SegmentKind::Code, self.loc));
                self.segments.len() - 1
            }
        };
        self.cur = Some(index);
        index
    }

    pub(crate) fn emit_slice(&mut self, bytes: &[u8]) {
        let index = self.ensure_segment();
        if let Err(message) = self.segments[index].emit(bytes) {
            self.error(ErrorKind::Segment, message);
        }
    }

    pub(crate) fn reserve_space(&mut self, count: u32) {
        let index = self.ensure_segment();
        if let Err(message) = self.segments[index].reserve(count) {
            self.error(ErrorKind::Segment, message);
        }
    }

    /// Byte operand with range checking on final values only.
    pub(crate) fn byte_of(&mut self, v: Value) -> u8 {
        if v.is_valid() && (v.value < -128 || v.value > 255) {
            self.error(
                ErrorKind::Value,
                format!("byte value {} out of range", v.value),
            );
        }
        v.value as u8
    }

    pub(crate) fn word_of(&mut self, v: Value) -> [u8; 2] {
        if v.is_valid() && (v.value < -32768 || v.value > 65535) {
            self.error(
                ErrorKind::Value,
                format!("word value {} out of range", v.value),
            );
        }
        let mut bytes = [0u8; 2];
        Endian::write_u16(&mut bytes, v.value as u16);
        bytes
    }

    /// Signed displacement for JR/DJNZ/(IX+d); preliminary overflow is
    /// tolerated, the value may still improve.
    pub(crate) fn rel_of(&mut self, target: Value, origin: Value) -> u8 {
        let off = target - origin;
        if off.is_valid() && (off.value < -128 || off.value > 127) {
            self.error(
                ErrorKind::Value,
                format!("relative jump out of range ({})", off.value),
            );
        }
        off.value as u8
    }

    pub(crate) fn disp_of(&mut self, v: Value) -> u8 {
        if v.is_valid() && (v.value < -128 || v.value > 127) {
            self.error(
                ErrorKind::Value,
                format!("index displacement {} out of range", v.value),
            );
        }
        v.value as u8
    }

    pub(crate) fn error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let loc = self.loc;
        self.error_at(kind, message, loc);
    }

    pub(crate) fn error_at(&mut self, kind: ErrorKind, message: impl Into<String>, loc: Location) {
        let file = self.files.name(loc.file).to_string();
        if !self.errors.push(AsmError::new(kind, message).at(file, loc.line)) {
            self.aborted = true;
        }
    }

    fn finish(self) -> Assembly {
        // Block-scoped labels are invisible outside their scope and stay
        // out of the symbol listing.
        let symbols = self
            .labels
            .iter()
            .filter(|l| l.is_defined && l.scope != LabelScope::Block)
            .map(|l| (l.name.clone(), l.value.value))
            .collect();
        let segments = self
            .segments
            .into_iter()
            .map(|seg| FinalSegment {
                is_data: seg.kind.is_data(),
                is_test: seg.kind.is_test(),
                address: seg.address.value as u32 & 0xFFFF,
                reserved: seg.lpos - seg.buf.len() as u32,
                bytes: seg.buf,
                name: seg.name,
            })
            .collect();
        Assembly {
            segments,
            symbols,
            target: self.target,
        }
    }
}

impl EvalContext for Assembler {
    fn lookup(&mut self, name: &str) -> Value {
        let key = self.label_key(name);
        let scope_kind = self.scope_kind_for(name);
        let id = self.labels.find_or_create(&key, scope_kind);
        let loc = self.loc;
        let label = self.labels.get_mut(id);
        label.is_used = true;
        let value = label.value;
        match value.validity {
            Validity::Valid => {}
            Validity::Preliminary => self.preliminary_refs += 1,
            Validity::Invalid => self.invalid_refs.push((id, loc)),
        }
        value
    }

    fn here(&mut self) -> Value {
        match self.cur {
            Some(index) => self.segments[index].logical_pos(),
            None => Value::valid(0),
        }
    }

    fn base(&mut self) -> Value {
        match self.cur {
            Some(index) => self.segments[index].base(),
            None => Value::valid(0),
        }
    }

    /// "Defined earlier in this pass" — the per-pass view keeps the answer
    /// identical on every pass, so conditionals using it cannot flip-flop.
    fn is_defined(&mut self, name: &str) -> bool {
        let key = self.label_key(name);
        let pass = self.pass;
        self.labels
            .find(&key)
            .map(|id| self.labels.get(id).defined_in_pass == pass)
            .unwrap_or(false)
    }

    fn mark_required(&mut self, name: &str) -> bool {
        let key = self.label_key(name);
        let pass = self.pass;
        let id = self.labels.find_or_create_global(&key);
        let label = self.labels.get_mut(id);
        label.is_required = true;
        label.is_used = true;
        label.defined_in_pass == pass
    }
}

// ---- text utilities ----

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '@'
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_char),
        _ => false,
    }
}

/// Splits the first whitespace-delimited word off `s`.
pub(crate) fn first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(|c: char| c.is_whitespace()) {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, ""),
    }
}

/// Pseudo-ops and keywords a column-0 word must not be mistaken for.
const RESERVED: &[&str] = &[
    "org", "align", "defb", "db", "defw", "dw", "defm", "dm", "defs", "ds", "hex", "phase",
    "dephase", "macro", "rept", "endm", "equ", "end", ".local", ".endlocal", ".globl", ".z80",
    ".z180", ".8080", ".phase", ".dephase", ".seed", ".expect",
];

/// Splits an optional leading label off a line. A word at column 0 is a
/// label unless it is a reserved pseudo-op; anywhere else a trailing colon
/// is required (always, with `require_colon`).
fn split_label(text: &str, require_colon: bool) -> (Option<String>, &str) {
    let indented = text.starts_with(' ') || text.starts_with('\t');
    let trimmed = text.trim_start();
    let mut chars = trimmed.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return (None, text),
    }
    let mut end = trimmed.len();
    for (i, c) in chars {
        if !is_ident_char(c) && c != '\'' {
            end = i;
            break;
        }
    }
    // A trailing apostrophe belongs to the ident per the grammar but never
    // to a label name.
    let word = &trimmed[..end];
    let rest = &trimmed[end..];
    if rest.starts_with(':') {
        return (Some(word.to_string()), &rest[1..]);
    }
    if indented || require_colon {
        return (None, text);
    }
    if word.starts_with('#') || RESERVED.contains(&word.to_ascii_lowercase().as_str()) {
        return (None, text);
    }
    (Some(word.to_string()), rest)
}

/// Splits on top-level commas, honoring quotes and parentheses.
pub(crate) fn split_list(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ';' => break,
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                } else if c == needle {
                    return Some(i);
                } else if c == ';' {
                    return None;
                }
            }
        }
    }
    None
}

/// Textual macro-parameter substitution; reusable (dot) identifiers get a
/// fresh `@N` suffix so each expansion's locals are distinct.
fn substitute_tokens(
    text: &str,
    params: &[String],
    args: &[String],
    counter: u32,
    allow_dotnames: bool,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut quote: Option<char> = None;
    while let Some(c) = rest.chars().next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if c == '"' {
            quote = Some('"');
            out.push(c);
            rest = &rest[1..];
            continue;
        }
        if c == ';' {
            out.push_str(rest);
            break;
        }
        if is_ident_start(c) {
            let end = rest
                .char_indices()
                .find(|&(_, c)| !is_ident_char(c))
                .map(|(i, _)| i)
                .unwrap_or_else(|| rest.len());
            let word = &rest[..end];
            if let Some(pos) = params.iter().position(|p| p == word) {
                out.push_str(&args[pos]);
            } else if word.starts_with('.') && !allow_dotnames {
                out.push_str(word);
                out.push('@');
                out.push_str(&counter.to_string());
            } else {
                out.push_str(word);
            }
            rest = &rest[end..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod text_test {
    use super::*;

    #[test]
    fn split_label_forms() {
        assert_eq!(
            split_label("start: ld a,1", false),
            (Some("start".to_string()), " ld a,1")
        );
        assert_eq!(
            split_label("start ld a,1", false),
            (Some("start".to_string()), " ld a,1")
        );
        assert_eq!(split_label("  ld a,1", false), (None, "  ld a,1"));
        assert_eq!(
            split_label("  inner: ret", false),
            (Some("inner".to_string()), " ret")
        );
        assert_eq!(split_label("org 100h", false), (None, "org 100h"));
        assert_eq!(split_label("start nop", true), (None, "start nop"));
        assert_eq!(
            split_label(".loop: dec a", false),
            (Some(".loop".to_string()), " dec a")
        );
    }

    #[test]
    fn split_list_respects_nesting() {
        assert_eq!(split_list("a, (b, c), \"d,e\""), vec!["a", "(b, c)", "\"d,e\""]);
        assert_eq!(split_list(""), Vec::<String>::new());
        assert_eq!(split_list("x ; comment, ignored"), vec!["x"]);
    }

    #[test]
    fn substitution_replaces_whole_tokens_only() {
        let params = vec!["n".to_string()];
        let args = vec!["5".to_string()];
        assert_eq!(substitute_tokens("ld a, n", &params, &args, 1, false), "ld a, 5");
        assert_eq!(
            substitute_tokens("ld a, nn", &params, &args, 1, false),
            "ld a, nn"
        );
        assert_eq!(
            substitute_tokens("defm \"n\"", &params, &args, 1, false),
            "defm \"n\""
        );
    }

    #[test]
    fn substitution_uniquifies_dot_labels() {
        assert_eq!(
            substitute_tokens(".loop: djnz .loop", &[], &[], 3, false),
            ".loop@3: djnz .loop@3"
        );
    }
}
