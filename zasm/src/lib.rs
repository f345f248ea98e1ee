//! Multi-pass cross-assembler for the Z80 processor family (Z80,
//! Z180/HD64180 and Intel 8080), producing raw, Intel HEX or Motorola
//! S-Record images through the [romfile](../romfile/index.html) crate and
//! executing embedded test segments on the [z80](../z80/index.html)
//! interpreter.
//!
//! The main entry points are [`assemble`](fn.assemble.html) (in-memory
//! source) and [`assemble_file`](fn.assemble_file.html) (root file plus
//! output writing). Both converge label values over multiple passes: a
//! value carries a [`Validity`](enum.Validity.html) tag, forward references
//! evaluate as not-yet-known instead of failing, and passes repeat until
//! no label changes and everything referenced is final.
//!
//! # Source language
//!
//! Line oriented; comments start with `;`. A word at column 0 (or any word
//! with a trailing `:`) defines a label.
//!
//! ## Directives
//!
//!  Directive | Effect
//! -----------|------------------------------------------------------------
//! `#target NAME` | records the target family for the front end
//! `#cpu z80\|z180\|8080` | selects the instruction set
//! `#include "file"` | splices a file (preprocessor)
//! `#insert "file"` | emits a file's raw bytes
//! `#code NAME[,addr[,size]]` | declares/selects a code segment
//! `#data NAME[,addr[,size]]` | declares/selects a data (reservation) segment
//! `#test NAME[,addr[,cycles]]` | declares a segment run on the interpreter
//! `#if/#elif/#else/#endif` | conditional assembly (32 levels)
//! `#define NAME [expr]` | defines a symbol
//! `#assert expr` | final-pass assertion
//! `#end` | stops assembly of the remaining source
//!
//! ## Pseudo instructions
//!
//!  Pseudo | Effect
//! --------|------------------------------------------------------------
//! `name equ expr` | named constant
//! `org expr` | sets the segment base, or skips forward mid-segment
//! `align expr` | pads to the next multiple
//! `defb/db`, `defw/dw`, `defm/dm` | byte, word and string data
//! `defs/ds count[,fill]` | space reservation
//! `hex 00FF…` | literal hex digit pairs
//! `phase expr` / `dephase` | detached logical addressing
//! `macro NAME a,b … endm` | macro definition (also `NAME macro a,b`)
//! `rept expr … endm` | repeated block
//! `.local` / `.endlocal` | label scope block
//! `.globl name` | marks a label exported/imported
//! `.seed reg, value` | test preamble: register seed
//! `.expect reg, value` / `.expect (addr), bytes…` | test expectations
//!
//! ## Expressions
//!
//! Decimal, `$FF`/`0xFF`/`0FFh` hex, `%1010`/`0b1010` binary, `0o17`
//! octal and `'c'` character literals; `$` is the current logical address
//! and `$$` the current segment base. Built-ins: `lo`, `hi`, `abs`,
//! `min`, `max`, `sin`, `defined`, `required`. Operators follow C
//! precedence unless `flat_operators` selects strict left-to-right
//! evaluation. Reusable labels start with `.` and attach to the last
//! regular label.

mod asm;
mod data;
mod encoder;
mod error;
mod expr;
mod labels;
mod parser;
mod segments;
mod source;
mod testrun;
mod value;


use std::fs;
use std::path::Path;

pub use crate::asm::{assemble, assemble_path, Assembly, FinalSegment, Options};
pub use crate::error::{AsmError, ErrorKind, ErrorList};
pub use crate::value::{Validity, Value};

/// Output encodings for [`assemble_file`]: `'b'` raw binary, `'x'` Intel
/// HEX, `'s'` Motorola S19, `0` for no output file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DestStyle {
    None,
    Binary,
    IntelHex,
    S19,
}

impl DestStyle {
    pub fn from_flag(flag: char) -> Option<DestStyle> {
        match flag {
            'b' => Some(DestStyle::Binary),
            'x' => Some(DestStyle::IntelHex),
            's' => Some(DestStyle::S19),
            '0' => Some(DestStyle::None),
            _ => None,
        }
    }
}

fn io_error(message: String) -> ErrorList {
    let mut list = ErrorList::new(1);
    list.push(AsmError::new(ErrorKind::Io, message));
    list
}

/// Assembles a root source file and writes the image in the requested
/// style. With `compare_to_old`, the freshly written bytes are compared
/// against the file that was there before.
pub fn assemble_file(
    source_path: &Path,
    dest_path: Option<&Path>,
    dest_style: DestStyle,
    opts: Options,
) -> Result<Assembly, ErrorList> {
    let compare_to_old = opts.compare_to_old;
    let assembly = assemble_path(source_path, opts)?;

    if dest_style == DestStyle::None {
        return Ok(assembly);
    }
    let extension = match dest_style {
        DestStyle::Binary => "rom",
        DestStyle::IntelHex => "hex",
        DestStyle::S19 => "s19",
        DestStyle::None => unreachable!(),
    };
    let dest = dest_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source_path.with_extension(extension));

    let old = if compare_to_old && dest.exists() {
        Some(fs::read(&dest).map_err(|e| {
            io_error(format!("reading \"{}\" failed: {}", dest.display(), e))
        })?)
    } else {
        None
    };

    let image = assembly.image();
    let entry = image.base().unwrap_or(0) as u16;
    let result = match dest_style {
        DestStyle::Binary => romfile::write_bin_file(&dest, &image, 0),
        DestStyle::IntelHex => romfile::write_hex_file(&dest, &image),
        DestStyle::S19 => romfile::write_s19_file(&dest, &image, entry),
        DestStyle::None => unreachable!(),
    };
    result.map_err(|e| io_error(format!("writing \"{}\" failed: {}", dest.display(), e)))?;

    if let Some(old) = old {
        let new = fs::read(&dest)
            .map_err(|e| io_error(format!("reading \"{}\" failed: {}", dest.display(), e)))?;
        if let Some(offset) = first_mismatch(&old, &new) {
            return Err(io_error(format!(
                "output differs from previous \"{}\" at offset {} (old {:#04x}, new {:#04x})",
                dest.display(),
                offset,
                old.get(offset).copied().unwrap_or(0),
                new.get(offset).copied().unwrap_or(0),
            )));
        }
    }
    Ok(assembly)
}

fn first_mismatch(old: &[u8], new: &[u8]) -> Option<usize> {
    if old == new {
        return None;
    }
    Some(
        old.iter()
            .zip(new.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| old.len().min(new.len())),
    )
}
