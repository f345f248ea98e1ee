#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::Path;
use util::EnumFromStr;
use z80::CpuKind;
use zasm::{DestStyle, Options};

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the source file to assemble")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the output file to write to"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .takes_value(true)
                .value_name("FORMAT")
                .possible_values(&["b", "x", "s", "0"])
                .default_value("b")
                .help("Output format: b=binary, x=Intel HEX, s=S19, 0=none"),
        )
        .arg(
            Arg::with_name("cpu")
                .long("cpu")
                .takes_value(true)
                .value_name("CPU")
                .possible_values(&["z80", "z180", "8080"])
                .default_value("z80")
                .help("Selects the target processor"),
        )
        .arg(
            Arg::with_name("target")
                .long("target")
                .takes_value(true)
                .value_name("TARGET")
                .help("Default #target when the source names none"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Increases verbosity"),
        )
        .arg(
            Arg::with_name("max-errors")
                .long("max-errors")
                .takes_value(true)
                .value_name("N")
                .help("Stops after N errors (default 30)"),
        )
        .arg(
            Arg::with_name("ixcbr2")
                .long("ixcbr2")
                .help("Enables DDCB/FDCB illegals with a register result"),
        )
        .arg(
            Arg::with_name("ixcbxh")
                .long("ixcbxh")
                .help("Enables the IXH/IXL/IYH/IYL illegals"),
        )
        .arg(
            Arg::with_name("asm8080")
                .long("asm8080")
                .help("Accepts Intel 8080 mnemonics"),
        )
        .arg(
            Arg::with_name("convert8080")
                .long("convert8080")
                .help("Lists 8080 sources with Z80 mnemonics"),
        )
        .arg(
            Arg::with_name("dotnames")
                .long("dotnames")
                .help("Treats dot-prefixed names as ordinary labels"),
        )
        .arg(
            Arg::with_name("reqcolon")
                .long("reqcolon")
                .help("Labels must be terminated with a colon"),
        )
        .arg(
            Arg::with_name("casefold")
                .long("casefold")
                .help("Label names are case-insensitive"),
        )
        .arg(
            Arg::with_name("flatops")
                .long("flatops")
                .help("Evaluates all operators left-to-right without precedence"),
        )
        .arg(
            Arg::with_name("cgi")
                .long("cgi")
                .help("CGI mode: included paths may not leave the source directory"),
        )
        .arg(
            Arg::with_name("compare")
                .long("compare")
                .help("Compares the output against the pre-existing file"),
        )
        .get_matches();

    let mut opts = Options::default();
    opts.verbose = matches.occurrences_of("verbose") as u8;
    opts.ixcbr2_enabled = matches.is_present("ixcbr2");
    opts.ixcbxh_enabled = matches.is_present("ixcbxh");
    opts.syntax_8080 = matches.is_present("asm8080");
    opts.convert_8080 = matches.is_present("convert8080");
    opts.allow_dotnames = matches.is_present("dotnames");
    opts.require_colon = matches.is_present("reqcolon");
    opts.casefold = matches.is_present("casefold");
    opts.flat_operators = matches.is_present("flatops");
    opts.cgi_mode = matches.is_present("cgi");
    opts.compare_to_old = matches.is_present("compare");
    opts.default_target = matches.value_of("target").map(str::to_string);
    if let Some(n) = matches.value_of("max-errors") {
        match n.parse() {
            Ok(n) => opts.max_errors = n,
            Err(_) => {
                eprintln!("invalid --max-errors value \"{}\"", n);
                std::process::exit(1);
            }
        }
    }
    let cpu_name = matches.value_of("cpu").unwrap();
    opts.cpu = match cpu_name {
        "8080" => CpuKind::I8080,
        other => CpuKind::from_str(&other.to_ascii_uppercase()).unwrap_or(CpuKind::Z80),
    };
    if opts.cpu == CpuKind::I8080 {
        opts.syntax_8080 = true;
    }

    let input = Path::new(matches.value_of("INPUT").unwrap());
    let output = matches.value_of("output").map(Path::new);
    let style = DestStyle::from_flag(
        matches
            .value_of("format")
            .unwrap()
            .chars()
            .next()
            .unwrap_or('b'),
    )
    .unwrap_or(DestStyle::Binary);

    match zasm::assemble_file(input, output, style, opts.clone()) {
        Ok(assembly) => {
            if opts.verbose > 0 {
                for seg in &assembly.segments {
                    eprintln!(
                        "segment {}: {} bytes at ${:04X}",
                        seg.name,
                        seg.bytes.len(),
                        seg.address
                    );
                }
            }
        }
        Err(errors) => {
            eprint!("{}", errors);
            std::process::exit(1);
        }
    }
}
