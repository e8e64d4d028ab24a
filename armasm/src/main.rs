#[macro_use]
extern crate clap;

use armasm::Diagnostic;
use clap::Arg;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Assemble(Vec<Diagnostic>),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => writeln!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "Reading input",
                    IOErrorContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            Error::Assemble(diagnostics) => {
                writeln!(f, "Assembling input failed:")?;
                for diag in diagnostics {
                    writeln!(f, "  {}", diag)?;
                }
                Ok(())
            }
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input file to use")
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
            Arg::with_name("source_map")
                .short("m")
                .long("source_map")
                .takes_value(true)
                .value_name("SOURCE_MAP")
                .help("Sets the file to write the address<->line map to"),
        )
        .arg(
            Arg::with_name("fill")
                .long("fill")
                .takes_value(true)
                .value_name("BYTE")
                .help("Fill byte used for DSn reservations (default 0)"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let map = matches.value_of("source_map");
    let fill_value: u8 = matches
        .value_of("fill")
        .map(|s| s.parse().expect("--fill expects a byte 0-255"))
        .unwrap_or(0);

    if let Err(err) = run(input, output, map, fill_value) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run(input: &str, output: Option<&str>, map: Option<&str>, fill_value: u8) -> Result<(), Error> {
    let input_path = Path::new(input);

    let input_file = File::open(input_path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;
    let mut source = String::new();
    BufReader::new(input_file)
        .read_to_string(&mut source)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let assembled = armasm::assemble_with_fill(&source, fill_value).map_err(Error::Assemble)?;

    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("img"));
    armvm::image::write_file(&output_path, &assembled.image)
        .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, output_path))?;

    if let Some(map_path_str) = map {
        let map_path = PathBuf::from(map_path_str);
        write_address_map(&assembled.addr_map, &map_path)
            .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, map_path))?;
    }
    Ok(())
}

fn write_address_map(addr_map: &armvm::image::AddressMap, path: &Path) -> std::io::Result<()> {
    let mut out = String::new();
    for (line, addr) in &addr_map.line_to_addr {
        out.push_str(&format!("{} 0x{:08X}\n", line, addr));
    }
    std::fs::write(path, out)
}
