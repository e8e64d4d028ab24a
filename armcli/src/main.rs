#[macro_use]
extern crate clap;

use armvm::image;
use armvm::interpreter::{Config, Interpreter, StepMode};
use clap::{Arg, ArgGroup};
use std::path::PathBuf;

#[derive(Debug)]
enum Error {
    Assemble(Vec<armasm::Diagnostic>),
    Io(std::io::Error, PathBuf),
    Clap(clap::Error),
    Runtime(armvm::error::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading \"{}\" failed: {}", path.display(), err),
            Error::Clap(err) => write!(f, "{}", err),
            Error::Runtime(err) => write!(f, "{}", err),
            Error::Assemble(diagnostics) => {
                writeln!(f, "assembling input failed:")?;
                for diag in diagnostics {
                    writeln!(f, "  {}", diag)?;
                }
                Ok(())
            }
        }
    }
}

fn main() -> Result<(), Error> {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("PROGRAM")
                .help("Sets the prebuilt image file to run")
                .index(1),
        )
        .arg(
            Arg::with_name("assembly")
                .short("a")
                .long("assembly")
                .takes_value(true)
                .value_name("ASSEMBLY")
                .help("Sets the assembly source file to assemble and run"),
        )
        .arg(
            Arg::with_name("max_steps")
                .short("n")
                .long("max-steps")
                .takes_value(true)
                .value_name("STEPS")
                .default_value("1000000")
                .help("Upper bound on instructions executed before giving up"),
        )
        .group(
            ArgGroup::with_name("input")
                .args(&["PROGRAM", "assembly"])
                .required(true),
        )
        .get_matches();

    let max_steps = value_t!(matches.value_of("max_steps"), u64).map_err(Error::Clap)?;

    let (image, addr_map, assert_info) = match matches.value_of("PROGRAM") {
        Some(program) => {
            let path = PathBuf::from(program);
            let image = image::read_file(&path).map_err(|err| Error::Io(err, path))?;
            (image, image::AddressMap::default(), std::collections::HashMap::new())
        }
        None => {
            let path = PathBuf::from(matches.value_of("assembly").unwrap());
            let source = std::fs::read_to_string(&path).map_err(|err| Error::Io(err, path))?;
            let assembled = armasm::assemble(&source).map_err(Error::Assemble)?;
            (assembled.image, assembled.addr_map, assembled.assert_info)
        }
    };

    let mut interp = Interpreter::with_assertions(image, addr_map, Config::default(), assert_info);

    let mut steps = 0u64;
    let stop = loop {
        if steps >= max_steps {
            break None;
        }
        if let Err(err) = interp.step(Some(StepMode::Into)) {
            return Err(Error::Runtime(err));
        }
        steps += 1;
        if let Some(reason) = interp.current_breakpoint() {
            break Some(reason.clone());
        }
    };

    match stop {
        Some(reason) => println!("Stopped after {} steps: {:?}", steps, reason),
        None => println!("Ran {} steps without stopping (max-steps reached)", steps),
    }
    println!("Registers: {:?}", interp.get_registers());
    println!("Flags: {:?}", interp.get_flags());
    println!("Cycles: {}", interp.cycle_count());

    Ok(())
}
