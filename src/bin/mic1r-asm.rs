//! The assembler front end.
//!
//! Takes a source file in the assembly format described in the
//! [`assembler`](../mic1r/assembler/index.html) module and writes the byte
//! image for [mic1r-sim](../mic1r_sim/index.html). The opcode tables come
//! from the stock firmware, so the output always matches what the simulator
//! executes.
//!
//! # Example
//!
//! ```text
//!     setX a
//!     addX b
//!     movX r
//!     halt
//! a   ww 7
//! b   ww 5
//! r   ww 0
//! ```
//!
//! Assemble and run it like this:
//!
//! ```text
//! mic1r-asm -o program.bin program.s
//! mic1r-sim program.bin
//! ```
extern crate docopt;
extern crate mic1r;
extern crate serde;

use std::fs::File;
use std::io::{BufReader, Write};
use std::process;

use docopt::Docopt;
use serde::Deserialize;

use mic1r::assembler;
use mic1r::firmware::Firmware;

const USAGE: &'static str = "
Mic-1 style assembler.

Usage:
  mic1r-asm [-o <output>] <input>
  mic1r-asm --help

Options:
  -h --help      Show this help.
  -o <output>    Specify the output file [default: out.bin].
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_input: String,
    flag_o: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let firmware = Firmware::stock();

    let input = File::open(&args.arg_input).unwrap_or_else(|e| {
        println!("Can't open {}: {}", args.arg_input, e);
        process::exit(1);
    });

    let image = assembler::assemble(&firmware, BufReader::new(input))
        .unwrap_or_else(|e| {
            println!("Assembler error: {}", e);
            process::exit(1);
        });

    let mut output = File::create(&args.flag_o).unwrap_or_else(|e| {
        println!("Can't write {}: {}", args.flag_o, e);
        process::exit(1);
    });

    output.write_all(&image).unwrap_or_else(|e| {
        println!("Can't write output: {}", e);
        process::exit(1);
    });
}
