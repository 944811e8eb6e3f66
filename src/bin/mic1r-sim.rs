//! The simulator front end.
//!
//! Loads a byte image (assembled with [mic1r-asm](../mic1r_asm/index.html)),
//! runs it on the stock firmware and prints the register file afterwards.
//! Execution starts at the beginning of the image and ends when the program
//! dispatches the halt byte (0xFF), when the machine errors, or when the
//! optional tick limit is reached (programs are free to loop forever).
//!
//! # Presets
//!
//! Memory words and registers can be set before the run. Use `-m
//! index=value` to set the memory word with the given index (as seen by the
//! data macros, i.e. in units of 4 bytes) and `-r name=value` to set a
//! register, e.g. `-r X=5`. Both can be given multiple times.
//!
//! # Example usage
//!
//! ```bash
//! # plain run
//! mic1r-sim program.bin
//! # bound the run to 10000 ticks
//! mic1r-sim -t 10000 program.bin
//! # pass an input value in register X
//! mic1r-sim -r X=5 program.bin
//! ```
extern crate docopt;
extern crate mic1r;
extern crate serde;

use std::fs::File;
use std::io::Read;
use std::process;

use docopt::Docopt;
use serde::Deserialize;

use mic1r::{Cpu, CpuState};
use mic1r::firmware::Instruction;
use mic1r::logger::{Logger, NoLogging};
use mic1r::registers::Register;
use mic1r::util;

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log_dispatch(&self, cpu: &Cpu, pc: u32, instruction: &Instruction) {
        println!("{:>6} [{:#06x}] ({:#04x}) {}",
                 cpu.cycle_count, pc, instruction.opcode, instruction.mnemonic);
    }
}

const USAGE: &'static str = "
Mic-1 style simulator.

Usage:
  mic1r-sim [-t <ticks>] [-q] [-m <memstr>]... [-r <regstr>]... <image>
  mic1r-sim -h | --help

Options:
  image                      Program image to execute (see mic1r-asm).
  -t <ticks>, --ticks <ticks>  Stop after this many ticks.
  -m <memstr>                Set a memory word. memstr should look like
                             index=value, where index is a word index (4
                             bytes per word). Can be given multiple times.
  -r <regstr>                Set a register, e.g. X=5. Can be given
                             multiple times.
  -q --quiet                 Do not log dispatched instructions.
  -h --help                  Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_image: String,
    flag_ticks: Option<u64>,
    flag_m: Vec<String>,
    flag_r: Vec<String>,
    flag_quiet: bool,
}

/// Split a `target=value` preset into its two halves.
fn split_preset(preset: &str) -> (&str, &str) {
    let mut parts = preset.splitn(2, '=');
    let target = parts.next().unwrap_or("");
    let value = parts.next().unwrap_or_else(|| {
        println!("Expected target=value, got {}", preset);
        process::exit(1);
    });
    (target.trim(), value.trim())
}

fn parse_value(text: &str, preset: &str) -> u32 {
    util::parse_num(text)
        .map(|v| v as u32)
        .unwrap_or_else(|| {
            println!("Malformed value in {}", preset);
            process::exit(1);
        })
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let mut image = Vec::new();
    File::open(&args.arg_image)
        .and_then(|mut f| f.read_to_end(&mut image))
        .unwrap_or_else(|e| {
            println!("Can't open {}: {}", args.arg_image, e);
            process::exit(1);
        });

    let mut cpu = Cpu::new();
    cpu.load_image(&image);

    for preset in &args.flag_m {
        let (index, value) = split_preset(preset);
        let index = util::parse_num(index).unwrap_or_else(|| {
            println!("Malformed word index in {}", preset);
            process::exit(1);
        }) as u32;
        let value = parse_value(value, preset);
        cpu.memory.write_word(index.wrapping_mul(4), value);
    }

    for preset in &args.flag_r {
        let (name, value) = split_preset(preset);
        let register: Register = name.parse().unwrap_or_else(|_| {
            println!("Unknown register {}", name);
            process::exit(1);
        });
        let value = parse_value(value, preset);
        cpu.registers.set(register, value);
    }

    let logger: &dyn Logger = if args.flag_quiet { &NoLogging } else { &ConsoleLogger };
    let state = cpu.execute_with(logger, args.flag_ticks);

    match state {
        CpuState::Halted => println!("Halted after {} ticks", cpu.cycle_count),
        CpuState::Running => println!("Tick limit reached after {} ticks", cpu.cycle_count),
        CpuState::Error(err) => println!("Machine error after {} ticks: {}",
                                         cpu.cycle_count, err),
    }
    println!("{}", cpu.registers);

    if let CpuState::Error(_) = state {
        process::exit(1);
    }
}
