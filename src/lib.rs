//! Library that contains the structs for emulating a Mic-1 style
//! microprogrammed CPU.
//!
//! The machine executes 36-bit microinstructions from a 512-slot control
//! store against a small register file, an ALU with a shifter, and a
//! byte-addressable memory. The control store is laid out by the firmware
//! builder (see the [`firmware`](firmware/index.html) module), which also
//! publishes the opcode tables the [`assembler`](assembler/index.html) uses
//! to translate source text into runnable byte images.

extern crate regex;
#[macro_use]
extern crate lazy_static;

use std::error;
use std::fmt::{self, Display, Formatter};

pub mod masks;
pub mod util;
pub mod memory;
pub mod registers;
pub mod alu;
pub mod bus;
pub mod firmware;
pub mod assembler;
pub mod logger;

use self::alu::Alu;
use self::bus::Bus;
use self::firmware::{Firmware, CONTROL_STORE_SIZE, MAIN_SLOT};
use self::logger::{Logger, NoLogging};
use self::memory::Memory;
use self::registers::Registers;

/// State of the CPU after a tick completed.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CpuState {
    /// The machine is well and running.
    Running,
    /// The machine fetched the all-zero halt word.
    Halted,
    /// The machine ran into a microcode error.
    Error(CpuError),
}

/// Error that might happen during a tick.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CpuError {
    /// The ALU was enabled with a function outside the decode table. The
    /// offending SHIFT|FUNC control slice is attached.
    InvalidAluControl(u8),
    /// The microprogram counter points outside the control store.
    BadMicroAddress(u16),
}

impl Display for CpuError {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            CpuError::InvalidAluControl(control) =>
                write!(fmt, "invalid ALU control bits {:#04x}", control),
            CpuError::BadMicroAddress(mpc) =>
                write!(fmt, "microprogram counter {:#05x} outside the control store", mpc),
        }
    }
}

impl error::Error for CpuError {}

/// The CPU: register file, ALU, bus latches, memory and firmware.
///
/// The firmware is built once at construction and read-only afterwards; the
/// memory is mutable throughout execution. The host drives the machine with
/// [`step`](#method.step) or [`execute`](#method.execute) and may inspect
/// every component in between.
#[derive(Debug, Clone)]
pub struct Cpu {
    /// The main memory, preloaded with a program image.
    pub memory: Memory,
    /// The control store and the published instruction tables.
    pub firmware: Firmware,
    /// The register file.
    pub registers: Registers,
    /// The ALU with its N/Z flags.
    pub alu: Alu,
    /// The number of completed ticks.
    pub cycle_count: u64,
    bus: Bus,
}

impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

impl Cpu {
    /// Create a new CPU with the stock firmware and empty memory.
    pub fn new() -> Cpu {
        Cpu::with_firmware(Firmware::stock())
    }

    /// Create a new CPU running the given firmware.
    pub fn with_firmware(firmware: Firmware) -> Cpu {
        Cpu {
            memory: Memory::new(),
            firmware: firmware,
            registers: Registers::new(),
            alu: Alu::new(),
            cycle_count: 0,
            bus: Bus::new(),
        }
    }

    /// Copy a program image into memory, starting at address 0.
    pub fn load_image(&mut self, image: &[u8]) {
        self.memory.load_image(image);
    }

    /// Advance the machine by one tick.
    pub fn step(&mut self) -> CpuState {
        self.step_with(&NoLogging)
    }

    /// Advance the machine by one tick, reporting to the given logger.
    ///
    /// A tick fetches the microinstruction at MPC, reads the A and B ports,
    /// runs the ALU if its function bits are nonzero, writes the register
    /// selected by the write mask from the C bus, performs at most one
    /// memory port action, and finally computes the next MPC from NEXT and
    /// the jam bits. Reads observe pre-tick register state; the memory port
    /// observes registers written this tick (a fetch issued together with a
    /// PC write reads from the new PC).
    pub fn step_with(&mut self, logger: &dyn Logger) -> CpuState {
        let mpc = self.registers.mpc;
        if mpc as usize >= CONTROL_STORE_SIZE {
            return CpuState::Error(CpuError::BadMicroAddress(mpc));
        }
        let mir = self.firmware.word(mpc);
        self.registers.mir = mir;
        if mir == 0 {
            logger.log_halt(self);
            return CpuState::Halted;
        }

        let next = ((mir & masks::NEXT) >> masks::NEXT_SHIFT) as u16;
        let alu_control = ((mir & masks::ALU_CONTROL) >> masks::FUNC_SHIFT) as u8;
        let wmask = ((mir & masks::WMASK) >> masks::WMASK_SHIFT) as u32;
        let bport = ((mir & masks::BPORT) >> masks::BPORT_SHIFT) as u32;
        let aport = (mir & masks::APORT) as u32;

        self.bus.a = self.registers.read_port(aport);
        self.bus.b = self.registers.read_port(bport);

        if alu_control & 0b11_1111 != 0 {
            match self.alu.operation(alu_control, self.bus.a, self.bus.b) {
                Ok(result) => self.bus.c = result,
                Err(err) => return CpuState::Error(err),
            }
        }

        self.registers.write_masked(wmask, self.bus.c);

        // MAR holds a word index; the byte-addressed memory sees it times 4.
        if mir & masks::MEM_FETCH != 0 {
            self.registers.mbr = self.memory.read_byte(self.registers.pc);
        } else if mir & masks::MEM_READ != 0 {
            self.registers.mdr = self.memory.read_word(self.registers.mar.wrapping_mul(4));
        } else if mir & masks::MEM_WRITE != 0 {
            self.memory.write_word(self.registers.mar.wrapping_mul(4), self.registers.mdr);
        }

        let mut target = next;
        if mir & masks::JAM_Z != 0 && self.alu.z {
            target |= 1 << 8;
        }
        if mir & masks::JAM_N != 0 && self.alu.n {
            target |= 1 << 8;
        }
        if mir & masks::JAM_MBR != 0 {
            target |= self.registers.mbr as u16;
        }
        self.registers.mpc = target;

        self.cycle_count += 1;
        logger.log_tick(self, mpc, mir);
        if mpc == MAIN_SLOT {
            if let Some(instruction) = self.firmware.find_instruction(self.registers.mbr) {
                logger.log_dispatch(self, self.registers.pc, instruction);
            }
        }
        CpuState::Running
    }

    /// Tick until the machine halts or errors. Returns the final state; the
    /// total tick count is available as `cycle_count`.
    pub fn execute(&mut self) -> CpuState {
        self.execute_with(&NoLogging, None)
    }

    /// Tick until the machine halts, errors, or `cycle_count` reaches the
    /// given limit (in which case `Running` is returned). Programs are not
    /// guaranteed to terminate, so tests should pass a limit.
    pub fn execute_with(&mut self, logger: &dyn Logger, limit: Option<u64>) -> CpuState {
        loop {
            if let Some(limit) = limit {
                if self.cycle_count >= limit {
                    return CpuState::Running;
                }
            }
            let state = self.step_with(logger);
            if state != CpuState::Running {
                return state;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cpu, CpuError, CpuState};
    use super::firmware::{Firmware, HALT_SLOT};
    use super::masks;

    #[test]
    fn fetch_dispatch_invariant() {
        let mut cpu = Cpu::new();
        let opcode = cpu.firmware.find_by_mnemonic("setX").unwrap().opcode;
        cpu.memory.write_byte(1, opcode);
        assert_eq!(cpu.step(), CpuState::Running);
        assert_eq!(cpu.registers.pc, 1);
        assert_eq!(cpu.registers.mbr, opcode);
        assert_eq!(cpu.registers.mpc, opcode as u16);
        assert_eq!(cpu.cycle_count, 1);
    }

    #[test]
    fn halt_byte_stops_the_machine() {
        let mut cpu = Cpu::new();
        cpu.load_image(&[0x00, 0xFF]);
        assert_eq!(cpu.step(), CpuState::Running);
        assert_eq!(cpu.registers.mpc, HALT_SLOT);
        assert_eq!(cpu.step(), CpuState::Halted);
        // the halting tick is not counted
        assert_eq!(cpu.cycle_count, 1);
    }

    #[test]
    fn empty_memory_keeps_dispatching_to_main() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.step(), CpuState::Running);
        assert_eq!(cpu.registers.mpc, 0);
        assert_eq!(cpu.registers.pc, 1);
    }

    #[test]
    fn bad_micro_address_is_an_error() {
        let mut cpu = Cpu::new();
        cpu.registers.mpc = 600;
        assert_eq!(cpu.step(), CpuState::Error(CpuError::BadMicroAddress(600)));
    }

    #[test]
    fn invalid_alu_control_is_an_error() {
        // a single word enabling the ALU with an undecodable function
        let mut store = vec![0u64; 512];
        store[0] = (0b10_1010 << masks::FUNC_SHIFT) | masks::X_WRITE;
        let mut cpu = Cpu::with_firmware(Firmware::from_raw(store));
        match cpu.step() {
            CpuState::Error(CpuError::InvalidAluControl(_)) => (),
            other => panic!("expected an ALU error, got {:?}", other),
        }
    }

    #[test]
    fn execute_honors_the_tick_limit() {
        let mut cpu = Cpu::new();
        // top goto top
        cpu.load_image(&[0x00, 1, 1]);
        let state = cpu.execute_with(&super::NoLogging, Some(50));
        assert_eq!(state, CpuState::Running);
        assert_eq!(cpu.cycle_count, 50);
    }

    #[test]
    fn inactive_alu_leaves_flags_and_c_bus_alone() {
        let mut store = vec![0u64; 512];
        // only a jam and a next address, no ALU function
        store[0] = (7 << masks::NEXT_SHIFT) | masks::JAM_Z;
        let mut cpu = Cpu::with_firmware(Firmware::from_raw(store));
        assert_eq!(cpu.step(), CpuState::Running);
        // initial Z=1 is still in effect, so the jam takes the branch
        assert_eq!(cpu.registers.mpc, 7 | 0x100);
    }
}
