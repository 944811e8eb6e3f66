//! The firmware: the control store and the macro instruction set layout.
//!
//! Every macro instruction (e.g. `addX`) is a little microprogram. The
//! builder emits those microprograms one after another into the 512-slot
//! control store and publishes the resulting opcode table. An opcode byte is
//! simply the control-store slot of the macro's first microinstruction, which
//! is what makes the dispatch in slot 0 work: it ORs the freshly fetched
//! opcode byte into a NEXT of 0.
//!
//! Conditional branches inside a macro use the upper half of the store: a
//! microinstruction with a Z jam bit falls through to `NEXT` and branches to
//! `NEXT + 256` (the jam ORs `Z << 8` into the next address). The builder
//! therefore keeps all macro bodies in the lower half and reserves the upper
//! half for branch targets.
//!
//! Slot 0 is the fetch/dispatch microinstruction every macro returns to.
//! Slot 255 holds the all-zero word; dispatching opcode 0xFF lands there and
//! ends execution.

use super::masks;

/// Type of a microinstruction word (36 significant bits).
pub type Microinstruction = u64;

/// Number of slots in the control store.
pub const CONTROL_STORE_SIZE: usize = 512;

/// Slot of the fetch/dispatch microinstruction.
pub const MAIN_SLOT: u16 = 0;

/// Slot of the all-zero halt word, and at the same time the halt opcode.
pub const HALT_SLOT: u16 = 255;

/// The opcode byte of the `halt` macro.
pub const HALT_OPCODE: u8 = 0xFF;

/// Number of arguments a macro instruction takes in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Opcode byte only.
    Nullary,
    /// Opcode byte followed by one argument byte.
    Unary,
}

/// A single macro instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode byte, as found in assembled images.
    pub opcode: u8,
    /// The "human readable" mnemonic, e.g. `addX`.
    pub mnemonic: String,
    /// The first microinstruction slot of the macro.
    pub start: u16,
    /// How many argument bytes the macro consumes.
    pub arity: Arity,
    /// True for the move set: unary macros whose label argument is a raw
    /// byte offset (`goto`, `jz*`) rather than a word index.
    pub takes_byte_label: bool,
}

/// The firmware the CPU runs: a filled control store plus the published
/// instruction tables. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Firmware {
    store: Vec<Microinstruction>,
    instructions: Vec<Instruction>,
}

impl Firmware {
    /// Build the stock firmware with the full macro instruction set.
    pub fn stock() -> Firmware {
        Builder::new().build()
    }

    /// Read the microinstruction at the given slot.
    ///
    /// Slots outside the store read as the all-zero (halt) word; the CPU
    /// guards the microprogram counter before fetching.
    pub fn word(&self, slot: u16) -> Microinstruction {
        self.store.get(slot as usize).cloned().unwrap_or(0)
    }

    /// Build a firmware straight from a raw control store, without any
    /// published instructions. Only used to exercise the microengine.
    #[cfg(test)]
    pub fn from_raw(store: Vec<Microinstruction>) -> Firmware {
        Firmware {
            store: store,
            instructions: Vec::new(),
        }
    }

    /// Find the instruction with the given opcode.
    pub fn find_instruction(&self, opcode: u8) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.opcode == opcode)
    }

    /// Find the instruction with the given mnemonic.
    pub fn find_by_mnemonic(&self, mnemonic: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.mnemonic == mnemonic)
    }

    /// All published instructions, in layout order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

/// Cursor-driven control-store builder.
///
/// `begin` opens a macro (the cursor slot becomes its entry and opcode),
/// the `emit` family writes its microinstructions, and `set_taken` places
/// upper-half branch targets. The macro emission order below is frozen:
/// changing it changes every opcode byte and therefore the image format.
#[derive(Debug)]
pub struct Builder {
    store: Vec<Microinstruction>,
    instructions: Vec<Instruction>,
    cursor: u16,
}

impl Builder {
    /// Create a builder with an empty control store.
    pub fn new() -> Builder {
        Builder {
            store: vec![0; CONTROL_STORE_SIZE],
            instructions: Vec::new(),
            cursor: 0,
        }
    }

    /// Lay out the complete macro set and return the finished firmware.
    pub fn build(mut self) -> Firmware {
        self.main_op();

        // goto must come first, the jz* taken paths chain into it
        let goto = self.goto_op();
        self.jz_op("jzX", masks::B_X, goto);
        self.jz_op("jzY", masks::B_Y, goto);
        self.jz_op("jzK", masks::B_K, goto);

        self.load_op("addX", masks::ALU_ADD | masks::A_MDR | masks::B_X | masks::X_WRITE);
        self.load_op("addY", masks::ALU_ADD | masks::A_MDR | masks::B_Y | masks::Y_WRITE);
        self.load_op("subX", masks::ALU_B_SUB_A | masks::A_MDR | masks::B_X | masks::X_WRITE);
        self.load_op("subY", masks::ALU_B_SUB_A | masks::A_MDR | masks::B_Y | masks::Y_WRITE);
        self.simple_op("subXY", masks::ALU_B_SUB_A | masks::A_Y | masks::B_X | masks::X_WRITE);

        self.load_op("setX", masks::ALU_B | masks::B_MDR | masks::X_WRITE);
        self.load_op("setY", masks::ALU_B | masks::B_MDR | masks::Y_WRITE);
        self.store_op("movX", masks::B_X);
        self.store_op("movY", masks::B_Y);

        self.mult_op();
        self.div_op();

        self.simple_op("add1X", masks::ALU_A_INC | masks::A_X | masks::X_WRITE);
        self.simple_op("add1Y", masks::ALU_A_INC | masks::A_Y | masks::Y_WRITE);
        self.simple_op("sub1X", masks::ALU_B_DEC | masks::B_X | masks::X_WRITE);
        self.simple_op("sub1Y", masks::ALU_B_DEC | masks::B_Y | masks::Y_WRITE);
        self.simple_op("set0X", masks::ALU_ZERO | masks::X_WRITE);
        self.simple_op("set1X", masks::ALU_ONE | masks::X_WRITE);
        self.simple_op("mul2X", masks::ALU_A | masks::A_X | masks::SLL1 | masks::X_WRITE);
        self.simple_op("div2X", masks::ALU_A | masks::A_X | masks::SRA1 | masks::X_WRITE);
        self.shift_right_op("div4X", 2);
        self.shift_right_op("div16X", 4);

        self.load_op("andX", masks::ALU_AND | masks::A_MDR | masks::B_X | masks::K_WRITE);
        self.load_op("andY", masks::ALU_AND | masks::A_MDR | masks::B_Y | masks::K_WRITE);
        self.greater_op();

        self.halt_op();

        Firmware {
            store: self.store,
            instructions: self.instructions,
        }
    }

    /// Open a new macro: the slot after the cursor becomes its entry point
    /// and opcode byte.
    fn begin(&mut self, mnemonic: &str, arity: Arity, takes_byte_label: bool) {
        self.cursor += 1;
        assert!(self.cursor < HALT_SLOT, "macro entry ran into the halt slot");
        self.instructions.push(Instruction {
            opcode: self.cursor as u8,
            mnemonic: mnemonic.into(),
            start: self.cursor,
            arity: arity,
            takes_byte_label: takes_byte_label,
        });
    }

    /// Write a microinstruction at the cursor, falling through to the next
    /// slot, and advance.
    fn emit(&mut self, micro: Microinstruction) {
        let next = self.cursor + 1;
        self.emit_to(micro, next);
    }

    /// Write a microinstruction at the cursor with an explicit NEXT address
    /// and advance.
    fn emit_to(&mut self, micro: Microinstruction, next: u16) {
        assert!(self.cursor < HALT_SLOT, "macro body ran into the halt slot");
        self.store[self.cursor as usize] = micro | (next as u64) << masks::NEXT_SHIFT;
        self.cursor += 1;
    }

    /// Write a microinstruction at the cursor that returns to the dispatch
    /// slot, and advance.
    fn emit_end(&mut self, micro: Microinstruction) {
        self.emit_to(micro, MAIN_SLOT);
    }

    /// Place the branch-taken word for a conditional whose fallthrough is
    /// `fallthrough`: the Z jam ORs `1 << 8` into NEXT, so the taken slot is
    /// `fallthrough + 256`.
    fn set_taken(&mut self, fallthrough: u16, micro: Microinstruction, next: u16) {
        assert!(fallthrough < 256, "conditional fallthrough must lie in the lower half");
        self.store[fallthrough as usize + 256] = micro | (next as u64) << masks::NEXT_SHIFT;
    }

    /// Emit the argument fetch shared by all unary macros:
    /// PC <- PC + 1; MBR <- byte[PC].
    fn emit_arg_fetch(&mut self) {
        self.emit(masks::ALU_B_INC | masks::B_PC | masks::PC_WRITE | masks::MEM_FETCH);
    }

    /// The fetch/dispatch microinstruction at slot 0:
    /// PC <- PC + 1; MBR <- byte[PC]; dispatch to MBR.
    fn main_op(&mut self) {
        self.store[MAIN_SLOT as usize] =
            masks::ALU_B_INC | masks::B_PC | masks::PC_WRITE | masks::MEM_FETCH | masks::JAM_MBR;
    }

    /// goto L: PC <- byte[PC + 1].
    ///
    /// The second word does the dispatch itself (PC <- MBR while fetching
    /// the target opcode), so a taken jump never passes through slot 0.
    fn goto_op(&mut self) -> u16 {
        self.begin("goto", Arity::Unary, true);
        let entry = self.cursor;
        self.emit_arg_fetch();
        // PC <- MBR; MBR <- byte[PC]; dispatch to MBR
        self.emit_end(masks::ALU_B | masks::B_MBR | masks::PC_WRITE | masks::MEM_FETCH
                      | masks::JAM_MBR);
        entry
    }

    /// jz<R> L: if R == 0 then PC <- byte[PC + 1] else PC <- PC + 2.
    fn jz_op(&mut self, mnemonic: &str, bport: u64, goto_entry: u16) {
        self.begin(mnemonic, Arity::Unary, true);
        let skip = self.cursor + 1;
        self.emit(masks::ALU_B | bport | masks::JAM_Z);
        // not taken: step over the argument byte
        self.emit_end(masks::ALU_B_INC | masks::B_PC | masks::PC_WRITE);
        // taken: chain into goto, which consumes the argument byte
        self.set_taken(skip, 0, goto_entry);
    }

    /// A unary macro that loads the addressed word and runs one ALU step:
    /// fetch argument; MAR <- MBR; MDR <- word[MAR]; then `word`.
    fn load_op(&mut self, mnemonic: &str, word: Microinstruction) {
        self.begin(mnemonic, Arity::Unary, false);
        self.emit_arg_fetch();
        self.emit(masks::ALU_B | masks::B_MBR | masks::MAR_WRITE | masks::MEM_READ);
        self.emit_end(word);
    }

    /// mov<R> v: word[arg] <- R.
    fn store_op(&mut self, mnemonic: &str, bport: u64) {
        self.begin(mnemonic, Arity::Unary, false);
        self.emit_arg_fetch();
        self.emit(masks::ALU_B | masks::B_MBR | masks::MAR_WRITE);
        // MDR <- R; word[MAR] <- MDR
        self.emit_end(masks::ALU_B | bport | masks::MDR_WRITE | masks::MEM_WRITE);
    }

    /// A nullary macro consisting of a single microinstruction.
    fn simple_op(&mut self, mnemonic: &str, word: Microinstruction) {
        self.begin(mnemonic, Arity::Nullary, false);
        self.emit_end(word);
    }

    /// A chain of `count` arithmetic right shifts of X.
    fn shift_right_op(&mut self, mnemonic: &str, count: u16) {
        self.begin(mnemonic, Arity::Nullary, false);
        let word = masks::ALU_A | masks::A_X | masks::SRA1 | masks::X_WRITE;
        for _ in 1..count {
            self.emit(word);
        }
        self.emit_end(word);
    }

    /// multXY: X <- X * Y by repeated addition. H is the accumulator and Y
    /// counts down to 0.
    fn mult_op(&mut self) {
        self.begin("multXY", Arity::Nullary, false);
        self.emit(masks::ALU_ZERO | masks::H_WRITE);
        let test = self.cursor;
        let body = test + 1;
        // while Y != 0 { H <- H + X; Y <- Y - 1 }
        self.emit(masks::ALU_B | masks::B_Y | masks::JAM_Z);
        self.emit(masks::ALU_ADD | masks::A_H | masks::B_X | masks::H_WRITE);
        self.emit_to(masks::ALU_B_DEC | masks::B_Y | masks::Y_WRITE, test);
        let done = self.cursor;
        self.emit_end(masks::ALU_A | masks::A_H | masks::X_WRITE);
        self.set_taken(body, 0, done);
    }

    /// divXY: X <- X / Y, K <- X mod Y, by repeated subtraction.
    ///
    /// The machine has no magnitude comparator, only the Z flag, so X >= Y
    /// is decided by a counter race: K counts up from 1 and whichever of
    /// Y - K and X - K hits zero first tells which operand is smaller. K
    /// reaching X first means X < Y, which ends the division with the
    /// quotient so far. Y == 0 chains straight into the halt slot.
    fn div_op(&mut self) {
        self.begin("divXY", Arity::Nullary, false);
        let entry = self.cursor;
        let retest = entry + 2;
        let count = entry + 4;
        let subtract = entry + 7;
        let finish = entry + 9;

        self.emit(masks::ALU_ZERO | masks::H_WRITE);
        self.emit(masks::ALU_B | masks::B_Y | masks::JAM_Z);
        self.set_taken(retest, 0, HALT_SLOT);
        // outer loop: X == 0 means the remainder ran out exactly
        self.emit(masks::ALU_B | masks::B_X | masks::JAM_Z);
        self.set_taken(entry + 3, 0, finish);
        self.emit(masks::ALU_ZERO | masks::K_WRITE);
        // counter race
        self.emit(masks::ALU_A_INC | masks::A_K | masks::K_WRITE);
        self.emit(masks::ALU_B_SUB_A | masks::A_K | masks::B_Y | masks::JAM_Z);
        self.set_taken(entry + 6, 0, subtract);
        self.emit_to(masks::ALU_B_SUB_A | masks::A_K | masks::B_X | masks::JAM_Z, count);
        self.set_taken(count, 0, finish);
        // X >= Y: subtract once and go around
        self.emit(masks::ALU_B_SUB_A | masks::A_Y | masks::B_X | masks::X_WRITE);
        self.emit_to(masks::ALU_A_INC | masks::A_H | masks::H_WRITE, retest);
        // K <- X (remainder); X <- H (quotient)
        self.emit(masks::ALU_B | masks::B_X | masks::K_WRITE);
        self.emit_end(masks::ALU_A | masks::A_H | masks::X_WRITE);
    }

    /// isGreaterXY: X <- 1 if X >= Y else 0, by decrementing both until one
    /// hits zero. Y running out first (or together with X) counts as
    /// "greater".
    fn greater_op(&mut self) {
        self.begin("isGreaterXY", Arity::Nullary, false);
        let entry = self.cursor;
        let one = entry + 4;
        let zero = entry + 5;
        self.emit(masks::ALU_B | masks::B_Y | masks::JAM_Z);
        self.set_taken(entry + 1, 0, one);
        self.emit(masks::ALU_B | masks::B_X | masks::JAM_Z);
        self.set_taken(entry + 2, 0, zero);
        self.emit(masks::ALU_B_DEC | masks::B_X | masks::X_WRITE);
        self.emit_to(masks::ALU_B_DEC | masks::B_Y | masks::Y_WRITE, entry);
        self.emit_end(masks::ALU_ONE | masks::X_WRITE);
        self.emit_end(masks::ALU_ZERO | masks::X_WRITE);
    }

    /// halt: opcode 0xFF dispatches to slot 255, which stays all-zero.
    fn halt_op(&mut self) {
        self.instructions.push(Instruction {
            opcode: HALT_OPCODE,
            mnemonic: "halt".into(),
            start: HALT_SLOT,
            arity: Arity::Nullary,
            takes_byte_label: false,
        });
        self.store[HALT_SLOT as usize] = 0;
    }
}
