//! The ALU and the shifter behind it.
//!
//! The ALU takes the combined 8-bit control slice of the microinstruction
//! (shifter bits above the 6 function-select bits), computes a wrapping
//! 32-bit result and updates the N and Z flags. The shifter is applied after
//! the function; the flags always reflect the pre-shift result.

use super::CpuError;
use super::masks;

/// The ALU with its two flag bits.
#[derive(Debug, Clone)]
pub struct Alu {
    /// Set when the last result was nonzero.
    pub n: bool,
    /// Set when the last result was zero.
    pub z: bool,
}

impl Default for Alu {
    fn default() -> Alu {
        Alu::new()
    }
}

impl Alu {
    /// Create a new ALU. The initial flag state is N=0, Z=1.
    pub fn new() -> Alu {
        Alu { n: false, z: true }
    }

    /// Run one ALU operation.
    ///
    /// `control` is the `SHIFT | FUNC` slice of the microinstruction. The
    /// caller must not pass a control value with FUNC=0 (an inactive ALU
    /// leaves flags and C bus alone); any FUNC outside the decode table is a
    /// microcode error.
    pub fn operation(&mut self, control: u8, a: u32, b: u32) -> Result<u32, CpuError> {
        let result = match control & 0b11_1111 {
            masks::FUNC_A => a,
            masks::FUNC_B => b,
            masks::FUNC_NOT_A => !a,
            masks::FUNC_NOT_B => !b,
            masks::FUNC_ADD => a.wrapping_add(b),
            masks::FUNC_ADD_INC => a.wrapping_add(b).wrapping_add(1),
            masks::FUNC_A_INC => a.wrapping_add(1),
            masks::FUNC_B_INC => b.wrapping_add(1),
            masks::FUNC_B_SUB_A => b.wrapping_sub(a),
            masks::FUNC_B_DEC => b.wrapping_sub(1),
            masks::FUNC_NEG_A => a.wrapping_neg(),
            masks::FUNC_AND => a & b,
            masks::FUNC_OR => a | b,
            masks::FUNC_ZERO => 0,
            masks::FUNC_ONE => 1,
            masks::FUNC_NEG_ONE => !0,
            _ => return Err(CpuError::InvalidAluControl(control)),
        };

        self.n = result != 0;
        self.z = result == 0;

        Ok(match control >> 6 {
            0b01 => result << 1,
            // arithmetic shift, the machine is two's complement throughout
            0b10 => ((result as i32) >> 1) as u32,
            0b11 => result << 8,
            _ => result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Alu;
    use super::super::masks;

    fn run(control: u8, a: u32, b: u32) -> u32 {
        Alu::new().operation(control, a, b).unwrap()
    }

    #[test]
    fn function_table() {
        let (a, b) = (0x0F0F_1234, 0x7777_0003);
        assert_eq!(run(masks::FUNC_A, a, b), a);
        assert_eq!(run(masks::FUNC_B, a, b), b);
        assert_eq!(run(masks::FUNC_NOT_A, a, b), !a);
        assert_eq!(run(masks::FUNC_NOT_B, a, b), !b);
        assert_eq!(run(masks::FUNC_ADD, a, b), a.wrapping_add(b));
        assert_eq!(run(masks::FUNC_ADD_INC, a, b), a.wrapping_add(b) + 1);
        assert_eq!(run(masks::FUNC_A_INC, a, b), a + 1);
        assert_eq!(run(masks::FUNC_B_INC, a, b), b + 1);
        assert_eq!(run(masks::FUNC_B_SUB_A, a, b), b.wrapping_sub(a));
        assert_eq!(run(masks::FUNC_B_DEC, a, b), b - 1);
        assert_eq!(run(masks::FUNC_NEG_A, a, b), a.wrapping_neg());
        assert_eq!(run(masks::FUNC_AND, a, b), a & b);
        assert_eq!(run(masks::FUNC_OR, a, b), a | b);
        assert_eq!(run(masks::FUNC_ZERO, a, b), 0);
        assert_eq!(run(masks::FUNC_ONE, a, b), 1);
        assert_eq!(run(masks::FUNC_NEG_ONE, a, b), 0xFFFF_FFFF);
    }

    #[test]
    fn wrapping_two_complement() {
        assert_eq!(run(masks::FUNC_NEG_A, 1, 0), 0xFFFF_FFFF);
        assert_eq!(run(masks::FUNC_B_DEC, 0, 0), 0xFFFF_FFFF);
        assert_eq!(run(masks::FUNC_B_SUB_A, 5, 3), 0xFFFF_FFFE);
        assert_eq!(run(masks::FUNC_ADD, 0xFFFF_FFFF, 1), 0);
    }

    #[test]
    fn flags_follow_the_result() {
        let mut alu = Alu::new();
        alu.operation(masks::FUNC_ONE, 0, 0).unwrap();
        assert!(alu.n);
        assert!(!alu.z);
        alu.operation(masks::FUNC_ZERO, 0, 0).unwrap();
        assert!(!alu.n);
        assert!(alu.z);
    }

    #[test]
    fn flags_test_the_preshift_result() {
        let mut alu = Alu::new();
        // 1 << 8: result nonzero before and after the shift
        let res = alu.operation(masks::FUNC_ONE | 0b1100_0000, 0, 0).unwrap();
        assert_eq!(res, 256);
        assert!(alu.n);
        // 1 >> 1: shifts to zero, but the flags saw the 1
        let res = alu.operation(masks::FUNC_ONE | 0b1000_0000, 0, 0).unwrap();
        assert_eq!(res, 0);
        assert!(alu.n);
        assert!(!alu.z);
    }

    #[test]
    fn shifter() {
        assert_eq!(run(masks::FUNC_B | 0b0100_0000, 0, 3), 6);
        assert_eq!(run(masks::FUNC_B | 0b1000_0000, 0, 6), 3);
        assert_eq!(run(masks::FUNC_B | 0b1100_0000, 0, 1), 256);
        // the right shift is arithmetic
        assert_eq!(run(masks::FUNC_NEG_ONE | 0b1000_0000, 0, 0), 0xFFFF_FFFF);
    }

    #[test]
    fn invalid_control_is_an_error() {
        assert!(Alu::new().operation(0b10_1010, 1, 2).is_err());
    }

    #[test]
    fn initial_flags() {
        let alu = Alu::new();
        assert!(!alu.n);
        assert!(alu.z);
    }
}
