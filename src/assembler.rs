//! The assembler: translates line-oriented source text into a byte image.
//!
//! # Source format
//!
//! One instruction per line. Tokens are separated by spaces and commas, and
//! everything from `#` to the end of the line is a comment. A leading token
//! that is neither a known mnemonic nor a directive defines a label at that
//! line, e.g. `top sub1X`. Blank lines are skipped.
//!
//! Two directives emit literal data: `wb n` emits the single byte `n` and
//! `ww n` emits `n` as a little-endian 32-bit word. These are the only places
//! where numeric literals are allowed; every macro argument is a label name.
//!
//! # Label scaling
//!
//! Labels resolve to byte offsets into the image. The move set (`goto`,
//! `jzX`, `jzY`, `jzK`) encodes the raw byte offset, because those arguments
//! feed the program counter. Every other unary mnemonic addresses a data
//! word, so the argument encodes `byte_offset / 4`, which only lands on the
//! cell the label names if that cell sits at a multiple of 4. The assembler
//! does not align data; pad with `wb 0` where it matters.
//!
//! # Image format
//!
//! The output starts with a single reserved zero byte (the program counter
//! starts at 0 and the dispatch microinstruction advances it before the
//! first fetch), followed by each line's bytes in order.

use std::collections::HashMap;
use std::error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead};

use regex::Regex;

use super::firmware::{Arity, Firmware};
use super::util;

/// How a symbolic reference scales the label's byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    /// Raw byte offset (move set).
    Byte,
    /// Word index, i.e. `byte_offset / 4`.
    Word,
}

/// One provisionally encoded item of a line.
#[derive(Debug, Clone)]
enum Piece {
    /// A finished byte.
    Byte(u8),
    /// A placeholder for a label, resolved in the second pass.
    Reference {
        label: String,
        scale: Scale,
        line: usize,
    },
}

/// Assembler error.
#[derive(Debug)]
pub enum Error {
    /// Unknown mnemonic or malformed line.
    InvalidSyntax(usize),
    /// Numeric literal missing, malformed or out of range.
    InvalidLiteral(usize, String),
    /// Reference to a label that is never defined.
    NoLabel(usize, String),
    /// A label's byte offset does not fit the single argument byte.
    LabelOutOfRange(usize, String),
    /// Underlying IO error.
    IoError(io::Error),
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match *self {
            Error::InvalidSyntax(line) =>
                write!(fmt, "invalid syntax at line {}", line),
            Error::InvalidLiteral(line, ref literal) =>
                write!(fmt, "invalid literal at line {}: {}", line, literal),
            Error::NoLabel(line, ref label) =>
                write!(fmt, "unknown label at line {}: {}", line, label),
            Error::LabelOutOfRange(line, ref label) =>
                write!(fmt, "label out of range at line {}: {}", line, label),
            Error::IoError(ref err) =>
                write!(fmt, "IO error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

/// Return whether the token names an instruction (a published mnemonic or a
/// data directive) rather than a label.
fn is_instruction(fw: &Firmware, token: &str) -> bool {
    token == "wb" || token == "ww" || fw.find_by_mnemonic(token).is_some()
}

fn numeric_arg(arg: Option<&str>, line_no: usize) -> Result<i64, Error> {
    let text = match arg {
        Some(text) => text,
        None => return Err(Error::InvalidSyntax(line_no)),
    };
    util::parse_num(text).ok_or_else(|| Error::InvalidLiteral(line_no, text.into()))
}

/// Encode a single line into its provisional byte pieces.
fn encode_line(fw: &Firmware, mnemonic: &str, arg: Option<&str>, line_no: usize)
               -> Result<Vec<Piece>, Error> {
    match mnemonic {
        "wb" => {
            let value = numeric_arg(arg, line_no)?;
            if value < 0 || value > 0xFF {
                return Err(Error::InvalidLiteral(line_no, arg.unwrap_or("").into()));
            }
            Ok(vec![Piece::Byte(value as u8)])
        }
        "ww" => {
            let value = numeric_arg(arg, line_no)?;
            if value < 0 || value >= 1 << 32 {
                return Err(Error::InvalidLiteral(line_no, arg.unwrap_or("").into()));
            }
            Ok((0..4).map(|i| Piece::Byte((value >> (8 * i)) as u8)).collect())
        }
        _ => {
            let instr = match fw.find_by_mnemonic(mnemonic) {
                Some(instr) => instr,
                None => return Err(Error::InvalidSyntax(line_no)),
            };
            match instr.arity {
                Arity::Nullary => {
                    if arg.is_some() {
                        return Err(Error::InvalidSyntax(line_no));
                    }
                    Ok(vec![Piece::Byte(instr.opcode)])
                }
                Arity::Unary => {
                    let arg = match arg {
                        Some(arg) => arg,
                        None => return Err(Error::InvalidSyntax(line_no)),
                    };
                    // numeric literals are only legal for wb/ww
                    if util::parse_num(arg).is_some() {
                        return Err(Error::InvalidLiteral(line_no, arg.into()));
                    }
                    let scale = if instr.takes_byte_label { Scale::Byte } else { Scale::Word };
                    Ok(vec![
                        Piece::Byte(instr.opcode),
                        Piece::Reference {
                            label: arg.into(),
                            scale: scale,
                            line: line_no,
                        },
                    ])
                }
            }
        }
    }
}

/// Assemble the source from the given reader against the given firmware's
/// opcode tables, returning the byte image.
pub fn assemble<B: BufRead>(fw: &Firmware, input: B) -> Result<Vec<u8>, Error> {
    lazy_static! {
        static ref SEPARATORS: Regex = Regex::new(r"[,\s]+").unwrap();
    }

    // pass 1: tokenize, collect labels, encode provisionally
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut lines: Vec<Vec<Piece>> = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = line_no + 1;
        let code = &line[..line.find('#').unwrap_or(line.len())];
        let tokens: Vec<&str> = SEPARATORS.split(code).filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            continue;
        }
        let (label, rest) = if is_instruction(fw, tokens[0]) {
            (None, &tokens[..])
        } else {
            (Some(tokens[0]), &tokens[1..])
        };
        if rest.is_empty() || rest.len() > 2 {
            return Err(Error::InvalidSyntax(line_no));
        }
        if let Some(label) = label {
            labels.insert(label.into(), lines.len());
        }
        let pieces = encode_line(fw, rest[0], rest.get(1).cloned(), line_no)?;
        lines.push(pieces);
    }

    // pass 2: turn label line indices into byte offsets and resolve
    let mut line_offsets = Vec::with_capacity(lines.len());
    let mut offset: u32 = 1;
    for pieces in &lines {
        line_offsets.push(offset);
        offset += pieces.len() as u32;
    }

    let mut image = vec![0u8];
    for pieces in &lines {
        for piece in pieces {
            match *piece {
                Piece::Byte(byte) => image.push(byte),
                Piece::Reference { ref label, scale, line } => {
                    let target = match labels.get(label) {
                        Some(target) => *target,
                        None => return Err(Error::NoLabel(line, label.clone())),
                    };
                    let byte_offset = line_offsets[target];
                    let value = match scale {
                        Scale::Byte => byte_offset,
                        Scale::Word => byte_offset / 4,
                    };
                    if value > 0xFF {
                        return Err(Error::LabelOutOfRange(line, label.clone()));
                    }
                    image.push(value as u8);
                }
            }
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::{assemble, Error};
    use super::super::firmware::Firmware;

    fn run(source: &str) -> Result<Vec<u8>, Error> {
        let fw = Firmware::stock();
        assemble(&fw, source.as_bytes())
    }

    #[test]
    fn opcodes_match_the_published_table() {
        let fw = Firmware::stock();
        let image = assemble(&fw, &b"set1X\nhalt\n"[..]).unwrap();
        let set1x = fw.find_by_mnemonic("set1X").unwrap().opcode;
        assert_eq!(image, [0x00, set1x, 0xFF]);
    }

    #[test]
    fn immediate_store_image() {
        let image = run("set1X\nmovX out\nhalt\nout ww 0\n").unwrap();
        // out sits at byte offset 5, encoded as word index 1
        assert_eq!(image, [0x00, 55, 28, 1, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn move_set_labels_are_byte_scaled() {
        let image = run("top sub1X\n    jzX end\n    goto top\nend halt\n").unwrap();
        assert_eq!(image, [0x00, 52, 3, 6, 1, 1, 0xFF]);
    }

    #[test]
    fn word_references_divide_by_four() {
        let image = run("setX a\naddX b\nmovX r\nhalt\na ww 7\nb ww 5\nr ww 0\n").unwrap();
        assert_eq!(image,
                   [0x00, 22, 2, 9, 3, 28, 4, 0xFF,
                    7, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn comments_commas_and_blank_lines() {
        let with_noise = run("# header\n\nsetX a,   # load\n  halt\na ww 7\n").unwrap();
        let plain = run("setX a\nhalt\na ww 7\n").unwrap();
        assert_eq!(with_noise, plain);
    }

    #[test]
    fn ww_emits_little_endian() {
        let image = run("ww 4294967295\nww 0x01020304\n").unwrap();
        assert_eq!(image, [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn wb_range_is_checked() {
        assert_eq!(run("wb 255\n").unwrap(), [0x00, 0xFF]);
        assert!(run("wb 256\n").is_err());
        assert!(run("wb -1\n").is_err());
    }

    #[test]
    fn ww_range_is_checked() {
        assert!(run("ww 4294967296\n").is_err());
        assert!(run("ww foo\n").is_err());
    }

    #[test]
    fn unknown_mnemonic_reports_the_line() {
        let err = run("set1X\nfrobnicate\n").unwrap_err();
        assert_eq!(format!("{}", err), "invalid syntax at line 2");
    }

    #[test]
    fn mnemonics_are_case_sensitive() {
        // a lone unknown token cannot be a label either
        assert!(run("SET1X\n").is_err());
    }

    #[test]
    fn undefined_label_is_detected() {
        match run("goto nowhere\n") {
            Err(Error::NoLabel(line, label)) => {
                assert_eq!(line, 1);
                assert_eq!(label, "nowhere");
            }
            other => panic!("expected NoLabel, got {:?}", other),
        }
    }

    #[test]
    fn numeric_macro_arguments_are_rejected() {
        assert!(run("goto 5\n").is_err());
        assert!(run("setX 0x10\n").is_err());
    }

    #[test]
    fn label_without_instruction_is_invalid() {
        let err = run("dangling\n").unwrap_err();
        assert_eq!(format!("{}", err), "invalid syntax at line 1");
    }

    #[test]
    fn forward_and_backward_references_resolve() {
        let image = run("    goto skip\nback halt\nskip goto back\n").unwrap();
        // skip is at byte 4, back at byte 3
        assert_eq!(image, [0x00, 1, 4, 0xFF, 1, 3]);
    }

    #[test]
    fn deterministic_output() {
        let source = "setX a\nmultXY\nmovX r\nhalt\na ww 3\nr ww 0\n";
        assert_eq!(run(source).unwrap(), run(source).unwrap());
    }
}
