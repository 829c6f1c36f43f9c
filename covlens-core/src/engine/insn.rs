//! Bytecode decoding into control-flow shaped instructions.

use super::classfile::ClassFormatError;

/// How control leaves an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to the next instruction.
    Next,
    /// Falls through after calling a method.
    Invoke,
    /// Leaves the method (`*return`, `athrow`).
    Exit,
    /// Conditional jump; falls through otherwise.
    Branch(u32),
    /// Unconditional jump.
    Goto(u32),
    /// `tableswitch` / `lookupswitch`, targets in table order.
    Switch { default: u32, targets: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    pub offset: u32,
    pub flow: Flow,
}

impl Insn {
    /// Every jump target of this instruction.
    pub fn targets(&self) -> Vec<u32> {
        match &self.flow {
            Flow::Branch(t) | Flow::Goto(t) => vec![*t],
            Flow::Switch { default, targets } => {
                std::iter::once(*default).chain(targets.iter().copied()).collect()
            }
            _ => Vec::new(),
        }
    }
}

const GOTO: u8 = 0xa7;
const JSR: u8 = 0xa8;
const RET: u8 = 0xa9;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;
const GOTO_W: u8 = 0xc8;
const JSR_W: u8 = 0xc9;

/// Decode a method body. Jump targets are checked against instruction starts.
pub fn decode(code: &[u8]) -> Result<Vec<Insn>, ClassFormatError> {
    let mut insns = Vec::new();
    let mut pos = 0usize;
    while pos < code.len() {
        let offset = to_offset(pos)?;
        let opcode = code[pos];
        let (len, flow) = match opcode {
            0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xbe | 0xc2 | 0xc3 => {
                (1, Flow::Next)
            }
            0xac..=0xb1 | 0xbf => (1, Flow::Exit),
            0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xbc => (2, Flow::Next),
            0x11 | 0x13 | 0x14 | IINC | 0xb2..=0xb5 | 0xbb | 0xbd | 0xc0 | 0xc1 => {
                (3, Flow::Next)
            }
            0xb6..=0xb8 => (3, Flow::Invoke),
            0xb9 | 0xba => (5, Flow::Invoke),
            0xc5 => (4, Flow::Next),
            0x99..=0xa6 | 0xc6 | 0xc7 => {
                (3, Flow::Branch(relative(code, offset, read_i16(code, pos + 1)?)?))
            }
            GOTO => (3, Flow::Goto(relative(code, offset, read_i16(code, pos + 1)?)?)),
            GOTO_W => (5, Flow::Goto(relative(code, offset, read_i32(code, pos + 1)?)?)),
            JSR | JSR_W | RET => return Err(ClassFormatError::Subroutine(offset)),
            WIDE => match code.get(pos + 1) {
                Some(&IINC) => (6, Flow::Next),
                Some(&RET) => return Err(ClassFormatError::Subroutine(offset)),
                Some(_) => (4, Flow::Next),
                None => return Err(ClassFormatError::Truncated(pos + 1)),
            },
            TABLESWITCH | LOOKUPSWITCH => decode_switch(code, pos, offset, opcode)?,
            opcode => return Err(ClassFormatError::UnknownOpcode { offset, opcode }),
        };
        if pos + len > code.len() {
            return Err(ClassFormatError::Truncated(code.len()));
        }
        insns.push(Insn { offset, flow });
        pos += len;
    }

    let starts: std::collections::HashSet<u32> = insns.iter().map(|i| i.offset).collect();
    for insn in &insns {
        if let Some(bad) = insn.targets().into_iter().find(|t| !starts.contains(t)) {
            return Err(ClassFormatError::BadBranchTarget {
                offset: insn.offset,
                target: i64::from(bad),
            });
        }
    }
    Ok(insns)
}

fn decode_switch(
    code: &[u8],
    pos: usize,
    offset: u32,
    opcode: u8,
) -> Result<(usize, Flow), ClassFormatError> {
    let pad = (4 - (pos + 1) % 4) % 4;
    let base = pos + 1 + pad;
    let default = relative(code, offset, read_i32(code, base)?)?;
    let mut targets = Vec::new();
    let end = if opcode == TABLESWITCH {
        let low = read_i32(code, base + 4)?;
        let high = read_i32(code, base + 8)?;
        let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
            .map_err(|_| ClassFormatError::Truncated(base + 8))?;
        for i in 0..count {
            let at = base + 12 + i * 4;
            targets.push(relative(code, offset, read_i32(code, at)?)?);
        }
        base + 12 + count * 4
    } else {
        let pairs = usize::try_from(read_i32(code, base + 4)?)
            .map_err(|_| ClassFormatError::Truncated(base + 4))?;
        for i in 0..pairs {
            let at = base + 8 + i * 8 + 4;
            targets.push(relative(code, offset, read_i32(code, at)?)?);
        }
        base + 8 + pairs * 8
    };
    Ok((end - pos, Flow::Switch { default, targets }))
}

fn to_offset(pos: usize) -> Result<u32, ClassFormatError> {
    u32::try_from(pos).map_err(|_| ClassFormatError::Truncated(pos))
}

fn read_i16(code: &[u8], at: usize) -> Result<i32, ClassFormatError> {
    match code.get(at..at + 2) {
        Some(b) => Ok(i32::from(i16::from_be_bytes([b[0], b[1]]))),
        None => Err(ClassFormatError::Truncated(at)),
    }
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, ClassFormatError> {
    match code.get(at..at + 4) {
        Some(b) => Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ClassFormatError::Truncated(at)),
    }
}

fn relative(code: &[u8], offset: u32, delta: i32) -> Result<u32, ClassFormatError> {
    let target = i64::from(offset) + i64::from(delta);
    u32::try_from(target)
        .ok()
        .filter(|&t| (t as usize) < code.len())
        .ok_or(ClassFormatError::BadBranchTarget { offset, target })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_code() {
        // iconst_0, istore_1, iinc 1 1, return
        let insns = decode(&[0x03, 0x3c, 0x84, 0x01, 0x01, 0xb1]).unwrap();
        let offsets: Vec<u32> = insns.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 5]);
        assert_eq!(insns[3].flow, Flow::Exit);
    }

    #[test]
    fn conditional_and_goto_targets() {
        // 0 iload_1, 1 ifle +5, 4 iconst_1, 5 ireturn, 6 iconst_0, 7 ireturn
        let insns = decode(&[0x1b, 0x9e, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]).unwrap();
        assert_eq!(insns[1].flow, Flow::Branch(6));

        // 0 goto +3, 3 return
        let insns = decode(&[0xa7, 0x00, 0x03, 0xb1]).unwrap();
        assert_eq!(insns[0].flow, Flow::Goto(3));
    }

    #[test]
    fn invocations_are_marked() {
        // aload_0, invokespecial #1, return
        let insns = decode(&[0x2a, 0xb7, 0x00, 0x01, 0xb1]).unwrap();
        assert_eq!(insns[1].flow, Flow::Invoke);
    }

    #[test]
    fn tableswitch_alignment_and_targets() {
        // 0 iload_1, 1 tableswitch pad(2) default=+27 low=0 high=1 [+23,+25], 24 nop .. 28 return
        let mut code = vec![0x1b, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&27i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&25i32.to_be_bytes());
        code.extend_from_slice(&[0x00, 0xb1, 0x00, 0xb1, 0xb1]);
        let insns = decode(&code).unwrap();
        assert_eq!(insns[1].offset, 1);
        assert_eq!(
            insns[1].flow,
            Flow::Switch {
                default: 28,
                targets: vec![24, 26]
            }
        );
        assert_eq!(insns[2].offset, 24);
    }

    #[test]
    fn wide_iinc_is_six_bytes() {
        let insns = decode(&[0xc4, 0x84, 0x00, 0x01, 0x00, 0x02, 0xb1]).unwrap();
        assert_eq!(insns[1].offset, 6);
    }

    #[test]
    fn subroutines_are_rejected() {
        assert_eq!(
            decode(&[0xa8, 0x00, 0x03, 0xb1]).unwrap_err(),
            ClassFormatError::Subroutine(0)
        );
        assert_eq!(
            decode(&[0x00, 0xa9, 0x01]).unwrap_err(),
            ClassFormatError::Subroutine(1)
        );
    }

    #[test]
    fn rejects_unknown_opcode_and_bad_target() {
        assert!(matches!(
            decode(&[0xca]).unwrap_err(),
            ClassFormatError::UnknownOpcode { opcode: 0xca, .. }
        ));
        // goto into the middle of itself
        assert!(matches!(
            decode(&[0xa7, 0x00, 0x01, 0xb1]).unwrap_err(),
            ClassFormatError::BadBranchTarget { .. }
        ));
    }
}
