//! Minimal JVM class-file reader: only the structures coverage analysis needs.

use crate::encoding::decode_modified_utf8;

pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

const MAGIC: u32 = 0xCAFE_BABE;

/// Structural problems found while reading a class file.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("not a class file")]
    BadMagic,

    #[error("unexpected end of data at byte {0}")]
    Truncated(usize),

    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownConstantTag { index: u16, tag: u8 },

    #[error("constant pool entry {0} is missing or has the wrong type")]
    BadConstant(u16),

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { offset: u32, opcode: u8 },

    #[error("branch at offset {offset} targets {target}, which is not an instruction")]
    BadBranchTarget { offset: u32, target: i64 },

    #[error("subroutine instruction at offset {0}")]
    Subroutine(u32),
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub major_version: u16,
    pub access: u16,
    /// Internal (slash-separated) name.
    pub name: String,
    pub super_name: Option<String>,
    pub source_file: Option<String>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    /// Absent for abstract and native methods.
    pub code: Option<Code>,
}

#[derive(Debug, Clone, Default)]
pub struct Code {
    pub bytes: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    /// Entries of every `LineNumberTable`, in table order.
    pub line_numbers: Vec<LineNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u32,
    pub line: u16,
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class(u16),
    Other,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(ClassFormatError::Truncated(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, n: usize) -> Result<(), ClassFormatError> {
        self.take(n).map(|_| ())
    }
}

struct ConstantPool(Vec<Constant>);

impl ConstantPool {
    fn read(cur: &mut Cursor<'_>) -> Result<Self, ClassFormatError> {
        let count = cur.u16()?;
        let mut entries = vec![Constant::Other; usize::from(count.max(1))];
        let mut index = 1u16;
        while index < count {
            let tag = cur.u8()?;
            let mut slots = 1;
            entries[usize::from(index)] = match tag {
                1 => {
                    let len = usize::from(cur.u16()?);
                    let bytes = cur.take(len)?;
                    Constant::Utf8(
                        decode_modified_utf8(bytes).ok_or(ClassFormatError::BadConstant(index))?,
                    )
                }
                7 => Constant::Class(cur.u16()?),
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    cur.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    cur.skip(8)?;
                    slots = 2;
                    Constant::Other
                }
                8 | 16 | 19 | 20 => {
                    cur.skip(2)?;
                    Constant::Other
                }
                15 => {
                    cur.skip(3)?;
                    Constant::Other
                }
                tag => return Err(ClassFormatError::UnknownConstantTag { index, tag }),
            };
            index = index.saturating_add(slots);
        }
        Ok(Self(entries))
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.0.get(usize::from(index)) {
            Some(Constant::Utf8(s)) if index != 0 => Ok(s),
            _ => Err(ClassFormatError::BadConstant(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.0.get(usize::from(index)) {
            Some(Constant::Class(name)) if index != 0 => self.utf8(*name),
            _ => Err(ClassFormatError::BadConstant(index)),
        }
    }
}

/// Parse a class file.
pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
    let mut cur = Cursor::new(bytes);
    if cur.u32().map_err(|_| ClassFormatError::BadMagic)? != MAGIC {
        return Err(ClassFormatError::BadMagic);
    }
    let _minor = cur.u16()?;
    let major_version = cur.u16()?;
    let pool = ConstantPool::read(&mut cur)?;

    let access = cur.u16()?;
    let name = pool.class_name(cur.u16()?)?.to_string();
    let super_index = cur.u16()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?.to_string())
    };

    let interfaces = usize::from(cur.u16()?);
    cur.skip(interfaces * 2)?;

    let fields = cur.u16()?;
    for _ in 0..fields {
        cur.skip(6)?;
        skip_attributes(&mut cur)?;
    }

    let method_count = cur.u16()?;
    let mut methods = Vec::with_capacity(usize::from(method_count));
    for _ in 0..method_count {
        methods.push(read_method(&mut cur, &pool)?);
    }

    let mut source_file = None;
    let attributes = cur.u16()?;
    for _ in 0..attributes {
        let attr_name = pool.utf8(cur.u16()?)?;
        let len = cur.u32()? as usize;
        let body = cur.take(len)?;
        if attr_name == "SourceFile" && body.len() >= 2 {
            let index = u16::from_be_bytes([body[0], body[1]]);
            source_file = Some(pool.utf8(index)?.to_string());
        }
    }

    Ok(ClassFile {
        major_version,
        access,
        name,
        super_name,
        source_file,
        methods,
    })
}

fn skip_attributes(cur: &mut Cursor<'_>) -> Result<(), ClassFormatError> {
    let count = cur.u16()?;
    for _ in 0..count {
        cur.skip(2)?;
        let len = cur.u32()? as usize;
        cur.skip(len)?;
    }
    Ok(())
}

fn read_method(cur: &mut Cursor<'_>, pool: &ConstantPool) -> Result<Method, ClassFormatError> {
    let access = cur.u16()?;
    let name = pool.utf8(cur.u16()?)?.to_string();
    let descriptor = pool.utf8(cur.u16()?)?.to_string();
    let mut code = None;
    let attributes = cur.u16()?;
    for _ in 0..attributes {
        let attr_name = pool.utf8(cur.u16()?)?;
        let len = cur.u32()? as usize;
        let body = cur.take(len)?;
        if attr_name == "Code" {
            code = Some(read_code(body, pool)?);
        }
    }
    Ok(Method {
        access,
        name,
        descriptor,
        code,
    })
}

fn read_code(body: &[u8], pool: &ConstantPool) -> Result<Code, ClassFormatError> {
    let mut cur = Cursor::new(body);
    cur.skip(4)?; // max_stack, max_locals
    let code_len = cur.u32()? as usize;
    let bytes = cur.take(code_len)?.to_vec();

    let handlers = cur.u16()?;
    let mut exception_table = Vec::with_capacity(usize::from(handlers));
    for _ in 0..handlers {
        let start = u32::from(cur.u16()?);
        let end = u32::from(cur.u16()?);
        let handler = u32::from(cur.u16()?);
        cur.skip(2)?; // catch type
        exception_table.push(ExceptionEntry { start, end, handler });
    }

    let mut line_numbers = Vec::new();
    let attributes = cur.u16()?;
    for _ in 0..attributes {
        let attr_name = pool.utf8(cur.u16()?)?;
        let len = cur.u32()? as usize;
        let attr = cur.take(len)?;
        if attr_name == "LineNumberTable" {
            let mut table = Cursor::new(attr);
            let entries = table.u16()?;
            for _ in 0..entries {
                let start_pc = u32::from(table.u16()?);
                let line = table.u16()?;
                line_numbers.push(LineNumber { start_pc, line });
            }
        }
    }

    Ok(Code {
        bytes,
        exception_table,
        line_numbers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembled `class p/A extends java/lang/Object` with one `run()V` method.
    fn tiny_class() -> Vec<u8> {
        let mut b = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        let utf8 = |b: &mut Vec<u8>, s: &str| {
            b.push(1);
            b.extend_from_slice(&u16::try_from(s.len()).unwrap().to_be_bytes());
            b.extend_from_slice(s.as_bytes());
        };
        b.extend_from_slice(&9u16.to_be_bytes());
        utf8(&mut b, "p/A"); // 1
        b.extend_from_slice(&[7, 0, 1]); // 2
        utf8(&mut b, "java/lang/Object"); // 3
        b.extend_from_slice(&[7, 0, 3]); // 4
        utf8(&mut b, "run"); // 5
        utf8(&mut b, "()V"); // 6
        utf8(&mut b, "Code"); // 7
        utf8(&mut b, "LineNumberTable"); // 8
        b.extend_from_slice(&[0x00, 0x21, 0, 2, 0, 4, 0, 0, 0, 0]);
        b.extend_from_slice(&[0, 1, 0x00, 0x01, 0, 5, 0, 6, 0, 1]);
        // Code: max_stack, max_locals, len=1, return, no handlers, one attr
        let line_table = [0, 8, 0, 0, 0, 6, 0, 1, 0, 0, 0, 42];
        let mut code = vec![0, 1, 0, 1, 0, 0, 0, 1, 0xb1, 0, 0, 0, 1];
        code.extend_from_slice(&line_table);
        b.extend_from_slice(&[0, 7]);
        b.extend_from_slice(&u32::try_from(code.len()).unwrap().to_be_bytes());
        b.extend_from_slice(&code);
        b.extend_from_slice(&[0, 0]);
        b
    }

    #[test]
    fn parses_names_and_code() {
        let class = parse(&tiny_class()).unwrap();
        assert_eq!(class.name, "p/A");
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.major_version, 52);
        assert_eq!(class.methods.len(), 1);
        let method = &class.methods[0];
        assert_eq!(method.name, "run");
        assert_eq!(method.descriptor, "()V");
        let code = method.code.as_ref().unwrap();
        assert_eq!(code.bytes, vec![0xb1]);
        assert_eq!(
            code.line_numbers,
            vec![LineNumber {
                start_pc: 0,
                line: 42
            }]
        );
    }

    #[test]
    fn rejects_bad_magic() {
        assert_eq!(parse(b"PK\x03\x04").unwrap_err(), ClassFormatError::BadMagic);
        assert_eq!(parse(&[]).unwrap_err(), ClassFormatError::BadMagic);
    }

    #[test]
    fn rejects_truncation() {
        let bytes = tiny_class();
        let err = parse(&bytes[..bytes.len() - 5]).unwrap_err();
        assert!(matches!(err, ClassFormatError::Truncated(_)));
    }
}
