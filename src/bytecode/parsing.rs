//! Java class file decoding.

use super::opcodes::{self, OperandKind};
use super::{ClassModel, ClassParser, Instruction, MethodModel};
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Default [`ClassParser`]: decodes methods and their `Code` attributes.
///
/// Labels are synthesized in front of every branch/switch target and line
/// markers are taken from `LineNumberTable`; both are emitted as
/// pseudo-instructions with negative opcodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytecodeParser;

impl BytecodeParser {
    pub fn new() -> Self {
        Self
    }
}

impl ClassParser for BytecodeParser {
    fn parse(&self, data: &[u8]) -> Result<ClassModel> {
        let mut reader = Reader::new(data);

        if data.len() < 10 {
            bail!("File too small to be a valid class file");
        }
        if reader.u32()? != CLASS_MAGIC {
            bail!("Invalid class file magic number");
        }
        let _minor = reader.u16()?;
        let major_version = reader.u16()?;

        let pool = ConstantPool::read(&mut reader)?;

        let _access = reader.u16()?;
        let this_class = reader.u16()?;
        let super_class = reader.u16()?;
        let name = pool.class_name(this_class).context("Invalid this_class index")?;
        let super_name = if super_class == 0 {
            None
        } else {
            Some(pool.class_name(super_class).context("Invalid super_class index")?)
        };

        let interface_count = reader.u16()? as usize;
        reader.skip(interface_count * 2).context("Truncated interface table")?;

        let field_count = reader.u16()?;
        for _ in 0..field_count {
            reader.skip(6).context("Truncated field entry")?;
            skip_attributes(&mut reader)?;
        }

        let method_count = reader.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(read_method(&mut reader, &pool)?);
        }

        Ok(ClassModel { name, super_name, major_version, methods })
    }
}

fn skip_attributes(reader: &mut Reader) -> Result<()> {
    let count = reader.u16()?;
    for _ in 0..count {
        let _name = reader.u16()?;
        let length = reader.u32()? as usize;
        reader.skip(length).context("Truncated attribute")?;
    }
    Ok(())
}

fn read_method(reader: &mut Reader, pool: &ConstantPool) -> Result<MethodModel> {
    let access_flags = reader.u16()?;
    let name = pool.utf8(reader.u16()?).context("Invalid method name index")?.to_string();
    let descriptor = pool
        .utf8(reader.u16()?)
        .context("Invalid method descriptor index")?
        .to_string();

    let mut instructions = Vec::new();
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?).unwrap_or_default();
        let length = reader.u32()? as usize;
        let body = reader.bytes(length).context("Truncated method attribute")?;
        if attribute_name == "Code" {
            instructions = read_code(body, pool)
                .with_context(|| format!("Malformed Code attribute in {}{}", name, descriptor))?;
        }
    }

    Ok(MethodModel { name, descriptor, access_flags, instructions })
}

fn read_code(body: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>> {
    let mut reader = Reader::new(body);
    let _max_stack = reader.u16()?;
    let _max_locals = reader.u16()?;
    let code_length = reader.u32()? as usize;
    let code = reader.bytes(code_length).context("Truncated bytecode")?;

    let exception_count = reader.u16()? as usize;
    let mut targets = BTreeSet::new();
    for _ in 0..exception_count {
        let _start = reader.u16()?;
        let _end = reader.u16()?;
        targets.insert(reader.u16()? as usize);
        let _catch = reader.u16()?;
    }

    let mut lines: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(reader.u16()?).unwrap_or_default();
        let length = reader.u32()? as usize;
        let attribute = reader.bytes(length).context("Truncated code attribute")?;
        if attribute_name == "LineNumberTable" {
            let mut table = Reader::new(attribute);
            let entries = table.u16()?;
            for _ in 0..entries {
                let start_pc = table.u16()? as usize;
                let line = table.u16()?;
                lines.entry(start_pc).or_default().push(line);
            }
        }
    }

    let decoded = decode_instructions(code, pool, &mut targets)?;

    let mut instructions = Vec::with_capacity(decoded.len() + targets.len() + lines.len());
    for (pc, instruction) in decoded {
        if targets.contains(&pc) {
            instructions.push(Instruction::label(pc));
        }
        if let Some(numbers) = lines.get(&pc) {
            instructions.extend(numbers.iter().map(|n| Instruction::line(*n)));
        }
        instructions.push(instruction);
    }
    Ok(instructions)
}

fn decode_instructions(
    code: &[u8],
    pool: &ConstantPool,
    targets: &mut BTreeSet<usize>,
) -> Result<Vec<(usize, Instruction)>> {
    let mut reader = Reader::new(code);
    let mut decoded = Vec::new();

    while !reader.is_at_end() {
        let pc = reader.position();
        let mut opcode = reader.u8()?;
        let branch = |offset: i64| -> Result<usize> {
            let target = pc as i64 + offset;
            if target < 0 || target as usize >= code.len() {
                bail!("Branch at {} targets {} outside of code", pc, target);
            }
            Ok(target as usize)
        };

        let operand = match opcodes::operand_kind(opcode) {
            OperandKind::None => None,
            OperandKind::Byte => Some(reader.i8()?.to_string()),
            OperandKind::Short => Some(reader.i16()?.to_string()),
            OperandKind::ConstByte => Some(pool.render(u16::from(reader.u8()?))?),
            OperandKind::ConstShort => Some(pool.render(reader.u16()?)?),
            OperandKind::Local => Some(reader.u8()?.to_string()),
            OperandKind::Increment => {
                let index = reader.u8()?;
                let delta = reader.i8()?;
                Some(format!("{} {}", index, delta))
            }
            OperandKind::Branch => {
                let target = branch(i64::from(reader.i16()?))?;
                targets.insert(target);
                Some(format!("L{}", target))
            }
            OperandKind::BranchWide => {
                let target = branch(i64::from(reader.i32()?))?;
                targets.insert(target);
                Some(format!("L{}", target))
            }
            OperandKind::Interface => {
                let rendered = pool.render(reader.u16()?)?;
                reader.skip(2).context("Truncated invokeinterface")?;
                Some(rendered)
            }
            OperandKind::Dynamic => {
                let rendered = pool.render(reader.u16()?)?;
                reader.skip(2).context("Truncated invokedynamic")?;
                Some(rendered)
            }
            OperandKind::ArrayType => {
                let type_code = reader.u8()?;
                match opcodes::primitive_array_type(type_code) {
                    Some(kind) => Some(kind.to_string()),
                    None => bail!("Invalid newarray type {} at {}", type_code, pc),
                }
            }
            OperandKind::MultiArray => {
                let descriptor = pool.render(reader.u16()?)?;
                let dimensions = reader.u8()?;
                Some(format!("{} {}", descriptor, dimensions))
            }
            OperandKind::TableSwitch => {
                reader.align4()?;
                targets.insert(branch(i64::from(reader.i32()?))?);
                let low = reader.i32()?;
                let high = reader.i32()?;
                if high < low {
                    bail!("Invalid tableswitch bounds at {}", pc);
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                if count.saturating_mul(4) > reader.remaining() {
                    bail!("Truncated tableswitch at {}", pc);
                }
                for _ in 0..count {
                    targets.insert(branch(i64::from(reader.i32()?))?);
                }
                None
            }
            OperandKind::LookupSwitch => {
                reader.align4()?;
                targets.insert(branch(i64::from(reader.i32()?))?);
                let pairs = reader.i32()?;
                if pairs < 0 || (pairs as usize).saturating_mul(8) > reader.remaining() {
                    bail!("Invalid lookupswitch pair count at {}", pc);
                }
                for _ in 0..pairs {
                    let _key = reader.i32()?;
                    targets.insert(branch(i64::from(reader.i32()?))?);
                }
                None
            }
            OperandKind::Wide => {
                opcode = reader.u8()?;
                let index = reader.u16()?;
                match opcodes::operand_kind(opcode) {
                    OperandKind::Local => Some(index.to_string()),
                    OperandKind::Increment => Some(format!("{} {}", index, reader.i16()?)),
                    _ => bail!("Invalid wide opcode 0x{:02x} at {}", opcode, pc),
                }
            }
        };

        if opcodes::name(i16::from(opcode)) == "UNKNOWN" {
            bail!("Unknown opcode 0x{:02x} at {}", opcode, pc);
        }
        decoded.push((pc, Instruction::new(opcode, operand)));
    }

    Ok(decoded)
}

#[derive(Debug, Clone)]
enum Constant {
    Empty,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    /// Fieldref
    Field(u16),
    /// Methodref, InterfaceMethodref, InvokeDynamic and Dynamic: name-and-type index
    Member(u16),
    NameAndType(u16, u16),
    MethodHandle(u16),
    MethodType(u16),
    /// Module and Package entries, never referenced by code
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(reader: &mut Reader) -> Result<Self> {
        let count = reader.u16()? as usize;
        let mut entries = vec![Constant::Empty; count.max(1)];

        let mut i = 1;
        while i < count {
            let tag = reader.u8().context("Truncated constant pool")?;
            entries[i] = match tag {
                1 => {
                    let length = reader.u16()? as usize;
                    let bytes = reader.bytes(length).context("Truncated UTF8 string")?;
                    Constant::Utf8(String::from_utf8_lossy(bytes).to_string())
                }
                3 => Constant::Integer(reader.i32()?),
                4 => Constant::Float(f32::from_bits(reader.u32()?)),
                5 => Constant::Long(reader.i64()?),
                6 => Constant::Double(f64::from_bits(reader.i64()? as u64)),
                7 => Constant::Class(reader.u16()?),
                8 => Constant::String(reader.u16()?),
                9 => {
                    let _owner = reader.u16()?;
                    Constant::Field(reader.u16()?)
                }
                10 | 11 | 17 | 18 => {
                    let _owner_or_bootstrap = reader.u16()?;
                    Constant::Member(reader.u16()?)
                }
                12 => Constant::NameAndType(reader.u16()?, reader.u16()?),
                15 => {
                    let _kind = reader.u8()?;
                    Constant::MethodHandle(reader.u16()?)
                }
                16 => Constant::MethodType(reader.u16()?),
                19 | 20 => {
                    let _name = reader.u16()?;
                    Constant::Other
                }
                _ => bail!("Unknown constant pool tag {} at index {}", tag, i),
            };
            // Long and Double take two slots
            if matches!(tag, 5 | 6) {
                i += 1;
            }
            i += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Empty) | None => bail!("Invalid constant pool index {}", index),
            Some(entry) => Ok(entry),
        }
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            other => bail!("Expected UTF8 at constant {}, found {:?}", index, other),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name) => Ok(self.utf8(*name)?.to_string()),
            other => bail!("Expected class at constant {}, found {:?}", index, other),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType(name, descriptor) => Ok((self.utf8(*name)?, self.utf8(*descriptor)?)),
            other => bail!("Expected name-and-type at constant {}, found {:?}", index, other),
        }
    }

    /// Operand text for a constant referenced from code.
    fn render(&self, index: u16) -> Result<String> {
        Ok(match self.get(index)? {
            Constant::Utf8(s) => s.clone(),
            Constant::Integer(v) => v.to_string(),
            Constant::Float(v) => format!("{:?}", v),
            Constant::Long(v) => v.to_string(),
            Constant::Double(v) => format!("{:?}", v),
            Constant::Class(name) => self.utf8(*name)?.to_string(),
            Constant::String(value) => self.utf8(*value)?.to_string(),
            Constant::Field(nat) => {
                let (name, descriptor) = self.name_and_type(*nat)?;
                format!("{}:{}", name, descriptor)
            }
            Constant::Member(nat) => {
                let (name, descriptor) = self.name_and_type(*nat)?;
                format!("{}{}", name, descriptor)
            }
            Constant::NameAndType(name, descriptor) => {
                format!("{}{}", self.utf8(*name)?, self.utf8(*descriptor)?)
            }
            Constant::MethodHandle(reference) => match self.get(*reference)? {
                Constant::Field(_) | Constant::Member(_) => self.render(*reference)?,
                other => bail!("Method handle {} references {:?}, expected a field or method", index, other),
            },
            Constant::MethodType(descriptor) => self.utf8(*descriptor)?.to_string(),
            Constant::Empty | Constant::Other => bail!("Constant {} cannot be an operand", index),
        })
    }
}

/// Big-endian cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            bail!("Truncated data: wanted {} bytes at offset {}, {} left", len, self.pos, self.remaining());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    /// Skip switch padding so the cursor sits on a 4-byte boundary.
    fn align4(&mut self) -> Result<()> {
        let padding = (4 - self.pos % 4) % 4;
        self.skip(padding)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    fn i64(&mut self) -> Result<i64> {
        let high = u64::from(self.u32()?);
        let low = u64::from(self.u32()?);
        Ok(((high << 32) | low) as i64)
    }
}
