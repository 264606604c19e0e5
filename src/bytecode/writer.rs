//! Minimal class file writer for building fixtures.
//!
//! Supports exactly what the matcher cares about: methods with a `Code`
//! attribute, constant references for invocations, field access, type
//! instructions and `LDC`, branches to labels, and line numbers.

use super::opcodes;
use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_STATIC: u16 = 0x0008;
const ACC_SUPER: u16 = 0x0020;
const JAVA_8: u16 = 52;

#[derive(Debug, Clone)]
enum Op {
    Simple(u8),
    Byte(u8, i8),
    Local(u8, u8),
    LdcString(String),
    LdcInt(i32),
    Member { opcode: u8, owner: String, name: String, descriptor: String },
    Type(u8, String),
    Jump(u8, usize),
    Label(usize),
    Line(u16),
}

/// Builder for one method body.
#[derive(Debug, Clone)]
pub struct MethodWriter {
    name: String,
    descriptor: String,
    access: u16,
    ops: Vec<Op>,
    has_code: bool,
}

impl MethodWriter {
    /// Public static method with a code body.
    pub fn new<N: Into<String>, D: Into<String>>(name: N, descriptor: D) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access: ACC_PUBLIC | ACC_STATIC,
            ops: Vec::new(),
            has_code: true,
        }
    }

    /// Method without a `Code` attribute (abstract or native).
    pub fn without_code<N: Into<String>, D: Into<String>>(name: N, descriptor: D) -> Self {
        Self { has_code: false, ..Self::new(name, descriptor) }
    }

    #[must_use]
    pub fn access(mut self, flags: u16) -> Self {
        self.access = flags;
        self
    }

    /// Zero-operand instruction (`NOP`, `POP`, `RETURN`, ...).
    #[must_use]
    pub fn op(mut self, opcode: u8) -> Self {
        self.ops.push(Op::Simple(opcode));
        self
    }

    #[must_use]
    pub fn bipush(mut self, value: i8) -> Self {
        self.ops.push(Op::Byte(opcodes::BIPUSH, value));
        self
    }

    /// Local variable instruction with an explicit index (`ALOAD 1`, `ISTORE 2`, ...).
    #[must_use]
    pub fn local(mut self, opcode: u8, index: u8) -> Self {
        self.ops.push(Op::Local(opcode, index));
        self
    }

    #[must_use]
    pub fn ldc_string<S: Into<String>>(mut self, value: S) -> Self {
        self.ops.push(Op::LdcString(value.into()));
        self
    }

    #[must_use]
    pub fn ldc_int(mut self, value: i32) -> Self {
        self.ops.push(Op::LdcInt(value));
        self
    }

    /// Method invocation (`INVOKEVIRTUAL`, `INVOKESTATIC`, ...) or field access
    /// (`GETSTATIC`, `PUTFIELD`, ...).
    #[must_use]
    pub fn member(mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        self.ops.push(Op::Member {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    /// Class-operand instruction (`NEW`, `CHECKCAST`, `INSTANCEOF`, `ANEWARRAY`).
    #[must_use]
    pub fn type_op(mut self, opcode: u8, class: &str) -> Self {
        self.ops.push(Op::Type(opcode, class.to_string()));
        self
    }

    /// Branch to a label declared with [`MethodWriter::label`].
    #[must_use]
    pub fn jump(mut self, opcode: u8, label: usize) -> Self {
        self.ops.push(Op::Jump(opcode, label));
        self
    }

    #[must_use]
    pub fn label(mut self, label: usize) -> Self {
        self.ops.push(Op::Label(label));
        self
    }

    /// Line number for the next instruction.
    #[must_use]
    pub fn line(mut self, line: u16) -> Self {
        self.ops.push(Op::Line(line));
        self
    }

    fn encode(&self, pool: &mut PoolBuilder) -> Result<Vec<u8>> {
        let name = pool.utf8(&self.name);
        let descriptor = pool.utf8(&self.descriptor);

        let mut out = Vec::new();
        push_u16(&mut out, self.access);
        push_u16(&mut out, name);
        push_u16(&mut out, descriptor);

        if !self.has_code {
            push_u16(&mut out, 0);
            return Ok(out);
        }

        let mut code = Vec::new();
        let mut labels: FxHashMap<usize, usize> = FxHashMap::default();
        let mut patches: Vec<(usize, usize, usize)> = Vec::new();
        let mut lines: Vec<(u16, u16)> = Vec::new();

        for op in &self.ops {
            let pc = code.len();
            match op {
                Op::Simple(opcode) => code.push(*opcode),
                Op::Byte(opcode, value) => code.extend_from_slice(&[*opcode, *value as u8]),
                Op::Local(opcode, index) => code.extend_from_slice(&[*opcode, *index]),
                Op::LdcString(value) => {
                    let index = pool.string(value);
                    push_ldc(&mut code, index);
                }
                Op::LdcInt(value) => {
                    let index = pool.integer(*value);
                    push_ldc(&mut code, index);
                }
                Op::Member { opcode, owner, name, descriptor } => {
                    let tag = match *opcode {
                        opcodes::GETSTATIC..=opcodes::PUTFIELD => 9,
                        opcodes::INVOKEINTERFACE => 11,
                        _ => 10,
                    };
                    let index = pool.member(tag, owner, name, descriptor);
                    code.push(*opcode);
                    push_u16(&mut code, index);
                    if *opcode == opcodes::INVOKEINTERFACE {
                        let slots = argument_slots(descriptor) + 1;
                        code.extend_from_slice(&[slots, 0]);
                    }
                }
                Op::Type(opcode, class) => {
                    let index = pool.class(class);
                    code.push(*opcode);
                    push_u16(&mut code, index);
                }
                Op::Jump(opcode, label) => {
                    code.push(*opcode);
                    patches.push((code.len(), pc, *label));
                    push_u16(&mut code, 0);
                }
                Op::Label(label) => {
                    labels.insert(*label, pc);
                }
                Op::Line(line) => lines.push((pc as u16, *line)),
            }
        }

        for (position, pc, label) in patches {
            let Some(target) = labels.get(&label) else {
                bail!("Jump to undeclared label {} in {}{}", label, self.name, self.descriptor);
            };
            let offset = (*target as i64 - pc as i64) as i16;
            code[position..position + 2].copy_from_slice(&offset.to_be_bytes());
        }

        let mut attribute = Vec::new();
        push_u16(&mut attribute, 16); // max_stack
        push_u16(&mut attribute, 16); // max_locals
        push_u32(&mut attribute, code.len() as u32);
        attribute.extend_from_slice(&code);
        push_u16(&mut attribute, 0); // exception table
        if lines.is_empty() {
            push_u16(&mut attribute, 0);
        } else {
            push_u16(&mut attribute, 1);
            push_u16(&mut attribute, pool.utf8("LineNumberTable"));
            push_u32(&mut attribute, 2 + 4 * lines.len() as u32);
            push_u16(&mut attribute, lines.len() as u16);
            for (pc, line) in lines {
                push_u16(&mut attribute, pc);
                push_u16(&mut attribute, line);
            }
        }

        push_u16(&mut out, 1);
        push_u16(&mut out, pool.utf8("Code"));
        push_u32(&mut out, attribute.len() as u32);
        out.extend_from_slice(&attribute);
        Ok(out)
    }
}

/// Builder for a class file with the given methods.
#[derive(Debug, Clone)]
pub struct ClassWriter {
    name: String,
    super_name: String,
    methods: Vec<MethodWriter>,
}

impl ClassWriter {
    pub fn new<N: Into<String>>(internal_name: N) -> Self {
        Self {
            name: internal_name.into(),
            super_name: "java/lang/Object".to_string(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn super_name<S: Into<String>>(mut self, super_name: S) -> Self {
        self.super_name = super_name.into();
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodWriter) -> Self {
        self.methods.push(method);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut pool = PoolBuilder::default();
        let this_class = pool.class(&self.name);
        let super_class = pool.class(&self.super_name);

        let mut methods = Vec::new();
        for method in &self.methods {
            methods.extend(method.encode(&mut pool)?);
        }

        let mut out = Vec::new();
        push_u32(&mut out, 0xCAFE_BABE);
        push_u16(&mut out, 0);
        push_u16(&mut out, JAVA_8);
        push_u16(&mut out, pool.next_index);
        out.extend_from_slice(&pool.bytes);
        push_u16(&mut out, ACC_PUBLIC | ACC_SUPER);
        push_u16(&mut out, this_class);
        push_u16(&mut out, super_class);
        push_u16(&mut out, 0); // interfaces
        push_u16(&mut out, 0); // fields
        push_u16(&mut out, self.methods.len() as u16);
        out.extend_from_slice(&methods);
        push_u16(&mut out, 0); // class attributes
        Ok(out)
    }
}

struct PoolBuilder {
    bytes: Vec<u8>,
    index: FxHashMap<Vec<u8>, u16>,
    next_index: u16,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self { bytes: Vec::new(), index: FxHashMap::default(), next_index: 1 }
    }
}

impl PoolBuilder {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(existing) = self.index.get(&entry) {
            return *existing;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.bytes.extend_from_slice(&entry);
        self.index.insert(entry, index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        push_u16(&mut entry, value.len() as u16);
        entry.extend_from_slice(value.as_bytes());
        self.add(entry)
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.add(entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        self.indexed(7, name)
    }

    fn string(&mut self, value: &str) -> u16 {
        self.indexed(8, value)
    }

    fn indexed(&mut self, tag: u8, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let mut entry = vec![tag];
        push_u16(&mut entry, utf8);
        self.add(entry)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut nat = vec![12];
        push_u16(&mut nat, name);
        push_u16(&mut nat, descriptor);
        let nat = self.add(nat);

        let mut entry = vec![tag];
        push_u16(&mut entry, class);
        push_u16(&mut entry, nat);
        self.add(entry)
    }
}

fn push_ldc(code: &mut Vec<u8>, index: u16) {
    match u8::try_from(index) {
        Ok(short) => code.extend_from_slice(&[opcodes::LDC, short]),
        Err(_) => {
            code.push(opcodes::LDC_W);
            push_u16(code, index);
        }
    }
}

/// Argument slot count of a method descriptor (long/double take two).
fn argument_slots(descriptor: &str) -> u8 {
    let params = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .unwrap_or_default();
    let mut slots = 0u8;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => slots += 2,
            'L' => {
                for inner in chars.by_ref() {
                    if inner == ';' {
                        break;
                    }
                }
                slots += 1;
            }
            '[' => {
                // array dimensions collapse into a single reference slot
                let mut next = chars.next();
                while next == Some('[') {
                    next = chars.next();
                }
                if next == Some('L') {
                    for inner in chars.by_ref() {
                        if inner == ';' {
                            break;
                        }
                    }
                }
                slots += 1;
            }
            _ => slots += 1,
        }
    }
    slots
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
