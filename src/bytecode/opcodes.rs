//! JVM opcode mnemonics.

/// Mnemonics indexed by opcode value (0x00..=0xC9).
const MNEMONICS: [&str; 202] = [
    "NOP", "ACONST_NULL", "ICONST_M1", "ICONST_0", "ICONST_1", "ICONST_2", "ICONST_3", "ICONST_4",
    "ICONST_5", "LCONST_0", "LCONST_1", "FCONST_0", "FCONST_1", "FCONST_2", "DCONST_0", "DCONST_1",
    "BIPUSH", "SIPUSH", "LDC", "LDC_W", "LDC2_W", "ILOAD", "LLOAD", "FLOAD",
    "DLOAD", "ALOAD", "ILOAD_0", "ILOAD_1", "ILOAD_2", "ILOAD_3", "LLOAD_0", "LLOAD_1",
    "LLOAD_2", "LLOAD_3", "FLOAD_0", "FLOAD_1", "FLOAD_2", "FLOAD_3", "DLOAD_0", "DLOAD_1",
    "DLOAD_2", "DLOAD_3", "ALOAD_0", "ALOAD_1", "ALOAD_2", "ALOAD_3", "IALOAD", "LALOAD",
    "FALOAD", "DALOAD", "AALOAD", "BALOAD", "CALOAD", "SALOAD", "ISTORE", "LSTORE",
    "FSTORE", "DSTORE", "ASTORE", "ISTORE_0", "ISTORE_1", "ISTORE_2", "ISTORE_3", "LSTORE_0",
    "LSTORE_1", "LSTORE_2", "LSTORE_3", "FSTORE_0", "FSTORE_1", "FSTORE_2", "FSTORE_3", "DSTORE_0",
    "DSTORE_1", "DSTORE_2", "DSTORE_3", "ASTORE_0", "ASTORE_1", "ASTORE_2", "ASTORE_3", "IASTORE",
    "LASTORE", "FASTORE", "DASTORE", "AASTORE", "BASTORE", "CASTORE", "SASTORE", "POP",
    "POP2", "DUP", "DUP_X1", "DUP_X2", "DUP2", "DUP2_X1", "DUP2_X2", "SWAP",
    "IADD", "LADD", "FADD", "DADD", "ISUB", "LSUB", "FSUB", "DSUB",
    "IMUL", "LMUL", "FMUL", "DMUL", "IDIV", "LDIV", "FDIV", "DDIV",
    "IREM", "LREM", "FREM", "DREM", "INEG", "LNEG", "FNEG", "DNEG",
    "ISHL", "LSHL", "ISHR", "LSHR", "IUSHR", "LUSHR", "IAND", "LAND",
    "IOR", "LOR", "IXOR", "LXOR", "IINC", "I2L", "I2F", "I2D",
    "L2I", "L2F", "L2D", "F2I", "F2L", "F2D", "D2I", "D2L",
    "D2F", "I2B", "I2C", "I2S", "LCMP", "FCMPL", "FCMPG", "DCMPL",
    "DCMPG", "IFEQ", "IFNE", "IFLT", "IFGE", "IFGT", "IFLE", "IF_ICMPEQ",
    "IF_ICMPNE", "IF_ICMPLT", "IF_ICMPGE", "IF_ICMPGT", "IF_ICMPLE", "IF_ACMPEQ", "IF_ACMPNE", "GOTO",
    "JSR", "RET", "TABLESWITCH", "LOOKUPSWITCH", "IRETURN", "LRETURN", "FRETURN", "DRETURN",
    "ARETURN", "RETURN", "GETSTATIC", "PUTSTATIC", "GETFIELD", "PUTFIELD", "INVOKEVIRTUAL", "INVOKESPECIAL",
    "INVOKESTATIC", "INVOKEINTERFACE", "INVOKEDYNAMIC", "NEW", "NEWARRAY", "ANEWARRAY", "ARRAYLENGTH", "ATHROW",
    "CHECKCAST", "INSTANCEOF", "MONITORENTER", "MONITOREXIT", "WIDE", "MULTIANEWARRAY", "IFNULL", "IFNONNULL",
    "GOTO_W", "JSR_W",
];

/// Pseudo-instruction marking a branch target.
pub const LABEL: i16 = -1;
/// Pseudo-instruction carrying a source line number.
pub const LINE: i16 = -2;

pub const NOP: u8 = 0x00;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const POP: u8 = 0x57;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Mnemonic for an opcode, including the pseudo-instruction sentinels.
pub fn name(opcode: i16) -> &'static str {
    match opcode {
        LABEL => "LABEL",
        LINE => "LINE",
        0..=0xc9 => MNEMONICS[opcode as usize],
        _ => "UNKNOWN",
    }
}

/// Opcode for a mnemonic (case-sensitive, upper case).
pub fn by_name(mnemonic: &str) -> Option<i16> {
    match mnemonic {
        "LABEL" => Some(LABEL),
        "LINE" => Some(LINE),
        _ => MNEMONICS
            .iter()
            .position(|m| *m == mnemonic)
            .map(|idx| idx as i16),
    }
}

/// Operand layout of an opcode, used by the class reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperandKind {
    None,
    /// Signed byte (BIPUSH)
    Byte,
    /// Signed short (SIPUSH)
    Short,
    /// Constant pool index, one byte (LDC)
    ConstByte,
    /// Constant pool index, two bytes
    ConstShort,
    /// Local variable index, one byte (two after WIDE)
    Local,
    /// Local index + signed increment (IINC)
    Increment,
    /// Signed 16-bit branch offset
    Branch,
    /// Signed 32-bit branch offset
    BranchWide,
    /// INVOKEINTERFACE: index, count, zero
    Interface,
    /// INVOKEDYNAMIC: index, two zero bytes
    Dynamic,
    /// NEWARRAY primitive type code
    ArrayType,
    /// MULTIANEWARRAY: index, dimensions
    MultiArray,
    TableSwitch,
    LookupSwitch,
    Wide,
}

pub(crate) fn operand_kind(opcode: u8) -> OperandKind {
    match opcode {
        BIPUSH => OperandKind::Byte,
        SIPUSH => OperandKind::Short,
        LDC => OperandKind::ConstByte,
        LDC_W | LDC2_W => OperandKind::ConstShort,
        0x15..=0x19 | 0x36..=0x3a | RET => OperandKind::Local,
        IINC => OperandKind::Increment,
        0x99..=0xa8 | IFNULL | IFNONNULL => OperandKind::Branch,
        GOTO_W | JSR_W => OperandKind::BranchWide,
        TABLESWITCH => OperandKind::TableSwitch,
        LOOKUPSWITCH => OperandKind::LookupSwitch,
        GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            OperandKind::ConstShort
        }
        INVOKEINTERFACE => OperandKind::Interface,
        INVOKEDYNAMIC => OperandKind::Dynamic,
        NEWARRAY => OperandKind::ArrayType,
        WIDE => OperandKind::Wide,
        MULTIANEWARRAY => OperandKind::MultiArray,
        _ => OperandKind::None,
    }
}

pub(crate) fn primitive_array_type(code: u8) -> Option<&'static str> {
    match code {
        4 => Some("boolean"),
        5 => Some("char"),
        6 => Some("float"),
        7 => Some("double"),
        8 => Some("byte"),
        9 => Some("short"),
        10 => Some("int"),
        11 => Some("long"),
        _ => None,
    }
}
