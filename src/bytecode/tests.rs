//! Tests for the bytecode model, reader and writer.

use super::opcodes::{self, *};
use super::*;

fn operands(method: &MethodModel) -> Vec<String> {
    method.instructions.iter().map(|i| i.to_string()).collect()
}

#[test]
fn test_opcode_names() {
    assert_eq!(opcodes::name(i16::from(NOP)), "NOP");
    assert_eq!(opcodes::name(i16::from(INVOKESTATIC)), "INVOKESTATIC");
    assert_eq!(opcodes::name(i16::from(JSR_W)), "JSR_W");
    assert_eq!(opcodes::name(LABEL), "LABEL");
    assert_eq!(opcodes::name(LINE), "LINE");
    assert_eq!(opcodes::name(0xfe), "UNKNOWN");

    assert_eq!(opcodes::by_name("POP"), Some(i16::from(POP)));
    assert_eq!(opcodes::by_name("LINE"), Some(LINE));
    assert_eq!(opcodes::by_name("pop"), None);
}

#[test]
fn test_instruction_helpers() {
    let invoke = Instruction::named("INVOKESTATIC", Some("getRuntime()Ljava/lang/Runtime;")).unwrap();
    assert_eq!(invoke.opcode_name(), "INVOKESTATIC");
    assert!(!invoke.is_pseudo());
    assert_eq!(invoke.to_string(), "INVOKESTATIC getRuntime()Ljava/lang/Runtime;");

    assert!(Instruction::label(4).is_pseudo());
    assert!(Instruction::line(12).is_pseudo());
    assert_eq!(Instruction::named("NOP", None).unwrap().to_string(), "NOP");
    assert!(Instruction::named("FROB", None).is_none());
}

#[test]
fn test_written_class_parses_back() {
    let bytes = ClassWriter::new("com/example/Payload")
        .method(
            MethodWriter::new("run", "()V")
                .line(10)
                .member(INVOKESTATIC, "java/lang/Runtime", "getRuntime", "()Ljava/lang/Runtime;")
                .ldc_string("calc.exe")
                .member(
                    INVOKEVIRTUAL,
                    "java/lang/Runtime",
                    "exec",
                    "(Ljava/lang/String;)Ljava/lang/Process;",
                )
                .op(POP)
                .op(RETURN),
        )
        .method(MethodWriter::without_code("hook", "()V"))
        .to_bytes()
        .unwrap();

    let class = BytecodeParser::new().parse(&bytes).unwrap();
    assert_eq!(class.name, "com/example/Payload");
    assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(class.major_version, 52);
    assert_eq!(class.methods.len(), 2);

    let run = &class.methods[0];
    assert_eq!(run.name, "run");
    assert_eq!(run.descriptor, "()V");
    assert_eq!(
        operands(run),
        vec![
            "LINE 10",
            "INVOKESTATIC getRuntime()Ljava/lang/Runtime;",
            "LDC calc.exe",
            "INVOKEVIRTUAL exec(Ljava/lang/String;)Ljava/lang/Process;",
            "POP",
            "RETURN",
        ]
    );

    assert!(class.methods[1].instructions.is_empty());
}

#[test]
fn test_operand_rendering() {
    let bytes = ClassWriter::new("Ops")
        .method(
            MethodWriter::new("ops", "()V")
                .member(GETSTATIC, "java/lang/System", "out", "Ljava/io/PrintStream;")
                .type_op(NEW, "java/lang/StringBuilder")
                .bipush(-3)
                .ldc_int(70000)
                .local(ALOAD, 1)
                .member(
                    INVOKEINTERFACE,
                    "java/util/List",
                    "add",
                    "(Ljava/lang/Object;)Z",
                )
                .op(RETURN),
        )
        .to_bytes()
        .unwrap();

    let class = BytecodeParser::new().parse(&bytes).unwrap();
    assert_eq!(
        operands(&class.methods[0]),
        vec![
            "GETSTATIC out:Ljava/io/PrintStream;",
            "NEW java/lang/StringBuilder",
            "BIPUSH -3",
            "LDC 70000",
            "ALOAD 1",
            "INVOKEINTERFACE add(Ljava/lang/Object;)Z",
            "RETURN",
        ]
    );
}

#[test]
fn test_branch_targets_become_labels() {
    let bytes = ClassWriter::new("Loop")
        .method(
            MethodWriter::new("spin", "()V")
                .label(0)
                .op(NOP)
                .jump(GOTO, 0),
        )
        .to_bytes()
        .unwrap();

    let class = BytecodeParser::new().parse(&bytes).unwrap();
    let method = &class.methods[0];
    assert_eq!(operands(method), vec!["LABEL L0", "NOP", "GOTO L0"]);
    assert!(method.instructions[0].is_pseudo());
}

#[test]
fn test_rejects_bad_magic() {
    let err = BytecodeParser::new().parse(b"NOTACLASSFILE").unwrap_err();
    assert!(err.to_string().contains("magic"));
}

#[test]
fn test_rejects_truncated_class() {
    let bytes = ClassWriter::new("Cut")
        .method(MethodWriter::new("m", "()V").op(RETURN))
        .to_bytes()
        .unwrap();

    let truncated = &bytes[..bytes.len() - 6];
    assert!(BytecodeParser::new().parse(truncated).is_err());
    assert!(BytecodeParser::new().parse(&bytes[..8]).is_err());
}

#[test]
fn test_writer_rejects_undeclared_label() {
    let result = ClassWriter::new("Bad")
        .method(MethodWriter::new("m", "()V").jump(GOTO, 7).op(RETURN))
        .to_bytes();
    assert!(result.is_err());
}
