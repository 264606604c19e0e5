use super::*;
use crate::bytecode::Instruction;
use crate::types::{Archetype, SuspicionLevel};
use serde_json::json;

fn cache() -> RegexCache {
    RegexCache::new()
}

fn insn(name: &str, operand: Option<&str>) -> Instruction {
    Instruction::named(name, operand).unwrap()
}

fn matcher(mode: TextMatchMode, text: &str) -> TextMatcher {
    TextMatcher::new(mode, text, &cache())
}

// ==================== Text operators ====================

#[test]
fn test_mode_names_round_trip() {
    for mode in TextMatchMode::ALL {
        assert_eq!(mode.as_str().parse::<TextMatchMode>(), Ok(mode));
    }
    assert_eq!("EQUAL".parse::<TextMatchMode>(), Err("EQUAL".to_string()));
}

#[test]
fn test_plain_operators() {
    let cases = [
        (TextMatchMode::Equals, "exec", "exec", true),
        (TextMatchMode::Equals, "exec", "EXEC", false),
        (TextMatchMode::EqualsIgnoreCase, "exec", "EXEC", true),
        (TextMatchMode::Contains, "Runtime", "java/lang/Runtime", true),
        (TextMatchMode::ContainsIgnoreCase, "runtime", "java/lang/RUNTIME", true),
        (TextMatchMode::StartsWith, "java/", "java/lang/Runtime", true),
        (TextMatchMode::StartsWith, "javax/", "java/lang/Runtime", false),
        (TextMatchMode::StartsWithIgnoreCase, "JAVA/", "java/lang/Runtime", true),
        (TextMatchMode::EndsWith, "Runtime", "java/lang/Runtime", true),
        (TextMatchMode::EndsWithIgnoreCase, "RUNTIME", "java/lang/Runtime", true),
        (TextMatchMode::Anything, "", "whatever", true),
        (TextMatchMode::Nothing, "", "whatever", false),
    ];
    for (mode, reference, candidate, expected) in cases {
        assert_eq!(
            matcher(mode, reference).matches(Some(candidate)),
            expected,
            "{} {:?} vs {:?}",
            mode,
            reference,
            candidate
        );
    }
}

#[test]
fn test_missing_candidate_only_matches_anything() {
    for mode in TextMatchMode::ALL {
        let expected = mode == TextMatchMode::Anything;
        assert_eq!(matcher(mode, "x").matches(None), expected, "{}", mode);
    }
}

#[test]
fn test_regex_full_versus_partial() {
    let full = matcher(TextMatchMode::RegexFullMatch, "exec.*");
    let partial = matcher(TextMatchMode::RegexPartialMatch, "exec");
    assert!(full.matches(Some("exec(Ljava/lang/String;)Ljava/lang/Process;")));
    assert!(!full.matches(Some("doexec()V")));
    assert!(partial.matches(Some("doexec()V")));
    assert!(!partial.matches(Some("run()V")));
}

#[test]
fn test_full_match_alternation_is_anchored_as_a_group() {
    let full = matcher(TextMatchMode::RegexFullMatch, "a|b");
    assert!(full.matches(Some("a")));
    assert!(!full.matches(Some("ab")));
}

#[test]
fn test_invalid_regex_never_matches() {
    let cache = cache();
    let broken = TextMatcher::new(TextMatchMode::RegexPartialMatch, "(unclosed", &cache);
    assert!(!broken.matches(Some("(unclosed")));
    assert!(!broken.matches(Some("")));
    // cached as a failure, not retried
    assert_eq!(cache.len(), 1);

    // anchoring must not repair an unbalanced pattern
    let full = TextMatcher::new(TextMatchMode::RegexFullMatch, "a)|(b", &cache);
    let partial = TextMatcher::new(TextMatchMode::RegexPartialMatch, "a)|(b", &cache);
    assert!(!full.matches(Some("a")));
    assert!(!full.matches(Some("b")));
    assert!(!partial.matches(Some("a")));
}

#[test]
fn test_regex_cache_shares_compilations() {
    let cache = cache();
    let a = TextMatcher::new(TextMatchMode::RegexPartialMatch, "Runtime", &cache);
    let b = TextMatcher::new(TextMatchMode::RegexPartialMatch, "Runtime", &cache);
    let c = TextMatcher::new(TextMatchMode::RegexFullMatch, "Runtime", &cache);
    assert_eq!(cache.len(), 2);
    assert!(a.matches(Some("java/lang/Runtime")));
    assert!(b.matches(Some("java/lang/Runtime")));
    assert!(!c.matches(Some("java/lang/Runtime")));
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_matcher_encoding() {
    let cache = cache();
    let m = TextMatcher::parse("EQUALS getRuntime()Ljava/lang/Runtime;", &cache).unwrap();
    assert_eq!(m.mode(), TextMatchMode::Equals);
    assert_eq!(m.text(), "getRuntime()Ljava/lang/Runtime;");
    assert_eq!(m.encode(), "EQUALS getRuntime()Ljava/lang/Runtime;");

    let spaced = TextMatcher::parse("CONTAINS a b", &cache).unwrap();
    assert_eq!(spaced.text(), "a b");

    let bare = TextMatcher::parse("ANYTHING", &cache).unwrap();
    assert_eq!(bare.text(), "");
    assert_eq!(bare.encode(), "ANYTHING");

    assert!(TextMatcher::parse("SIMILAR foo", &cache).is_err());
}

// ==================== Entries ====================

#[test]
fn test_literal_operand_clause() {
    let cache = cache();
    let with_operand = Entry::literal_with_operand(
        TextMatcher::new(TextMatchMode::Equals, "LDC", &cache),
        TextMatcher::new(TextMatchMode::Contains, "calc", &cache),
    );
    assert!(with_operand.matches(&insn("LDC", Some("calc.exe"))));
    assert!(!with_operand.matches(&insn("LDC", Some("notepad.exe"))));
    assert!(!with_operand.matches(&insn("POP", Some("calc.exe"))));
    // no renderable operand passes the operand clause
    assert!(with_operand.matches(&insn("LDC", None)));

    let opcode_only = Entry::literal(TextMatcher::new(TextMatchMode::Equals, "LDC", &cache));
    assert!(opcode_only.matches(&insn("LDC", Some("anything"))));
}

#[test]
fn test_combinator_semantics() {
    let cache = cache();
    let m1 = Entry::literal(TextMatcher::new(TextMatchMode::Equals, "NOP", &cache));
    let m2 = Entry::literal(TextMatcher::new(TextMatchMode::Equals, "POP", &cache));
    let nop = insn("NOP", None);

    assert!(!Entry::all(vec![m1.clone(), m2.clone()]).matches(&nop));
    assert!(Entry::any(vec![m1.clone(), m2.clone()]).matches(&nop));
    assert!(!Entry::none(vec![m1.clone(), m2.clone()]).matches(&nop));
    assert!(Entry::none(vec![m2]).matches(&nop));
    // empty combinators: ALL vacuously true, ANY false, NONE true
    assert!(Entry::all(vec![]).matches(&nop));
    assert!(!Entry::any(vec![]).matches(&nop));
    assert!(Entry::none(vec![]).matches(&nop));
}

#[test]
fn test_run_bounds() {
    assert!(Entry::run(0).is_none());
    assert_eq!(Entry::run(3), Some(Entry::WildcardRun(RunBound::Count(3.try_into().unwrap()))));
    assert_eq!(RunBound::Unbounded.limit(), usize::MAX);
    assert!(Entry::unbounded_run().is_wildcard());
    assert!(Entry::Wildcard.is_wildcard());
}

// ==================== Codec ====================

fn decode_value(value: serde_json::Value) -> Result<Entry, String> {
    let raw: RawEntry = serde_json::from_value(value).map_err(|e| e.to_string())?;
    codec::decode(&raw, &cache()).map_err(|e| e.to_string())
}

#[test]
fn test_decode_wildcard_tokens() {
    assert_eq!(decode_value(json!("*")), Ok(Entry::Wildcard));
    assert_eq!(decode_value(json!("**")), Ok(Entry::unbounded_run()));
    assert_eq!(decode_value(json!("*12")), Ok(Entry::run(12).unwrap()));
}

#[test]
fn test_decode_rejects_bad_tokens() {
    for token in ["*0", "*-1", "*x", "***", "", "NOP", "*+3"] {
        assert!(decode_value(json!(token)).is_err(), "{:?} should be rejected", token);
    }
}

#[test]
fn test_decode_rejects_bad_shapes() {
    assert!(decode_value(json!({"op": "SIMILAR NOP"})).is_err());
    assert!(decode_value(json!({"op": "EQUALS NOP", "extra": "x"})).is_err());
    assert!(decode_value(json!({"XOR": []})).is_err());
    assert!(decode_value(json!({"ALL": [], "ANY": []})).is_err());
    assert!(decode_value(json!({"ALL": ["*0"]})).is_err());
    assert!(decode_value(json!(42)).is_err());
    assert!(decode_value(json!(null)).is_err());
}

#[test]
fn test_entries_round_trip() {
    let cache = cache();
    let ldc = TextMatcher::new(TextMatchMode::Equals, "LDC", &cache);
    let calc = TextMatcher::new(TextMatchMode::RegexFullMatch, "calc(\\.exe)?", &cache);
    let entries = vec![
        Entry::Wildcard,
        Entry::unbounded_run(),
        Entry::run(7).unwrap(),
        Entry::literal(ldc.clone()),
        Entry::literal_with_operand(ldc.clone(), calc.clone()),
        Entry::literal(TextMatcher::new(TextMatchMode::Anything, "", &cache)),
        Entry::any(vec![
            Entry::literal(ldc.clone()),
            Entry::none(vec![Entry::literal_with_operand(ldc, calc)]),
        ]),
    ];
    for entry in entries {
        let encoded = codec::to_json(&entry);
        let decoded = codec::from_json(&encoded, &cache).unwrap();
        assert_eq!(decoded, entry, "round trip of {}", encoded);
    }
}

#[test]
fn test_absent_operand_is_omitted() {
    let entry = Entry::literal(matcher(TextMatchMode::Equals, "POP"));
    assert_eq!(codec::to_json(&entry), json!({"op": "EQUALS POP"}));

    let with_args = Entry::literal_with_operand(
        matcher(TextMatchMode::Equals, "LDC"),
        matcher(TextMatchMode::StartsWith, "http"),
    );
    assert_eq!(
        codec::to_json(&with_args),
        json!({"op": "EQUALS LDC", "args": "STARTS_WITH http"})
    );
    assert_eq!(
        codec::to_json(&Entry::all(vec![Entry::Wildcard])),
        json!({"ALL": ["*"]})
    );
}

// ==================== Signature documents ====================

const RUNTIME_EXEC_JSON: &str = r#"{
  "archetype": {
    "level": "STRONG",
    "identifier": "runtime-exec",
    "description": "Spawns a hardcoded process"
  },
  "code-patterns": {
    "direct": [
      {"op": "EQUALS INVOKESTATIC", "args": "EQUALS getRuntime()Ljava/lang/Runtime;"},
      {"op": "EQUALS LDC"},
      {"op": "EQUALS INVOKEVIRTUAL", "args": "EQUALS exec(Ljava/lang/String;)Ljava/lang/Process;"}
    ],
    "loose": [
      {"op": "EQUALS INVOKESTATIC", "args": "STARTS_WITH getRuntime"},
      "**",
      {"ANY": [{"op": "EQUALS INVOKEVIRTUAL"}, {"op": "EQUALS INVOKEINTERFACE"}]}
    ]
  },
  "code-behaviors": {
    "spawn": {"process": ["cmd.exe", "/c"]}
  }
}"#;

const RUNTIME_EXEC_YAML: &str = r#"
archetype:
  level: STRONG
  identifier: runtime-exec
  description: Spawns a hardcoded process
code-patterns:
  direct:
    - op: EQUALS INVOKESTATIC
      args: EQUALS getRuntime()Ljava/lang/Runtime;
    - op: EQUALS LDC
    - op: EQUALS INVOKEVIRTUAL
      args: EQUALS exec(Ljava/lang/String;)Ljava/lang/Process;
  loose:
    - op: EQUALS INVOKESTATIC
      args: STARTS_WITH getRuntime
    - "**"
    - ANY:
        - op: EQUALS INVOKEVIRTUAL
        - op: EQUALS INVOKEINTERFACE
code-behaviors:
  spawn:
    process: [cmd.exe, /c]
"#;

#[test]
fn test_parse_json_document() {
    let loader = SignatureLoader::new();
    let sig = loader.parse_json(RUNTIME_EXEC_JSON, "runtime.json").unwrap();
    assert_eq!(sig.archetype().identifier, "runtime-exec");
    assert_eq!(sig.archetype().level, SuspicionLevel::Strong);
    assert_eq!(sig.variants().len(), 2);
    assert_eq!(sig.variant("direct").map(<[Entry]>::len), Some(3));
    assert_eq!(sig.variant("loose").map(|v| v[1].clone()), Some(Entry::unbounded_run()));
    assert_eq!(sig.behaviors()["spawn"], json!({"process": ["cmd.exe", "/c"]}));
}

#[test]
fn test_json_and_yaml_agree() {
    let loader = SignatureLoader::new();
    let from_json = loader.parse_json(RUNTIME_EXEC_JSON, "runtime.json").unwrap();
    let from_yaml = loader.parse_yaml(RUNTIME_EXEC_YAML, "runtime.yml").unwrap();
    assert_eq!(from_json, from_yaml);
}

#[test]
fn test_document_round_trip() {
    let loader = SignatureLoader::new();
    let sig = loader.parse_json(RUNTIME_EXEC_JSON, "runtime.json").unwrap();

    let json_again = loader.parse_json(&sig.to_json().unwrap(), "emitted.json").unwrap();
    assert_eq!(json_again, sig);

    let yaml_again = loader.parse_yaml(&sig.to_yaml().unwrap(), "emitted.yml").unwrap();
    assert_eq!(yaml_again, sig);

    let original: serde_json::Value = serde_json::from_str(RUNTIME_EXEC_JSON).unwrap();
    let emitted: serde_json::Value = serde_json::from_str(&sig.to_json().unwrap()).unwrap();
    assert_eq!(original, emitted);
}

#[test]
fn test_duplicate_variant_names_rejected() {
    let doc = r#"{
      "archetype": {"level": "WEAK", "identifier": "dup", "description": ""},
      "code-patterns": {
        "a": [{"op": "EQUALS NOP"}],
        "a": [{"op": "EQUALS POP"}]
      }
    }"#;
    let err = SignatureLoader::new().parse_json(doc, "dup.json").unwrap_err();
    assert!(err.is_format_error());
    assert!(err.to_string().contains("duplicate variant name 'a'"), "{}", err);
}

#[test]
fn test_unknown_level_rejected() {
    let doc = r#"{"archetype": {"level": "SEVERE", "identifier": "x", "description": ""}}"#;
    let err = SignatureLoader::new().parse_json(doc, "x.json").unwrap_err();
    assert!(err.is_format_error());
}

#[test]
fn test_bad_entry_names_variant() {
    let doc = r#"{
      "archetype": {"level": "WEAK", "identifier": "bad", "description": ""},
      "code-patterns": {"broken": [{"op": "EQUALS NOP"}, "*0"]}
    }"#;
    let err = SignatureLoader::new().parse_json(doc, "bad.json").unwrap_err();
    assert!(matches!(err, crate::HoundError::Format { .. }));
    let message = err.to_string();
    assert!(message.contains("bad.json"), "{}", message);
    assert!(message.contains("variant 'broken'"), "{}", message);
}

#[test]
fn test_missing_patterns_default_to_empty() {
    let doc = r#"{"archetype": {"level": "NOTHING_BURGER", "identifier": "info", "description": "note"}}"#;
    let sig = SignatureLoader::new().parse_json(doc, "info.json").unwrap();
    assert!(sig.variants().is_empty());
    assert!(sig.behaviors().is_empty());
    assert_eq!(sig.archetype().level, SuspicionLevel::NothingBurger);
}

#[test]
fn test_bad_regex_does_not_fail_loading() {
    let doc = r#"{
      "archetype": {"level": "WEAK", "identifier": "regex", "description": ""},
      "code-patterns": {"v": [{"op": "REGEX_FULL_MATCH ([A-Z"}]}
    }"#;
    let loader = SignatureLoader::new();
    let sig = loader.parse_json(doc, "regex.json").unwrap();
    let entry = &sig.variant("v").unwrap()[0];
    assert!(!entry.matches(&insn("NOP", None)));
    assert_eq!(loader.cache().len(), 1);
}

#[test]
fn test_signature_builder() {
    let archetype = Archetype::new(SuspicionLevel::Medium, "built", "Built in code");
    let sig = Signature::new(archetype)
        .with_variant("v", vec![Entry::Wildcard])
        .with_behavior("b", json!(true));
    assert_eq!(sig.variants().len(), 1);
    assert_eq!(sig.behaviors().len(), 1);
    assert!(sig.variant("missing").is_none());
}

#[test]
fn test_document_format_from_path() {
    use std::path::Path;
    assert_eq!(DocumentFormat::from_path(Path::new("a.json")), Some(DocumentFormat::Json));
    assert_eq!(DocumentFormat::from_path(Path::new("a.YAML")), Some(DocumentFormat::Yaml));
    assert_eq!(DocumentFormat::from_path(Path::new("a.yml")), Some(DocumentFormat::Yaml));
    assert_eq!(DocumentFormat::from_path(Path::new("a.txt")), None);
    assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
}
