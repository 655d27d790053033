mod common;

use common::{analyze, analyze_ok, analyze_with, field, src, HostTypes};
use verigen::analysis::{self, Config};
use verigen::diagnostics::ErrorKind;
use verigen::model::{Span, TypeKind};
use verigen::rules::{FuncIdent, ParamKind, Registry};

#[test]
fn empty_validator_is_rejected() {
    let mut ht = HostTypes::new();
    let target = ht.validator("EmptyValidator", vec![]);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyValidator);
}

#[test]
fn unknown_rules_are_rejected() {
    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"sparkly""#, ht.string);
    let target = ht.validator("UserValidator", vec![f1]);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::RuleUnknown {
            rule: "sparkly".into()
        }
    );
    assert_eq!(err.validator, "UserValidator");
    assert_eq!(err.field.as_ref().unwrap().name, "F1");
}

#[test]
fn untagged_and_suppressed_fields() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("Max", "", ht.int),
        field("Skipped", r#"is:"-""#, ht.string),
        field("_", r#"is:"email""#, ht.string),
        field("F1", r#"is:"email""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);
    // the untagged field stays (it can be referenced); the suppressed and
    // blank fields are gone
    let names: Vec<&str> = an.validator.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Max", "F1"]);
    assert!(an.selectors.contains_key("Max"));
}

#[test]
fn field_key_collisions_are_deterministic() {
    let mut ht = HostTypes::new();
    // nested structs reuse the same leaf field name; leaf-mode keys collide
    let inner_a = ht.strukt("InnerA", vec![field("Name", r#"is:"required""#, ht.string)]);
    let inner_b = ht.strukt("InnerB", vec![field("Name", r#"is:"required""#, ht.string)]);
    let fields = vec![
        field("Name", r#"is:"required""#, ht.string),
        field("A", "", inner_a),
        field("B", "", inner_b),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);

    let keys: Vec<&str> = [
        &an.validator.fields[0],
        &an.validator.fields[1].children[0],
        &an.validator.fields[2].children[0],
    ]
    .iter()
    .map(|f| f.key.as_str())
    .collect();
    assert_eq!(keys, vec!["Name", "Name-1", "Name-2"]);
}

#[test]
fn nominated_keys_come_from_the_configured_tag() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("FirstName", r#"json:"first_name,omitempty" is:"required""#, ht.string),
        field("LastName", r#"is:"required""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);

    let config = Config {
        field_key_tag: Some("json".into()),
        ..Config::default()
    };
    let an = analyze_with(&ht, target, &config, &Registry::new()).unwrap();
    assert_eq!(an.validator.fields[0].key, "first_name");
    // fields without the nominated tag fall back to the field name
    assert_eq!(an.validator.fields[1].key, "LastName");
}

#[test]
fn joined_keys_use_the_configured_separator() {
    let mut ht = HostTypes::new();
    let inner = ht.strukt("Address", vec![field("City", r#"is:"required""#, ht.string)]);
    let target = ht.validator("UserValidator", vec![field("Home", "", inner)]);

    let config = Config {
        field_key_join: true,
        field_key_separator: ".".into(),
        ..Config::default()
    };
    let an = analyze_with(&ht, target, &config, &Registry::new()).unwrap();
    assert_eq!(an.validator.fields[0].children[0].key, "Home.City");
}

#[test]
fn special_fields_are_detected_by_capability() {
    let mut ht = HostTypes::new();
    let agg = ht.error_aggregator();
    let fields = vec![
        field("errs", "", agg),
        field("Context", "", ht.string),
        field("F1", r#"is:"required""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);

    let handler = an.validator.error_handler.unwrap();
    assert_eq!(handler.name, "errs");
    assert!(handler.is_aggregator);
    assert_eq!(an.validator.context_option.unwrap().name, "Context");
    // special fields are consumed, not validated
    assert_eq!(an.validator.fields.len(), 1);
}

#[test]
fn duplicate_error_handlers_conflict() {
    let mut ht = HostTypes::new();
    let ctor = ht.error_constructor();
    let agg = ht.error_aggregator();
    let fields = vec![
        field("eh1", "", ctor),
        field("eh2", "", agg),
        field("F1", r#"is:"required""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ErrorHandlerConflict { field: "eh2".into() }
    );
}

#[test]
fn context_option_must_be_string() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("context", "", ht.int),
        field("F1", r#"is:"required""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ContextOptionType {
            field: "context".into(),
            typ: "int".into()
        }
    );
}

#[test]
fn context_rules_require_a_context_option() {
    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"required:@create""#, ht.string);
    let target = ht.validator("UserValidator", vec![f1]);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::RuleContextUnknown {
            rule: "required".into(),
            context: "create".into()
        }
    );

    let mut ht = HostTypes::new();
    let fields = vec![
        field("Context", "", ht.string),
        field("F1", r#"is:"required:@create""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    assert!(analyze(&ht, target).is_ok());
}

#[test]
fn hooks_are_detected_case_insensitively() {
    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"required""#, ht.string);
    let target = ht.validator_with_hooks("UserValidator", vec![f1], &["beforeValidate", "AfterValidate"]);
    let an = analyze_ok(&ht, target);
    assert_eq!(an.validator.before_validate.as_deref(), Some("beforeValidate"));
    assert_eq!(an.validator.after_validate.as_deref(), Some("AfterValidate"));
}

#[test]
fn implicit_isvalid_rule_is_appended() {
    let mut ht = HostTypes::new();
    let kind = ht.named_with_is_valid("Kind", TypeKind::String);
    let fields = vec![
        field("K1", r#"is:"required""#, kind),
        field("K2", r#"is:"required,-isvalid""#, kind),
        field("K3", "", kind),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);
    assert!(an.validator.fields[0].tag.has_rule("isvalid"));
    assert!(!an.validator.fields[1].tag.has_rule("isvalid"));
    assert!(an.validator.fields[2].tag.has_rule("isvalid"));
}

#[test]
fn enum_rules_collect_typed_constants() {
    let mut ht = HostTypes::new();
    let kind = ht.named("Kind", TypeKind::String);
    ht.constant("KindA", kind);
    ht.constant("KindB", kind);
    let target = ht.validator("UserValidator", vec![field("K", r#"is:"enum""#, kind)]);
    let an = analyze_ok(&ht, target);
    let consts = &an.enums["example.com/app.Kind"];
    let names: Vec<&str> = consts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["KindA", "KindB"]);
}

#[test]
fn enum_rules_need_named_types_with_constants() {
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("K", r#"is:"enum""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EnumTypeUnnamed { .. }));

    let mut ht = HostTypes::new();
    let kind = ht.named("Kind", TypeKind::String);
    let target = ht.validator("UserValidator", vec![field("K", r#"is:"enum""#, kind)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EnumTypeNoConstants { .. }));
}

#[test]
fn basic_rule_type_constraints() {
    // numeric-only rules reject string fields
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"gt:5""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FieldTypeNotNumeric { .. }));

    // len rejects types without a length
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"len:4""#, ht.int)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FieldTypeNoLength { .. }));

    // len bounds must be unsigned integers
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"len:-4""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgTypeUint { .. }));

    // inverted len bounds are rejected
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"len:9:3""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgValueLen { .. }));

    // eq arg must convert to the field's type
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"eq:abc""#, ht.int)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgTypeInt { .. }));
}

#[test]
fn function_rule_type_constraints() {
    // email takes a string-ish field
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"email""#, ht.int)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FieldTypeFuncIncompatible { .. }));

    // arity is exact for non-variadic functions
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"ip""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgCount { .. }));

    // rule-specific value checks run after the generic ones
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"ip:5""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgValueIpVer { .. }));

    // bad regex patterns fail analysis, not the generated program
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"re:[""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleArgValueRegexp { .. }));
}

#[test]
fn field_references_resolve_against_the_selector_map() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("Max", "", ht.int),
        field("F1", r#"is:"len::&Max""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);
    assert_eq!(an.selectors["Max"].len(), 1);

    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"len::&Missing""#, ht.string);
    let target = ht.validator("UserValidator", vec![f1]);
    let err = analyze(&ht, target).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::FieldKeyUnknown {
            key: "Missing".into()
        }
    );
}

#[test]
fn elem_rules_require_container_types() {
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"[required]email""#, ht.string)]);
    let err = analyze(&ht, target).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FieldTypeNotComposite { .. }));

    let mut ht = HostTypes::new();
    let strings = ht.slice(ht.string);
    let m = ht.map(ht.string, strings);
    let target = ht.validator("UserValidator", vec![field("F1", r#"is:"[required]email""#, m)]);
    assert!(analyze(&ht, target).is_err()); // elem is []string, not string
}

#[test]
fn custom_rules_resolve_through_the_registry() {
    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"slug9""#, ht.string);
    let target = ht.validator("UserValidator", vec![f1]);

    let mut registry = Registry::new();
    registry
        .add_rule_func(
            "slug9",
            FuncIdent::new("example.com/app/rules", "Slug9"),
            vec![ParamKind::String],
            vec![ParamKind::Bool],
            false,
        )
        .unwrap();
    assert!(analyze_with(&ht, target, &Config::default(), &registry).is_ok());
    // without the registration the same tag fails
    assert!(analyze(&ht, target).is_err());
}

#[test]
fn cyclic_struct_types_terminate() {
    let mut ht = HostTypes::new();
    // Tree{ Child *Tree; Name string } closes a cycle through the arena
    let tree = ht.strukt("Tree", vec![]);
    let tree_ptr = ht.ptr(tree);
    ht.table.get_mut(tree).fields = vec![
        field("Child", "", tree_ptr),
        field("Name", r#"is:"required""#, ht.string),
    ];
    let target = ht.validator("TreeValidator", vec![field("Root", "", tree)]);
    let an = analyze(&ht, target).expect("cyclic types must not loop the analyzer");
    // descent stops when the named type recurs
    let root = &an.validator.fields[0];
    assert!(root.children.iter().any(|c| c.name == "Child"));
    let child = root.children.iter().find(|c| c.name == "Child").unwrap();
    assert!(child.children.is_empty());
}

#[test]
fn analysis_is_deterministic() {
    fn build() -> String {
        let mut ht = HostTypes::new();
        let inner = ht.strukt("Inner", vec![field("Name", r#"is:"required,len:1:64""#, ht.string)]);
        let kind = ht.named("Kind", TypeKind::String);
        ht.constant("KindA", kind);
        let fields = vec![
            field("Context", "", ht.string),
            field("Name", r#"is:"required""#, ht.string),
            field("K", r#"is:"enum""#, kind),
            field("Nested", "", inner),
        ];
        let target = ht.validator("UserValidator", fields);
        let an = analyze_ok(&ht, target);
        serde_json::to_string(&an).unwrap()
    }
    assert_eq!(build(), build());
}

#[test]
fn errors_carry_the_declaring_source() {
    let mut ht = HostTypes::new();
    let mut f1 = field("F1", r#"is:"nope""#, ht.string);
    f1.span = Span::new(10, 20);
    let target = ht.validator("UserValidator", vec![f1]);
    let err = analysis::analyze(
        &ht.table,
        target,
        &src(),
        Span::default(),
        &Config::default(),
        &Registry::new(),
    )
    .unwrap_err();
    assert_eq!(err.diagnostic_info.error_code, "verigen::analysis::rule_unknown");
    assert_eq!(err.to_string(), "unknown rule 'nope'");
}
