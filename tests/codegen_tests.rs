mod common;

use common::{analyze_ok, field, validate_method, HostTypes};
use verigen::analysis::Analysis;
use verigen::codegen::synthesize;
use verigen::model::{TypeId, TypeKind};
use verigen::rules::{FuncIdent, ParamKind, Registry};

fn synthesize_default(ht: &HostTypes, an: &Analysis) -> verigen::codegen::ast::File {
    synthesize(an, &ht.table, &Registry::new())
}

fn method_text(ht: &HostTypes, target: TypeId) -> String {
    validate_method(ht, target)
}

// ----------------------------------------------------------------------------
// documented scenarios
// ----------------------------------------------------------------------------

#[test]
fn contains_lowers_to_a_strings_call() {
    let mut ht = HostTypes::new();
    let target = ht.validator(
        "UserValidator",
        vec![field("F1", r#"is:"contains:foo""#, ht.string)],
    );
    let text = method_text(&ht, target);
    assert!(
        text.contains(r#"if !strings.Contains(v.F1, "foo") {"#),
        "got:\n{text}"
    );
    assert!(
        text.contains(r#"return errors.New("F1 must contain substring: \"foo\"")"#),
        "got:\n{text}"
    );
}

#[test]
fn required_multi_level_pointer_guard() {
    let mut ht = HostTypes::new();
    let pp_string = {
        let p = ht.ptr(ht.string);
        ht.ptr(p)
    };
    let target = ht.validator(
        "UserValidator",
        vec![field("F3", r#"is:"required,numeric""#, pp_string)],
    );
    let text = method_text(&ht, target);
    assert_eq!(
        text,
        "func (v UserValidator) Validate() error {\n\
         \tif v.F3 == nil || *v.F3 == nil || len(**v.F3) == 0 {\n\
         \t\treturn errors.New(\"F3 is required\")\n\
         \t} else if !check.Numeric(**v.F3) {\n\
         \t\treturn errors.New(\"F3 string content must match a numeric value\")\n\
         \t}\n\
         \treturn nil\n\
         }\n"
    );
}

#[test]
fn length_range_on_optional_string() {
    let mut ht = HostTypes::new();
    let p_string = ht.ptr(ht.string);
    let target = ht.validator(
        "UserValidator",
        vec![field("F2", r#"is:"len:8:256""#, p_string)],
    );
    let text = method_text(&ht, target);
    assert!(
        text.contains("if v.F2 != nil && (len(*v.F2) < 8 || len(*v.F2) > 256) {"),
        "got:\n{text}"
    );
    assert!(
        text.contains(
            r#"return errors.New("F2 must be of length between: 8 and 256 (inclusive)")"#
        ),
        "got:\n{text}"
    );
}

#[test]
fn not_equal_list_on_optional_int() {
    let mut ht = HostTypes::new();
    let p_int = ht.ptr(ht.int);
    let target = ht.validator(
        "UserValidator",
        vec![field("F2", r#"is:"ne:123:0:321""#, p_int)],
    );
    let text = method_text(&ht, target);
    assert!(
        text.contains("if v.F2 != nil && (*v.F2 == 123 || *v.F2 == 0 || *v.F2 == 321) {"),
        "got:\n{text}"
    );
    assert!(
        text.contains(r#"return errors.New("F2 must not be equal to: 123 or 0 or 321")"#),
        "got:\n{text}"
    );
}

#[test]
fn enum_membership_chain() {
    let mut ht = HostTypes::new();
    let kind = ht.named("MyKind", TypeKind::String);
    ht.constant("KindA", kind);
    ht.constant("KindB", kind);
    ht.constant("KindC", kind);
    let target = ht.validator("UserValidator", vec![field("F", r#"is:"enum""#, kind)]);
    let text = method_text(&ht, target);
    assert!(
        text.contains("if v.F != KindA && v.F != KindB && v.F != KindC {"),
        "got:\n{text}"
    );
    assert!(
        text.contains(r#"return errors.New("F is not valid")"#),
        "got:\n{text}"
    );
}

#[test]
fn field_reference_length_bound() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("Max", "", ht.int),
        field("F1", r#"is:"len::&Max""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(text.contains("if len(v.F1) > v.Max {"), "got:\n{text}");
    assert!(
        text.contains(r#"return fmt.Errorf("F1 must be of length at most: %v", v.Max)"#),
        "got:\n{text}"
    );
}

// ----------------------------------------------------------------------------
// guards and zero checks
// ----------------------------------------------------------------------------

#[test]
fn plain_rules_guard_every_pointer_level() {
    let mut ht = HostTypes::new();
    let ppp_string = {
        let p1 = ht.ptr(ht.string);
        let p2 = ht.ptr(p1);
        ht.ptr(p2)
    };
    let target = ht.validator(
        "UserValidator",
        vec![field("F1", r#"is:"email""#, ppp_string)],
    );
    let text = method_text(&ht, target);
    assert!(
        text.contains(
            "if v.F1 != nil && *v.F1 != nil && **v.F1 != nil && !check.Email(***v.F1) {"
        ),
        "got:\n{text}"
    );
}

#[test]
fn required_zero_checks_depend_on_kind() {
    let mut ht = HostTypes::new();
    let strings = ht.slice(ht.string);
    let p_float = ht.ptr(ht.float64);
    let fields = vec![
        field("S", r#"is:"required""#, ht.string),
        field("N", r#"is:"required""#, ht.int),
        field("F", r#"is:"required""#, p_float),
        field("B", r#"is:"required""#, ht.boolean),
        field("L", r#"is:"required""#, strings),
    ];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(text.contains("if len(v.S) == 0 {"), "got:\n{text}");
    assert!(text.contains("if v.N == 0 {"), "got:\n{text}");
    assert!(text.contains("if v.F == nil || *v.F == 0.0 {"), "got:\n{text}");
    assert!(text.contains("if v.B == false {"), "got:\n{text}");
    assert!(text.contains("if len(v.L) == 0 {"), "got:\n{text}");
}

#[test]
fn notnil_applies_to_nilable_kinds() {
    let mut ht = HostTypes::new();
    let strings = ht.slice(ht.string);
    let target = ht.validator("UserValidator", vec![field("L", r#"is:"notnil""#, strings)]);
    let text = method_text(&ht, target);
    assert!(text.contains("if v.L == nil {"), "got:\n{text}");
    assert!(text.contains(r#"errors.New("L cannot be nil")"#), "got:\n{text}");
}

// ----------------------------------------------------------------------------
// composite descent
// ----------------------------------------------------------------------------

#[test]
fn map_key_and_elem_rules_iterate() {
    let mut ht = HostTypes::new();
    let m = ht.map(ht.string, ht.string);
    let target = ht.validator(
        "UserValidator",
        vec![field("F", r#"is:"[required]email""#, m)],
    );
    let text = method_text(&ht, target);
    assert!(text.contains("for k, e := range v.F {"), "got:\n{text}");
    assert!(text.contains("if len(k) == 0 {"), "got:\n{text}");
    assert!(text.contains("if !check.Email(e) {"), "got:\n{text}");
}

#[test]
fn slice_elem_rules_iterate() {
    let mut ht = HostTypes::new();
    let strings = ht.slice(ht.string);
    let target = ht.validator(
        "UserValidator",
        vec![field("F", r#"is:"[]email""#, strings)],
    );
    let text = method_text(&ht, target);
    assert!(text.contains("for _, e := range v.F {"), "got:\n{text}");
    assert!(text.contains("if !check.Email(e) {"), "got:\n{text}");
}

#[test]
fn nested_struct_behind_pointer_uses_a_sub_block() {
    let mut ht = HostTypes::new();
    let inner = ht.strukt("Inner", vec![field("Name", r#"is:"required""#, ht.string)]);
    let p_inner = ht.ptr(inner);
    let target = ht.validator("UserValidator", vec![field("Nested", "", p_inner)]);
    let text = method_text(&ht, target);
    assert!(text.contains("if v.Nested != nil {"), "got:\n{text}");
    assert!(text.contains("f := *v.Nested"), "got:\n{text}");
    assert!(text.contains("if len(f.Name) == 0 {"), "got:\n{text}");
    assert!(text.contains(r#"errors.New("Name is required")"#), "got:\n{text}");
}

#[test]
fn multiple_rules_behind_pointer_share_a_sub_block() {
    let mut ht = HostTypes::new();
    let p_string = ht.ptr(ht.string);
    let target = ht.validator(
        "UserValidator",
        vec![field("F", r#"is:"email,len:5:64""#, p_string)],
    );
    let text = method_text(&ht, target);
    assert!(text.contains("if v.F != nil {"), "got:\n{text}");
    assert!(text.contains("f := *v.F"), "got:\n{text}");
    assert!(text.contains("if !check.Email(f) {"), "got:\n{text}");
    assert!(
        text.contains("} else if (len(f) < 5 || len(f) > 64) {"),
        "got:\n{text}"
    );
}

// ----------------------------------------------------------------------------
// hooks, handlers, context
// ----------------------------------------------------------------------------

#[test]
fn hooks_bracket_the_method_body() {
    let mut ht = HostTypes::new();
    let f1 = field("F1", r#"is:"required""#, ht.string);
    let target =
        ht.validator_with_hooks("UserValidator", vec![f1], &["BeforeValidate", "AfterValidate"]);
    let text = method_text(&ht, target);
    let before = text
        .find("if err := v.BeforeValidate(); err != nil {")
        .expect("before hook present");
    let check = text.find("if len(v.F1) == 0 {").expect("rule present");
    let after = text
        .find("if err := v.AfterValidate(); err != nil {")
        .expect("after hook present");
    assert!(before < check && check < after, "got:\n{text}");
    assert!(text.trim_end().ends_with("return nil\n}"), "got:\n{text}");
}

#[test]
fn aggregator_collects_and_returns_out() {
    let mut ht = HostTypes::new();
    let agg = ht.error_aggregator();
    let fields = vec![
        field("errs", "", agg),
        field("F1", r#"is:"required""#, ht.string),
        field("F2", r#"is:"email""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(
        text.contains(r#"v.errs.Error("F1", v.F1, "required")"#),
        "got:\n{text}"
    );
    assert!(!text.contains(r#"return v.errs.Error"#), "got:\n{text}");
    assert!(text.contains("return v.errs.Out()"), "got:\n{text}");
}

#[test]
fn constructor_returns_per_failure() {
    let mut ht = HostTypes::new();
    let ctor = ht.error_constructor();
    let fields = vec![
        field("eh", "", ctor),
        field("F1", r#"is:"len:4:""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(
        text.contains(r#"return v.eh.Error("F1", v.F1, "len", 4, "")"#),
        "got:\n{text}"
    );
    assert!(text.contains("return nil"), "got:\n{text}");
}

#[test]
fn context_clauses_guard_conditions() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("Context", "", ht.string),
        field("F1", r#"is:"required:@create""#, ht.string),
        field("F2", r#"is:"email:@update""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(
        text.contains(r#"if len(v.F1) == 0 && v.Context == "create" {"#),
        "got:\n{text}"
    );
    assert!(
        text.contains(r#"if (!check.Email(v.F2) && v.Context == "update") {"#),
        "got:\n{text}"
    );
}

// ----------------------------------------------------------------------------
// registry-driven lowering
// ----------------------------------------------------------------------------

#[test]
fn variadic_predicate_arguments_pass_through() {
    let mut ht = HostTypes::new();
    let target = ht.validator("UserValidator", vec![field("ID", r#"is:"uuid:4""#, ht.string)]);
    let text = method_text(&ht, target);
    assert!(text.contains("if !check.UUID(v.ID, 4) {"), "got:\n{text}");
    // uuid omits its arguments from the message
    assert!(
        text.contains(r#"return errors.New("ID must be a valid UUID")"#),
        "got:\n{text}"
    );
}

#[test]
fn regex_rules_register_patterns_once() {
    let mut ht = HostTypes::new();
    let fields = vec![
        field("A", r#"is:"re:\"^[0-9]+$\"""#, ht.string),
        field("B", r#"is:"re:\"^[0-9]+$\"""#, ht.string),
    ];
    let target = ht.validator("UserValidator", fields);
    let an = analyze_ok(&ht, target);
    let file = synthesize_default(&ht, &an);

    assert_eq!(file.init.len(), 1);
    assert_eq!(
        file.init[0].pretty(),
        "check.RegisterRegexp(`^[0-9]+$`)\n"
    );
    let text = file.decls[0].pretty();
    assert!(text.contains("if !check.Match(v.A, `^[0-9]+$`) {"), "got:\n{text}");
    assert!(
        file.imports.iter().any(|i| i.path == "verigen/check"),
        "imports: {:?}",
        file.imports
    );
}

#[test]
fn custom_rules_call_their_registered_function() {
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

    let an = verigen::analysis::analyze(
        &ht.table,
        target,
        &common::src(),
        verigen::model::Span::default(),
        &verigen::analysis::Config::default(),
        &registry,
    )
    .unwrap();
    let file = synthesize(&an, &ht.table, &registry);
    let text = file.decls[0].pretty();

    assert!(text.contains("if !rules.Slug9(v.F1) {"), "got:\n{text}");
    assert!(
        text.contains(r#"return errors.New("F1 is not valid")"#),
        "got:\n{text}"
    );
    assert!(
        file.imports.iter().any(|i| i.path == "example.com/app/rules"),
        "imports: {:?}",
        file.imports
    );
}

#[test]
fn is_valid_calls_parenthesize_derefs() {
    let mut ht = HostTypes::new();
    let kind = ht.named_with_is_valid("Kind", TypeKind::String);
    let p_kind = ht.ptr(kind);
    let fields = vec![field("K", "", kind), field("P", "", p_kind)];
    let target = ht.validator("UserValidator", fields);
    let text = method_text(&ht, target);
    assert!(text.contains("if !v.K.IsValid() {"), "got:\n{text}");
    assert!(
        text.contains("if v.P != nil && !(*v.P).IsValid() {"),
        "got:\n{text}"
    );
}

// ----------------------------------------------------------------------------
// determinism
// ----------------------------------------------------------------------------

#[test]
fn synthesis_is_deterministic() {
    fn build() -> String {
        let mut ht = HostTypes::new();
        let p_string = ht.ptr(ht.string);
        let fields = vec![
            field("Context", "", ht.string),
            field("Name", r#"is:"required,len:1:64""#, ht.string),
            field("Mail", r#"is:"email:@signup""#, p_string),
            field("Code", r#"is:"re:\"^[a-z]+$\"""#, ht.string),
        ];
        let target = ht.validator("UserValidator", fields);
        let an = analyze_ok(&ht, target);
        let file = synthesize_default(&ht, &an);
        serde_json::to_string(&file).unwrap()
    }
    assert_eq!(build(), build());
}
