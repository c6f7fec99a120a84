//! Tests for filter conditions and evaluation

use chrono::{TimeZone, Utc};
use tally_warehouse::{FieldRef, FieldType, Record, Schema, SchemaField, SchemaObject};

use crate::filter::{
    ConditionValue, FilterCondition, FilterLogic, FilterSet, Operator, Scalar, evaluate,
};

fn schema() -> Schema {
    Schema::new(
        vec![SchemaObject::new(
            "payments",
            vec![
                SchemaField::new("amount", FieldType::Number),
                SchemaField::enumeration("status", &["paid", "failed", "refunded"]),
                SchemaField::new("note", FieldType::String),
                SchemaField::new("disputed", FieldType::Boolean),
                SchemaField::new("created", FieldType::Date),
            ],
        )],
        vec![],
    )
    .unwrap()
}

fn f(field: &str) -> FieldRef {
    FieldRef::new("payments", field)
}

fn records() -> Vec<Record> {
    vec![
        Record::new()
            .with("amount", 10.0)
            .with("status", "paid")
            .with("disputed", false)
            .with("created", Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap()),
        Record::new()
            .with("amount", 20.0)
            .with("status", "paid")
            .with("note", "VIP customer")
            .with("disputed", true)
            .with("created", Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()),
        Record::new()
            .with("amount", 30.0)
            .with("status", "failed")
            .with("note", ""),
        Record::new().with("status", "refunded"),
    ]
}

fn matching(set: &FilterSet) -> Vec<usize> {
    let schema = schema();
    records()
        .iter()
        .enumerate()
        .filter(|(_, r)| set.matches("payments", r, &schema))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_operator_parse() {
    assert_eq!(Operator::parse("equals").unwrap(), Operator::Equals);
    assert_eq!(Operator::parse("=").unwrap(), Operator::Equals);
    assert_eq!(Operator::parse("NOT_EQUALS").unwrap(), Operator::NotEquals);
    assert_eq!(Operator::parse("!=").unwrap(), Operator::NotEquals);
    assert_eq!(Operator::parse("greater_than").unwrap(), Operator::GreaterThan);
    assert_eq!(Operator::parse(">=").unwrap(), Operator::GreaterOrEqual);
    assert_eq!(Operator::parse("less_than").unwrap(), Operator::LessThan);
    assert_eq!(Operator::parse("lte").unwrap(), Operator::LessOrEqual);
    assert_eq!(Operator::parse("between").unwrap(), Operator::Between);
    assert_eq!(Operator::parse("like").unwrap(), Operator::Contains);
    assert!(Operator::parse("regex").is_err());
    assert!(Operator::parse("").is_err());
}

#[test]
fn test_logic_parse() {
    assert_eq!(FilterLogic::parse("AND").unwrap(), FilterLogic::And);
    assert_eq!(FilterLogic::parse("any").unwrap(), FilterLogic::Or);
    assert!(FilterLogic::parse("xor").is_err());
}

#[test]
fn test_condition_value_from_json() {
    let parse = |v: serde_json::Value| serde_json::from_value::<ConditionValue>(v);

    assert_eq!(parse(serde_json::json!(null)).unwrap(), ConditionValue::Blank);
    assert_eq!(parse(serde_json::json!("")).unwrap(), ConditionValue::Blank);
    assert_eq!(parse(serde_json::json!([])).unwrap(), ConditionValue::Blank);
    assert_eq!(
        parse(serde_json::json!("paid")).unwrap(),
        ConditionValue::Single(Scalar::Text("paid".into()))
    );
    assert_eq!(
        parse(serde_json::json!([1, 2])).unwrap(),
        ConditionValue::List(vec![Scalar::Number(1.0), Scalar::Number(2.0)])
    );
    assert!(parse(serde_json::json!({"a": 1})).is_err());
    assert!(parse(serde_json::json!([[1]])).is_err());
}

#[test]
fn test_condition_deserialize_without_value_is_blank() {
    let cond: FilterCondition = serde_json::from_str(
        r#"{"field": {"object": "payments", "field": "note"}, "operator": "equals"}"#,
    )
    .unwrap();
    assert_eq!(cond.value, ConditionValue::Blank);
}

#[test]
fn test_empty_set_matches_everything() {
    assert_eq!(matching(&FilterSet::all(vec![])), vec![0, 1, 2, 3]);
    assert_eq!(matching(&FilterSet::any(vec![])), vec![0, 1, 2, 3]);
}

#[test]
fn test_equals_and_not_equals() {
    let set = FilterSet::all(vec![FilterCondition::equals(f("status"), "paid")]);
    assert_eq!(matching(&set), vec![0, 1]);

    let set = FilterSet::all(vec![FilterCondition::not_equals(f("status"), "paid")]);
    assert_eq!(matching(&set), vec![2, 3]);

    // Numeric text against a number field
    let set = FilterSet::all(vec![FilterCondition::equals(f("amount"), "20")]);
    assert_eq!(matching(&set), vec![1]);
}

#[test]
fn test_multi_select_membership() {
    let set = FilterSet::all(vec![FilterCondition::one_of(
        f("status"),
        vec!["failed".into(), "refunded".into()],
    )]);
    assert_eq!(matching(&set), vec![2, 3]);

    let set = FilterSet::all(vec![FilterCondition::new(
        f("status"),
        Operator::NotEquals,
        ConditionValue::List(vec!["failed".into(), "refunded".into()]),
    )]);
    assert_eq!(matching(&set), vec![0, 1]);
}

#[test]
fn test_ordering_comparisons() {
    let set = FilterSet::all(vec![FilterCondition::greater_than(f("amount"), 10.0)]);
    assert_eq!(matching(&set), vec![1, 2]);

    let set = FilterSet::all(vec![FilterCondition::less_than(f("amount"), 30.0)]);
    assert_eq!(matching(&set), vec![0, 1]);

    // Strings are not ordered
    let set = FilterSet::all(vec![FilterCondition::greater_than(f("status"), "a")]);
    assert!(matching(&set).is_empty());

    // Non-numeric operand on a number field
    let set = FilterSet::all(vec![FilterCondition::greater_than(f("amount"), "lots")]);
    assert!(matching(&set).is_empty());
}

#[test]
fn test_between_is_inclusive() {
    let set = FilterSet::all(vec![FilterCondition::between(f("amount"), 10.0, 20.0)]);
    assert_eq!(matching(&set), vec![0, 1]);

    // Strings have no ordering
    let set = FilterSet::all(vec![FilterCondition::between(f("status"), "a", "z")]);
    assert!(matching(&set).is_empty());

    // Wrong arity
    let set = FilterSet::all(vec![FilterCondition::new(
        f("amount"),
        Operator::Between,
        ConditionValue::Single(Scalar::Number(10.0)),
    )]);
    assert!(matching(&set).is_empty());
}

#[test]
fn test_date_conditions_use_calendar_days() {
    let set = FilterSet::all(vec![FilterCondition::equals(f("created"), "2024-01-05")]);
    assert_eq!(matching(&set), vec![0]);

    let set = FilterSet::all(vec![FilterCondition::greater_than(f("created"), "2024-01-05")]);
    assert_eq!(matching(&set), vec![1]);

    let set = FilterSet::all(vec![FilterCondition::between(
        f("created"),
        "2024-01-01",
        "2024-01-05",
    )]);
    assert_eq!(matching(&set), vec![0]);

    let set = FilterSet::all(vec![FilterCondition::less_than(
        f("created"),
        "2024-01-06T00:00:00Z",
    )]);
    assert_eq!(matching(&set), vec![0]);
}

#[test]
fn test_blank_matches_absent_or_empty_only() {
    let set = FilterSet::all(vec![FilterCondition::blank(f("note"))]);
    assert_eq!(matching(&set), vec![0, 2, 3]);

    let set = FilterSet::all(vec![FilterCondition::new(
        f("note"),
        Operator::NotEquals,
        ConditionValue::Blank,
    )]);
    assert_eq!(matching(&set), vec![1]);

    let set = FilterSet::all(vec![FilterCondition::blank(f("amount"))]);
    assert_eq!(matching(&set), vec![3]);
}

#[test]
fn test_boolean_ignores_operator_name() {
    let set = FilterSet::all(vec![FilterCondition::equals(f("disputed"), true)]);
    assert_eq!(matching(&set), vec![1]);

    let set = FilterSet::all(vec![FilterCondition::not_equals(f("disputed"), true)]);
    assert_eq!(matching(&set), vec![1]);

    let set = FilterSet::all(vec![FilterCondition::greater_than(f("disputed"), "false")]);
    assert_eq!(matching(&set), vec![0]);
}

#[test]
fn test_contains_is_case_insensitive() {
    let set = FilterSet::all(vec![FilterCondition::contains(f("note"), "vip")]);
    assert_eq!(matching(&set), vec![1]);
}

#[test]
fn test_unresolved_field_and_vs_or() {
    let unresolved = FilterCondition::equals(f("missing_field"), "x");
    let paid = FilterCondition::equals(f("status"), "paid");

    let set = FilterSet::all(vec![paid.clone(), unresolved.clone()]);
    assert!(matching(&set).is_empty());

    let set = FilterSet::any(vec![paid, unresolved.clone()]);
    assert_eq!(matching(&set), vec![0, 1]);

    let set = FilterSet::any(vec![unresolved]);
    assert!(matching(&set).is_empty());
}

#[test]
fn test_condition_for_other_object_is_unresolved() {
    let schema = schema();
    let record = &records()[0];
    let cond = FilterCondition::equals(FieldRef::new("customers", "status"), "paid");
    assert!(!evaluate(
        std::slice::from_ref(&cond),
        FilterLogic::And,
        "payments",
        record,
        &schema
    ));
}

#[test]
fn test_and_subset_of_or() {
    let schema = schema();
    let condition_sets = vec![
        vec![
            FilterCondition::equals(f("status"), "paid"),
            FilterCondition::greater_than(f("amount"), 15.0),
        ],
        vec![
            FilterCondition::blank(f("note")),
            FilterCondition::less_than(f("amount"), 100.0),
            FilterCondition::equals(f("nope"), 1.0),
        ],
        vec![FilterCondition::contains(f("note"), "vip")],
    ];

    for conditions in &condition_sets {
        for record in &records() {
            let and = evaluate(conditions, FilterLogic::And, "payments", record, &schema);
            let or = evaluate(conditions, FilterLogic::Or, "payments", record, &schema);
            assert!(!and || or, "AND matched but OR did not for {:?}", record);
        }
    }
}

#[test]
fn test_for_object_scopes_conditions() {
    let set = FilterSet::all(vec![
        FilterCondition::equals(f("status"), "paid"),
        FilterCondition::equals(FieldRef::new("customers", "plan"), "pro"),
    ]);
    let scoped = set.for_object("payments");
    assert_eq!(scoped.conditions.len(), 1);
    assert_eq!(scoped.logic, FilterLogic::And);
}

#[test]
fn test_describe_uses_first_condition_per_field() {
    let set = FilterSet::all(vec![
        FilterCondition::equals(f("status"), "paid"),
        FilterCondition::equals(f("status"), "failed"),
        FilterCondition::between(f("amount"), 10.0, 20.0),
        FilterCondition::blank(f("note")),
    ]);
    assert_eq!(
        set.describe(),
        "payments.status equals paid and payments.amount between 10 and 20 and payments.note is blank"
    );
}
