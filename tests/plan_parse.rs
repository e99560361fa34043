use hwpx_edit::plan::{parse_plan_response, EditAction, PlanError};

fn pairs(content: &str) -> Vec<(String, String)> {
    parse_plan_response(content)
        .unwrap()
        .actions()
        .iter()
        .map(|a| (a.find().to_string(), a.replace().to_string()))
        .collect()
}

#[test]
fn keeps_actions_in_order() {
    let got = pairs(
        r#"{"actions":[{"find":"5월 2일","replace":"5월 9일"},{"find":"불필요","replace":""}]}"#,
    );
    assert_eq!(
        got,
        vec![
            ("5월 2일".to_string(), "5월 9일".to_string()),
            ("불필요".to_string(), String::new()),
        ]
    );
}

#[test]
fn incomplete_elements_are_dropped() {
    let got = pairs(
        r#"{"actions":[
            {"find":"a"},
            {"replace":"b"},
            {"find":1,"replace":"c"},
            "not an object",
            {"find":"","replace":"x"},
            {"find":"keep","replace":"kept"}
        ]}"#,
    );
    assert_eq!(got, vec![("keep".to_string(), "kept".to_string())]);
}

#[test]
fn action_kind_must_be_replace_text_when_present() {
    let got = pairs(
        r#"{"actions":[
            {"action":"replace_text","find":"a","replace":"b"},
            {"action":"delete_paragraph","find":"c","replace":""}
        ]}"#,
    );
    assert_eq!(got, vec![("a".to_string(), "b".to_string())]);
}

#[test]
fn fenced_payload_is_unwrapped() {
    let got = pairs("```json\n{\"actions\":[{\"find\":\"x\",\"replace\":\"y\"}]}\n```");
    assert_eq!(got, vec![("x".to_string(), "y".to_string())]);
}

#[test]
fn fence_without_language_tag_keeps_first_line() {
    let got = pairs("```{\n\"actions\":[{\"find\":\"x\",\"replace\":\"y\"}]}```");
    assert_eq!(got, vec![("x".to_string(), "y".to_string())]);

    let got = pairs("```\n{\"actions\":[{\"find\":\"a\",\"replace\":\"b\"}]}\n```");
    assert_eq!(got, vec![("a".to_string(), "b".to_string())]);
}

#[test]
fn empty_action_list_is_valid() {
    assert!(parse_plan_response(r#"{"actions":[]}"#).unwrap().is_empty());
}

#[test]
fn structural_problems_are_invalid_response() {
    for bad in [
        "I could not do that",
        r#"{"plan":[]}"#,
        r#"{"actions":{"find":"a","replace":"b"}}"#,
        r#"[{"find":"a","replace":"b"}]"#,
    ] {
        let err = parse_plan_response(bad).unwrap_err();
        assert!(matches!(err, PlanError::InvalidResponse(_)), "{bad}: {err}");
    }
}

#[test]
fn empty_find_is_rejected() {
    assert!(matches!(EditAction::new("", "x"), Err(PlanError::EmptyFind)));
    assert!(EditAction::new("x", "").is_ok());
}

#[test]
fn only_transient_errors_are_retryable() {
    assert!(PlanError::Timeout(10).is_retryable());
    assert!(PlanError::Unreachable("refused".into()).is_retryable());
    assert!(PlanError::Service { status: 503, body: String::new() }.is_retryable());
    assert!(!PlanError::Service { status: 401, body: String::new() }.is_retryable());
    assert!(!PlanError::Unconfigured("k".into()).is_retryable());
    assert!(!PlanError::InvalidResponse("x".into()).is_retryable());
}
