// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::parse_response;
use crate::agent::Action;
use crate::error::SimError;

#[test]
fn parses_well_formed_response() {
    let decision =
        parse_response(r#"{"action":"yield","speed":4.5,"reason":"cross traffic"}"#, 25.0)
            .unwrap();
    assert_eq!(decision.action, Action::Yield);
    assert!((decision.speed - 4.5).abs() < 1e-9);
    assert_eq!(decision.reason, "cross traffic");
}

#[test]
fn reason_is_optional() {
    let decision = parse_response(r#"{"action":"go","speed":10}"#, 25.0).unwrap();
    assert_eq!(decision.action, Action::Go);
    assert!(decision.reason.is_empty());
}

#[parameterized(
    go = { "go", Action::Go },
    yield_ = { "yield", Action::Yield },
    brake = { "brake", Action::Brake },
    stop = { "stop", Action::Stop },
)]
fn all_schema_actions_parse(action: &str, expected: Action) {
    let body = format!(r#"{{"action":"{action}","speed":1.0,"reason":""}}"#);
    assert_eq!(parse_response(&body, 25.0).unwrap().action, expected);
}

#[parameterized(
    unknown_action = { r#"{"action":"reverse","speed":1.0,"reason":""}"# },
    pull_over_not_in_schema = { r#"{"action":"pull_over","speed":1.0,"reason":""}"# },
    negative_speed = { r#"{"action":"go","speed":-1.0,"reason":""}"# },
    speed_above_cap = { r#"{"action":"go","speed":25.5,"reason":""}"# },
    missing_speed = { r#"{"action":"go","reason":""}"# },
    not_json = { "brake now please" },
    wrong_shape = { r#"["go", 1.0]"# },
)]
fn malformed_responses_fail(body: &str) {
    assert_eq!(parse_response(body, 25.0), Err(SimError::AdvisorMalformed));
}

#[test]
fn non_finite_speed_fails() {
    // JSON has no Inf literal; a huge exponent overflows to infinity.
    assert_eq!(
        parse_response(r#"{"action":"go","speed":1e999,"reason":""}"#, 25.0),
        Err(SimError::AdvisorMalformed)
    );
}

#[test]
fn speed_at_cap_is_accepted() {
    let decision = parse_response(r#"{"action":"go","speed":25.0,"reason":""}"#, 25.0).unwrap();
    assert!((decision.speed - 25.0).abs() < 1e-9);
}
