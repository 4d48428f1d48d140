//! Unit tests for action evaluation and rule sets in studyflow-runtime

use serde_json::json;
use std::sync::Arc;
use studyflow_core::{
    AssignedSurvey, Expression, Participant, ParticipantMessage, Report, ReportData, StudyEvent,
    StudyEventType, SurveyResponse,
};
use studyflow_runtime::{
    validate_rules, ActionData, FixedClock, InMemoryStudyDb, RuleErrorPolicy, RuntimeError,
    StudyEngine,
};

const NOW: i64 = 1_700_000_000;

fn engine_with(db: Arc<InMemoryStudyDb>) -> StudyEngine {
    StudyEngine::builder(db)
        .with_clock(Arc::new(FixedClock::new(NOW)))
        .build()
        .unwrap()
}

fn engine() -> StudyEngine {
    engine_with(Arc::new(InMemoryStudyDb::new()))
}

fn submit(survey_key: &str) -> StudyEvent {
    StudyEvent::new("inst", "study", StudyEventType::Submit).with_response(SurveyResponse {
        id: "resp-1".to_string(),
        key: survey_key.to_string(),
        participant_id: "p1".to_string(),
        arrived_at: NOW - 30,
        ..Default::default()
    })
}

fn timer() -> StudyEvent {
    StudyEvent::new("inst", "study", StudyEventType::Timer)
}

fn survey(key: &str, category: &str) -> AssignedSurvey {
    AssignedSurvey {
        survey_key: key.to_string(),
        study_key: "study".to_string(),
        valid_from: 0,
        valid_until: 0,
        category: category.to_string(),
        profile_id: None,
    }
}

// ========== Copy-on-write Tests ==========

#[tokio::test]
async fn test_actions_never_modify_old_state() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/handle")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "pState": {
                    "participantId": "p1",
                    "studyStatus": "active",
                    "flags": {"scored": "yes"}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let db = Arc::new(InMemoryStudyDb::new());
    db.add_study_codes("inst", "study", "vouchers", ["V1", "V2", "V3"])
        .await;
    let engine = StudyEngine::builder(db)
        .with_clock(Arc::new(FixedClock::new(NOW)))
        .with_external_services(vec![studyflow_runtime::ExternalServiceConfig {
            name: "scorer".to_string(),
            url: server.url(),
            api_key: None,
            timeout: 5,
            mutual_tls: None,
        }])
        .build()
        .unwrap();

    let mut participant = Participant::new("p1").with_flag("health", "test");
    participant.linking_codes.insert("lab".to_string(), "L1".to_string());
    participant.assigned_surveys = vec![survey("s1", "a"), survey("s2", "b")];
    participant.messages = vec![
        ParticipantMessage {
            id: "m1".to_string(),
            message_type: "reminder".to_string(),
            scheduled_for: NOW + 60,
        },
        ParticipantMessage {
            id: "m2".to_string(),
            message_type: "invite".to_string(),
            scheduled_for: NOW + 120,
        },
    ];
    let mut old_state = ActionData::new(participant);
    let mut report = Report::new("r1", "p1", NOW);
    report.upsert(ReportData {
        key: "d1".to_string(),
        value: "v0".to_string(),
        dtype: None,
    });
    old_state.reports_to_create.insert("r1".to_string(), report);
    let snapshot = serde_json::to_vec(&old_state).unwrap();
    let event = submit("weekly");

    let actions = vec![
        Expression::new("UPDATE_FLAG").str("key").str("value"),
        Expression::new("REMOVE_FLAG").str("health"),
        Expression::new("SET_LINKING_CODE").str("lab").str("L2"),
        Expression::new("DELETE_LINKING_CODE"),
        Expression::new("DELETE_LINKING_CODE").str("lab"),
        Expression::new("DRAW_STUDY_CODE_AS_LINKING_CODE").str("vouchers"),
        Expression::new("ADD_NEW_SURVEY").str("s3").num(0.0).num(10.0).str("normal"),
        Expression::new("REMOVE_ALL_SURVEYS"),
        Expression::new("REMOVE_SURVEY_BY_KEY").str("s1").str("first"),
        Expression::new("REMOVE_SURVEYS_BY_KEY").str("s2"),
        Expression::new("ADD_MESSAGE").str("reminder").num(100.0),
        Expression::new("REMOVE_ALL_MESSAGES"),
        Expression::new("REMOVE_MESSAGES_BY_TYPE").str("reminder"),
        Expression::new("INIT_REPORT").str("r1"),
        Expression::new("UPDATE_REPORT_DATA").str("r1").str("d1").str("v1"),
        Expression::new("REMOVE_REPORT_DATA").str("r1").str("d1"),
        Expression::new("CANCEL_REPORT").str("r1"),
        Expression::new("UPDATE_STUDY_STATUS").str("exited"),
        Expression::new("START_NEW_STUDY_SESSION"),
        Expression::new("EXTERNAL_EVENT_HANDLER").str("scorer").str("handle"),
    ];

    for action in &actions {
        for _ in 0..2 {
            let next = engine.eval_action(action, &old_state, &event).await.unwrap();
            assert_ne!(next, old_state, "{} should produce a new state", action.name);
            assert_eq!(
                serde_json::to_vec(&old_state).unwrap(),
                snapshot,
                "{} modified its input",
                action.name
            );
        }
    }
}

// ========== Participant State Tests ==========

#[tokio::test]
async fn test_flag_scenario() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1").with_flag("health", "test"));
    let event = submit("test");

    let updated = engine
        .eval_action(&Expression::new("UPDATE_FLAG").str("key").str("value"), &state, &event)
        .await
        .unwrap();
    assert_eq!(updated.participant_state.flags["key"], "value");
    assert_eq!(updated.participant_state.flags["health"], "test");

    let removed = engine
        .eval_action(&Expression::new("REMOVE_FLAG").str("health"), &updated, &event)
        .await
        .unwrap();
    assert!(!removed.participant_state.flags.contains_key("health"));
    assert_eq!(removed.participant_state.flags["key"], "value");
}

#[tokio::test]
async fn test_update_flag_renders_numbers() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let action = Expression::new("UPDATE_FLAG")
        .str("count")
        .exp(Expression::new("sum").num(1.0).num(2.0));
    let next = engine.eval_action(&action, &state, &timer()).await.unwrap();
    assert_eq!(next.participant_state.flags["count"], "3");
}

#[tokio::test]
async fn test_add_and_remove_all_surveys() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let event = submit("test");
    let add = Expression::new("ADD_NEW_SURVEY")
        .str("s1")
        .exp(Expression::new("timestampWithOffset").num(-10.0))
        .exp(Expression::new("timestampWithOffset").num(10.0))
        .str("normal");

    let once = engine.eval_action(&add, &state, &event).await.unwrap();
    let twice = engine.eval_action(&add, &once, &event).await.unwrap();
    assert_eq!(twice.participant_state.assigned_surveys.len(), 2);
    let first = &twice.participant_state.assigned_surveys[0];
    assert_eq!(first.valid_from, NOW - 10);
    assert_eq!(first.valid_until, NOW + 10);
    assert_eq!(first.study_key, "study");

    let cleared = engine
        .eval_action(&Expression::new("REMOVE_ALL_SURVEYS"), &twice, &event)
        .await
        .unwrap();
    assert!(cleared.participant_state.assigned_surveys.is_empty());
}

#[tokio::test]
async fn test_remove_survey_by_key_positions() {
    let engine = engine();
    let mut participant = Participant::new("p1");
    participant.assigned_surveys = vec![
        survey("s1", "first"),
        survey("s2", "other"),
        survey("s1", "middle"),
        survey("s1", "last"),
    ];
    let state = ActionData::new(participant);
    let categories = |data: &ActionData| -> Vec<String> {
        data.participant_state
            .assigned_surveys
            .iter()
            .map(|s| s.category.clone())
            .collect()
    };

    let last = engine
        .eval_action(
            &Expression::new("REMOVE_SURVEY_BY_KEY").str("s1").str("last"),
            &state,
            &timer(),
        )
        .await
        .unwrap();
    assert_eq!(categories(&last), vec!["first", "other", "middle"]);

    let first = engine
        .eval_action(
            &Expression::new("REMOVE_SURVEY_BY_KEY").str("s1").str("first"),
            &state,
            &timer(),
        )
        .await
        .unwrap();
    assert_eq!(categories(&first), vec!["other", "middle", "last"]);

    let none = engine
        .eval_action(
            &Expression::new("REMOVE_SURVEY_BY_KEY").str("s9").str("first"),
            &state,
            &timer(),
        )
        .await
        .unwrap();
    assert_eq!(none, state);

    let all = engine
        .eval_action(&Expression::new("REMOVE_SURVEYS_BY_KEY").str("s1"), &state, &timer())
        .await
        .unwrap();
    assert_eq!(categories(&all), vec!["other"]);

    let bad = engine
        .eval_action(
            &Expression::new("REMOVE_SURVEY_BY_KEY").str("s1").str("middle"),
            &state,
            &timer(),
        )
        .await;
    assert!(matches!(bad, Err(RuntimeError::InvalidArguments { .. })));
}

#[tokio::test]
async fn test_messages_and_linking_codes() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let rule = Expression::new("DO")
        .exp(Expression::new("ADD_MESSAGE").str("reminder").num(100.0))
        .exp(Expression::new("ADD_MESSAGE").str("invite").num(200.0))
        .exp(Expression::new("REMOVE_MESSAGES_BY_TYPE").str("reminder"))
        .exp(Expression::new("SET_LINKING_CODE").str("a").str("1"))
        .exp(Expression::new("SET_LINKING_CODE").str("b").str("2"))
        .exp(Expression::new("DELETE_LINKING_CODE").str("a"));

    let next = engine.eval_action(&rule, &state, &timer()).await.unwrap();
    let messages = &next.participant_state.messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, "invite");
    assert!(!messages[0].id.is_empty());
    assert_eq!(next.participant_state.linking_codes.len(), 1);
    assert_eq!(next.participant_state.linking_codes["b"], "2");

    let cleared = engine
        .eval_action(&Expression::new("DELETE_LINKING_CODE"), &next, &timer())
        .await
        .unwrap();
    assert!(cleared.participant_state.linking_codes.is_empty());
}

#[tokio::test]
async fn test_new_study_session_id() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let next = engine
        .eval_action(&Expression::new("START_NEW_STUDY_SESSION"), &state, &timer())
        .await
        .unwrap();
    let session = &next.participant_state.current_study_session;
    assert!(session.starts_with(&format!("{:x}", NOW)));
    assert_eq!(session.len(), format!("{:x}", NOW).len() + 8);
}

// ========== Control Flow Tests ==========

#[tokio::test]
async fn test_if_branches() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let rule = Expression::new("IF")
        .exp(Expression::new("checkEventType").str("SUBMIT"))
        .exp(Expression::new("UPDATE_FLAG").str("branch").str("then"))
        .exp(Expression::new("UPDATE_FLAG").str("branch").str("else"));

    let on_submit = engine.eval_action(&rule, &state, &submit("weekly")).await.unwrap();
    assert_eq!(on_submit.participant_state.flags["branch"], "then");

    let on_timer = engine.eval_action(&rule, &state, &timer()).await.unwrap();
    assert_eq!(on_timer.participant_state.flags["branch"], "else");

    let without_else = Expression::new("IF")
        .exp(Expression::new("checkEventType").str("SUBMIT"))
        .exp(Expression::new("UPDATE_FLAG").str("branch").str("then"));
    let untouched = engine.eval_action(&without_else, &state, &timer()).await.unwrap();
    assert_eq!(untouched, state);
}

#[tokio::test]
async fn test_do_aborts_and_ifthen_continues() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let broken = Expression::new("UPDATE_FLAG").str("missing-value");

    let do_rule = Expression::new("DO")
        .exp(Expression::new("UPDATE_FLAG").str("a").str("1"))
        .exp(broken.clone())
        .exp(Expression::new("UPDATE_FLAG").str("b").str("2"));
    let err = engine.eval_action(&do_rule, &state, &timer()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidArguments { .. }));

    let if_then = Expression::new("IFTHEN")
        .num(1.0)
        .exp(Expression::new("UPDATE_FLAG").str("a").str("1"))
        .exp(broken)
        .exp(Expression::new("UPDATE_FLAG").str("b").str("2"));
    let next = engine.eval_action(&if_then, &state, &timer()).await.unwrap();
    assert_eq!(next.participant_state.flags["a"], "1");
    assert_eq!(next.participant_state.flags["b"], "2");
}

#[tokio::test]
async fn test_later_actions_see_earlier_changes() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let rule = Expression::new("DO")
        .exp(Expression::new("UPDATE_FLAG").str("step").str("1"))
        .exp(
            Expression::new("IF")
                .exp(Expression::new("hasParticipantFlagKeyAndValue").str("step").str("1"))
                .exp(Expression::new("UPDATE_FLAG").str("step").str("2")),
        );
    let next = engine.eval_action(&rule, &state, &timer()).await.unwrap();
    assert_eq!(next.participant_state.flags["step"], "2");
}

#[tokio::test]
async fn test_action_depth_limit() {
    let engine = StudyEngine::builder(Arc::new(InMemoryStudyDb::new()))
        .with_max_depth(4)
        .build()
        .unwrap();
    let state = ActionData::new(Participant::new("p1"));
    let nested = (0..10).fold(Expression::new("REMOVE_ALL_MESSAGES"), |inner, _| {
        Expression::new("DO").exp(inner)
    });
    let err = engine.eval_action(&nested, &state, &timer()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::DepthLimitExceeded(4)));
}

// ========== Report Tests ==========

#[tokio::test]
async fn test_report_scenario() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let event = submit("weekly");
    let rule = Expression::new("DO")
        .exp(Expression::new("INIT_REPORT").str("k1"))
        .exp(Expression::new("UPDATE_REPORT_DATA").str("k1").str("d1").str("v1"))
        .exp(Expression::new("UPDATE_REPORT_DATA").str("k1").str("d1").str("v2"));

    let next = engine.eval_action(&rule, &state, &event).await.unwrap();
    assert_eq!(next.reports_to_create.len(), 1);
    let report = &next.reports_to_create["k1"];
    assert_eq!(
        report.data,
        vec![ReportData {
            key: "d1".to_string(),
            value: "v2".to_string(),
            dtype: None,
        }]
    );
    assert_eq!(report.participant_id, "p1");
    assert_eq!(report.response_id.as_deref(), Some("resp-1"));
    assert_eq!(report.timestamp % 60, 0);
}

#[tokio::test]
async fn test_report_data_formatting_and_removal() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let rule = Expression::new("DO")
        .exp(Expression::new("UPDATE_REPORT_DATA").str("r").str("int").num(4.7).str("int"))
        .exp(Expression::new("UPDATE_REPORT_DATA").str("r").str("float").num(4.5).str("float"))
        .exp(Expression::new("UPDATE_REPORT_DATA").str("r").str("gone").str("x"))
        .exp(Expression::new("REMOVE_REPORT_DATA").str("r").str("gone"))
        .exp(Expression::new("INIT_REPORT").str("cancelled"))
        .exp(Expression::new("CANCEL_REPORT").str("cancelled"));

    let next = engine.eval_action(&rule, &state, &timer()).await.unwrap();
    assert_eq!(next.reports_to_create.len(), 1);
    let report = &next.reports_to_create["r"];
    assert!(report.response_id.is_none());
    let values: Vec<(&str, &str)> = report
        .data
        .iter()
        .map(|d| (d.key.as_str(), d.value.as_str()))
        .collect();
    assert_eq!(values, vec![("int", "4"), ("float", "4.5")]);
}

#[tokio::test]
async fn test_init_report_resets_existing() {
    let engine = engine();
    let state = ActionData::new(Participant::new("p1"));
    let rule = Expression::new("DO")
        .exp(Expression::new("UPDATE_REPORT_DATA").str("r").str("a").str("1"))
        .exp(Expression::new("INIT_REPORT").str("r"));
    let next = engine.eval_action(&rule, &state, &timer()).await.unwrap();
    assert!(next.reports_to_create["r"].data.is_empty());
}

// ========== Persistence-backed Tests ==========

#[tokio::test]
async fn test_notify_researcher_saves_message() {
    let db = Arc::new(InMemoryStudyDb::new());
    let engine = engine_with(db.clone());
    let state = ActionData::new(Participant::new("p1"));
    let action = Expression::new("NOTIFY_RESEARCHER")
        .str("adverse-event")
        .str("severity")
        .num(3.0)
        .str("survey")
        .str("weekly");

    let next = engine.eval_action(&action, &state, &timer()).await.unwrap();
    assert_eq!(next, state);

    let messages = db.researcher_messages("inst", "study").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, "adverse-event");
    assert_eq!(messages[0].participant_id, "p1");
    assert_eq!(messages[0].payload["severity"], "3");
    assert_eq!(messages[0].payload["survey"], "weekly");

    let dangling_key = Expression::new("NOTIFY_RESEARCHER").str("t").str("key-without-value");
    assert!(engine.eval_action(&dangling_key, &state, &timer()).await.is_err());
}

#[tokio::test]
async fn test_remove_confidential_responses() {
    let db = Arc::new(InMemoryStudyDb::new());
    for (pid, key) in [
        ("p1", "consent"),
        ("p1", "contact"),
        ("conf-9", "consent"),
        ("conf-9", "contact"),
    ] {
        db.add_confidential_response(
            "inst",
            "study",
            SurveyResponse {
                key: key.to_string(),
                participant_id: pid.to_string(),
                ..Default::default()
            },
        )
        .await;
    }
    let engine = engine_with(db.clone());
    let state = ActionData::new(Participant::new("p1"));

    engine
        .eval_action(
            &Expression::new("REMOVE_CONFIDENTIAL_RESPONSE_BY_KEY").str("consent"),
            &state,
            &timer(),
        )
        .await
        .unwrap();
    assert_eq!(db.confidential_responses("inst", "study").await.len(), 3);

    let mut event = timer();
    event.participant_id_for_confidential_responses = Some("conf-9".to_string());
    engine
        .eval_action(&Expression::new("REMOVE_ALL_CONFIDENTIAL_RESPONSES"), &state, &event)
        .await
        .unwrap();

    let remaining = db.confidential_responses("inst", "study").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].participant_id, "p1");
    assert_eq!(remaining[0].key, "contact");
}

#[tokio::test]
async fn test_study_code_actions() {
    let db = Arc::new(InMemoryStudyDb::new());
    db.add_study_codes("inst", "study", "vouchers", ["V1", "V2", "V3"]).await;
    let engine = engine_with(db.clone());
    let state = ActionData::new(Participant::new("p1"));

    engine
        .eval_action(
            &Expression::new("REMOVE_STUDY_CODE").str("vouchers").str("V2"),
            &state,
            &timer(),
        )
        .await
        .unwrap();
    assert_eq!(db.study_codes("inst", "study", "vouchers").await, vec!["V1", "V3"]);

    let draw = Expression::new("DRAW_STUDY_CODE_AS_LINKING_CODE").str("vouchers");
    let first = engine.eval_action(&draw, &state, &timer()).await.unwrap();
    assert_eq!(first.participant_state.linking_codes["vouchers"], "V1");

    let custom_key = Expression::new("DRAW_STUDY_CODE_AS_LINKING_CODE")
        .str("vouchers")
        .str("voucher");
    let second = engine.eval_action(&custom_key, &first, &timer()).await.unwrap();
    assert_eq!(second.participant_state.linking_codes["voucher"], "V3");

    // the list is exhausted now: the linking code is removed instead of set
    let third = engine.eval_action(&draw, &second, &timer()).await.unwrap();
    assert!(!third.participant_state.linking_codes.contains_key("vouchers"));
    assert_eq!(third.participant_state.linking_codes["voucher"], "V3");
}

// ========== External Handler Tests ==========

#[tokio::test]
async fn test_external_event_handler_merges_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/handle")
        .match_header("Api-Key", "k")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "pState": {
                    "participantId": "p1",
                    "studyStatus": "active",
                    "flags": {"scored": "yes"}
                },
                "reportsToCreate": {
                    "score": {"key": "score", "participantId": "p1", "timestamp": 60, "data": []}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let engine = StudyEngine::builder(Arc::new(InMemoryStudyDb::new()))
        .with_external_services(vec![studyflow_runtime::ExternalServiceConfig {
            name: "scorer".to_string(),
            url: server.url(),
            api_key: Some("k".to_string()),
            timeout: 5,
            mutual_tls: None,
        }])
        .build()
        .unwrap();
    let state = ActionData::new(Participant::new("p1"));
    let action = Expression::new("EXTERNAL_EVENT_HANDLER").str("scorer").str("handle");

    let next = engine.eval_action(&action, &state, &timer()).await.unwrap();
    assert_eq!(next.participant_state.flags["scored"], "yes");
    assert!(next.reports_to_create.contains_key("score"));
    mock.assert_async().await;
}

// ========== Rule Set Tests ==========

#[tokio::test]
async fn test_rule_set_continues_past_failures() {
    let engine = engine();
    let rules: Vec<Expression> = serde_json::from_value(json!([
        {"name": "UPDATE_FLAG", "data": [{"dtype": "str", "str": "a"}, {"dtype": "num", "num": 1}]},
        {"name": "NO_SUCH_ACTION"},
        {"name": "IF", "data": [
            {"dtype": "exp", "exp": {"name": "checkEventType", "data": [
                {"dtype": "str", "str": "SUBMIT"}
            ]}},
            {"dtype": "exp", "exp": {"name": "UPDATE_FLAG", "data": [{"str": "b"}, {"str": "2"}]}}
        ]}
    ]))
    .unwrap();

    let issues = validate_rules(&rules);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].name, "NO_SUCH_ACTION");

    let state = ActionData::new(Participant::new("p1"));
    let outcome = engine
        .apply_rules(&rules, state.clone(), &submit("weekly"), RuleErrorPolicy::Continue)
        .await
        .unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(outcome.failures[0].error, RuntimeError::UnknownAction(_)));
    assert_eq!(outcome.state.participant_state.flags["a"], "1");
    assert_eq!(outcome.state.participant_state.flags["b"], "2");
    assert_eq!(outcome.state.participant_state.last_submissions["weekly"], NOW - 30);

    let aborted = engine
        .apply_rules(&rules, state, &submit("weekly"), RuleErrorPolicy::Abort)
        .await;
    assert!(matches!(aborted, Err(RuntimeError::RuleFailed { index: 1, .. })));
}
