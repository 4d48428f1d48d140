//! Name registry for expressions and actions
//!
//! Rule data addresses handlers by name. The tables below are built once and
//! map each DSL name onto an enum variant; evaluation then matches on the
//! variant, so every handler is checked for exhaustiveness at compile time.

use crate::context::StateSource;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Prefix selecting the incoming participant state during merges
pub const INCOMING_STATE_PREFIX: &str = "incomingState:";

/// Expression handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    // Event introspection
    CheckEventType,
    CheckEventKey,
    CheckSurveyResponseKey,
    HasEventPayload,
    HasEventPayloadKey,
    GetEventPayloadValueAsStr,
    GetEventPayloadValueAsNum,

    // Submitted response introspection
    ResponseHasKeysAny,
    ResponseHasOnlyKeysOtherThan,
    GetResponseValueAsNum,
    GetResponseValueAsStr,
    GetSelectedKeys,
    CountResponseItems,
    HasResponseKey,
    HasResponseKeyWithValue,

    // Response history
    CheckConditionForOldResponses,

    // Participant state
    GetStudyEntryTime,
    HasSurveyKeyAssigned,
    GetSurveyKeyAssignedFrom,
    GetSurveyKeyAssignedUntil,
    HasStudyStatus,
    HasParticipantFlagKey,
    HasParticipantFlagKeyAndValue,
    GetParticipantFlagValue,
    HasLinkingCode,
    GetLinkingCodeValue,
    GetLastSubmissionDate,
    LastSubmissionDateOlderThan,
    HasMessageTypeAssigned,
    GetMessageNextTime,

    // Study-level data
    IsStudyCodePresent,
    GetCurrentStudyCounterValue,
    GetNextStudyCounterValue,
    GetStudyVariableBoolean,
    GetStudyVariableInt,
    GetStudyVariableFloat,
    GetStudyVariableString,
    GetStudyVariableDate,

    // Logic, comparison and math
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    Sum,
    Neg,

    // Time and conversion utilities
    TimestampWithOffset,
    GetTsForNextStartOfMonth,
    GetTsForNextIsoWeek,
    GetIsoWeekForTs,
    DateToStr,
    ParseValueAsNum,
    GenerateRandomNumber,

    // External services
    ExternalEventEval,
}

impl ExpressionKind {
    /// Whether the handler reads participant state, and so accepts the
    /// `incomingState:` prefix
    pub fn reads_participant_state(&self) -> bool {
        matches!(
            self,
            ExpressionKind::GetStudyEntryTime
                | ExpressionKind::HasSurveyKeyAssigned
                | ExpressionKind::GetSurveyKeyAssignedFrom
                | ExpressionKind::GetSurveyKeyAssignedUntil
                | ExpressionKind::HasStudyStatus
                | ExpressionKind::HasParticipantFlagKey
                | ExpressionKind::HasParticipantFlagKeyAndValue
                | ExpressionKind::GetParticipantFlagValue
                | ExpressionKind::HasLinkingCode
                | ExpressionKind::GetLinkingCodeValue
                | ExpressionKind::GetLastSubmissionDate
                | ExpressionKind::LastSubmissionDateOlderThan
                | ExpressionKind::HasMessageTypeAssigned
                | ExpressionKind::GetMessageNextTime
        )
    }
}

const EXPRESSIONS: &[(&str, ExpressionKind)] = &[
    ("checkEventType", ExpressionKind::CheckEventType),
    ("checkEventKey", ExpressionKind::CheckEventKey),
    ("checkSurveyResponseKey", ExpressionKind::CheckSurveyResponseKey),
    ("hasEventPayload", ExpressionKind::HasEventPayload),
    ("hasEventPayloadKey", ExpressionKind::HasEventPayloadKey),
    ("getEventPayloadValueAsStr", ExpressionKind::GetEventPayloadValueAsStr),
    ("getEventPayloadValueAsNum", ExpressionKind::GetEventPayloadValueAsNum),
    ("responseHasKeysAny", ExpressionKind::ResponseHasKeysAny),
    ("responseHasOnlyKeysOtherThan", ExpressionKind::ResponseHasOnlyKeysOtherThan),
    ("getResponseValueAsNum", ExpressionKind::GetResponseValueAsNum),
    ("getResponseValueAsStr", ExpressionKind::GetResponseValueAsStr),
    ("getSelectedKeys", ExpressionKind::GetSelectedKeys),
    ("countResponseItems", ExpressionKind::CountResponseItems),
    ("hasResponseKey", ExpressionKind::HasResponseKey),
    ("hasResponseKeyWithValue", ExpressionKind::HasResponseKeyWithValue),
    ("checkConditionForOldResponses", ExpressionKind::CheckConditionForOldResponses),
    ("getStudyEntryTime", ExpressionKind::GetStudyEntryTime),
    ("hasSurveyKeyAssigned", ExpressionKind::HasSurveyKeyAssigned),
    ("getSurveyKeyAssignedFrom", ExpressionKind::GetSurveyKeyAssignedFrom),
    ("getSurveyKeyAssignedUntil", ExpressionKind::GetSurveyKeyAssignedUntil),
    ("hasStudyStatus", ExpressionKind::HasStudyStatus),
    ("hasParticipantFlagKey", ExpressionKind::HasParticipantFlagKey),
    ("hasParticipantFlagKeyAndValue", ExpressionKind::HasParticipantFlagKeyAndValue),
    ("getParticipantFlagValue", ExpressionKind::GetParticipantFlagValue),
    ("hasLinkingCode", ExpressionKind::HasLinkingCode),
    ("getLinkingCodeValue", ExpressionKind::GetLinkingCodeValue),
    ("getLastSubmissionDate", ExpressionKind::GetLastSubmissionDate),
    ("lastSubmissionDateOlderThan", ExpressionKind::LastSubmissionDateOlderThan),
    ("hasMessageTypeAssigned", ExpressionKind::HasMessageTypeAssigned),
    ("getMessageNextTime", ExpressionKind::GetMessageNextTime),
    ("isStudyCodePresent", ExpressionKind::IsStudyCodePresent),
    ("getCurrentStudyCounterValue", ExpressionKind::GetCurrentStudyCounterValue),
    ("getNextStudyCounterValue", ExpressionKind::GetNextStudyCounterValue),
    ("getStudyVariableBoolean", ExpressionKind::GetStudyVariableBoolean),
    ("getStudyVariableInt", ExpressionKind::GetStudyVariableInt),
    ("getStudyVariableFloat", ExpressionKind::GetStudyVariableFloat),
    ("getStudyVariableString", ExpressionKind::GetStudyVariableString),
    ("getStudyVariableDate", ExpressionKind::GetStudyVariableDate),
    ("eq", ExpressionKind::Eq),
    ("lt", ExpressionKind::Lt),
    ("lte", ExpressionKind::Lte),
    ("gt", ExpressionKind::Gt),
    ("gte", ExpressionKind::Gte),
    ("and", ExpressionKind::And),
    ("or", ExpressionKind::Or),
    ("not", ExpressionKind::Not),
    ("sum", ExpressionKind::Sum),
    ("neg", ExpressionKind::Neg),
    ("timestampWithOffset", ExpressionKind::TimestampWithOffset),
    ("getTsForNextStartOfMonth", ExpressionKind::GetTsForNextStartOfMonth),
    ("getTsForNextISOWeek", ExpressionKind::GetTsForNextIsoWeek),
    ("getISOWeekForTs", ExpressionKind::GetIsoWeekForTs),
    ("dateToStr", ExpressionKind::DateToStr),
    ("parseValueAsNum", ExpressionKind::ParseValueAsNum),
    ("generateRandomNumber", ExpressionKind::GenerateRandomNumber),
    ("externalEventEval", ExpressionKind::ExternalEventEval),
];

/// Action handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    // Control flow
    If,
    Do,
    IfThen,

    // Participant state
    UpdateStudyStatus,
    StartNewStudySession,
    UpdateFlag,
    RemoveFlag,
    SetLinkingCode,
    DeleteLinkingCode,
    AddNewSurvey,
    RemoveAllSurveys,
    RemoveSurveyByKey,
    RemoveSurveysByKey,
    AddMessage,
    RemoveAllMessages,
    RemoveMessagesByType,

    // Reports
    InitReport,
    UpdateReportData,
    RemoveReportData,
    CancelReport,

    // Persistence-backed
    NotifyResearcher,
    RemoveConfidentialResponseByKey,
    RemoveAllConfidentialResponses,
    RemoveStudyCode,
    DrawStudyCodeAsLinkingCode,

    // External services
    ExternalEventHandler,
}

impl ActionKind {
    /// Indices of arguments that are conditions rather than nested actions,
    /// for control-flow actions
    pub fn condition_args(&self) -> &'static [usize] {
        match self {
            ActionKind::If | ActionKind::IfThen => &[0],
            _ => &[],
        }
    }

    /// Whether nested expression arguments (other than conditions) are actions
    pub fn takes_nested_actions(&self) -> bool {
        matches!(self, ActionKind::If | ActionKind::Do | ActionKind::IfThen)
    }
}

const ACTIONS: &[(&str, ActionKind)] = &[
    ("IF", ActionKind::If),
    ("DO", ActionKind::Do),
    ("IFTHEN", ActionKind::IfThen),
    ("UPDATE_STUDY_STATUS", ActionKind::UpdateStudyStatus),
    ("START_NEW_STUDY_SESSION", ActionKind::StartNewStudySession),
    ("UPDATE_FLAG", ActionKind::UpdateFlag),
    ("REMOVE_FLAG", ActionKind::RemoveFlag),
    ("SET_LINKING_CODE", ActionKind::SetLinkingCode),
    ("DELETE_LINKING_CODE", ActionKind::DeleteLinkingCode),
    ("ADD_NEW_SURVEY", ActionKind::AddNewSurvey),
    ("REMOVE_ALL_SURVEYS", ActionKind::RemoveAllSurveys),
    ("REMOVE_SURVEY_BY_KEY", ActionKind::RemoveSurveyByKey),
    ("REMOVE_SURVEYS_BY_KEY", ActionKind::RemoveSurveysByKey),
    ("ADD_MESSAGE", ActionKind::AddMessage),
    ("REMOVE_ALL_MESSAGES", ActionKind::RemoveAllMessages),
    ("REMOVE_MESSAGES_BY_TYPE", ActionKind::RemoveMessagesByType),
    ("INIT_REPORT", ActionKind::InitReport),
    ("UPDATE_REPORT_DATA", ActionKind::UpdateReportData),
    ("REMOVE_REPORT_DATA", ActionKind::RemoveReportData),
    ("CANCEL_REPORT", ActionKind::CancelReport),
    ("NOTIFY_RESEARCHER", ActionKind::NotifyResearcher),
    ("REMOVE_CONFIDENTIAL_RESPONSE_BY_KEY", ActionKind::RemoveConfidentialResponseByKey),
    ("REMOVE_ALL_CONFIDENTIAL_RESPONSES", ActionKind::RemoveAllConfidentialResponses),
    ("REMOVE_STUDY_CODE", ActionKind::RemoveStudyCode),
    ("DRAW_STUDY_CODE_AS_LINKING_CODE", ActionKind::DrawStudyCodeAsLinkingCode),
    ("EXTERNAL_EVENT_HANDLER", ActionKind::ExternalEventHandler),
];

fn expression_table() -> &'static HashMap<&'static str, ExpressionKind> {
    static TABLE: OnceLock<HashMap<&'static str, ExpressionKind>> = OnceLock::new();
    TABLE.get_or_init(|| EXPRESSIONS.iter().copied().collect())
}

fn action_table() -> &'static HashMap<&'static str, ActionKind> {
    static TABLE: OnceLock<HashMap<&'static str, ActionKind>> = OnceLock::new();
    TABLE.get_or_init(|| ACTIONS.iter().copied().collect())
}

/// Resolve an expression name, including `incomingState:` twins
pub fn lookup_expression(name: &str) -> Option<(ExpressionKind, StateSource)> {
    match name.strip_prefix(INCOMING_STATE_PREFIX) {
        Some(base) => expression_table()
            .get(base)
            .copied()
            .filter(ExpressionKind::reads_participant_state)
            .map(|kind| (kind, StateSource::Incoming)),
        None => expression_table()
            .get(name)
            .map(|kind| (*kind, StateSource::Current)),
    }
}

/// Resolve an action name
pub fn lookup_action(name: &str) -> Option<ActionKind> {
    action_table().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_entry_resolves() {
        for (name, kind) in EXPRESSIONS {
            assert_eq!(lookup_expression(name), Some((*kind, StateSource::Current)));
        }
        for (name, kind) in ACTIONS {
            assert_eq!(lookup_action(name), Some(*kind));
        }
    }

    #[test]
    fn test_incoming_state_prefix_only_for_state_readers() {
        assert_eq!(
            lookup_expression("incomingState:hasParticipantFlagKey"),
            Some((ExpressionKind::HasParticipantFlagKey, StateSource::Incoming))
        );
        assert_eq!(lookup_expression("incomingState:eq"), None);
        assert_eq!(lookup_expression("incomingState:"), None);
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(lookup_expression("checkEventTyp"), None);
        assert_eq!(lookup_action("if"), None);
        assert_eq!(lookup_action("checkEventType"), None);
    }

    #[test]
    fn test_names_are_unique() {
        assert_eq!(expression_table().len(), EXPRESSIONS.len());
        assert_eq!(action_table().len(), ACTIONS.len());
    }
}
