//! Study domain records: participants, events, reports and study-level data

pub mod event;
pub mod participant;
pub mod records;
pub mod report;

pub use event::{ResponseItem, StudyEvent, StudyEventType, SurveyItemResponse, SurveyResponse};
pub use participant::{study_status, AssignedSurvey, Participant, ParticipantMessage};
pub use records::{StudyMessage, StudyVariable, StudyVariableType};
pub use report::{Report, ReportData};
