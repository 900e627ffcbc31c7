use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Experimental arm controlling how the grid evolves after a pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVariant {
    /// Group A: reshuffles the retained pool, never fetches related titles
    Static,
    /// Group B: re-samples around the genres of each pick
    Adaptive,
}

impl PolicyVariant {
    /// Research group label recorded with every event
    pub fn group(&self) -> &'static str {
        match self {
            PolicyVariant::Static => "A",
            PolicyVariant::Adaptive => "B",
        }
    }
}

impl Display for PolicyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyVariant::Static => write!(f, "static"),
            PolicyVariant::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Lifecycle of a selection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initializing,
    Ready,
    /// Final pick made, waiting out the hand-off delay
    Submitting,
    Completed,
}

/// The person taking part in the study
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Student id, used as the participant key in the results sheet
    pub participant_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Written as `init` to keep the results sheet's existing rows consistent
    #[serde(rename = "init")]
    SessionStart,
    Select,
    Deselect,
    Refresh,
    Completed,
    Survey,
}

/// Largest helpfulness rating
pub const HELPFULNESS_SCALE: u8 = 10;

/// Largest answer on the other Likert questions
pub const LIKERT_SCALE: u8 = 5;

/// Post-task questionnaire: helpfulness on 1-10, the rest on 1-5
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurveyResponse {
    pub helpfulness: u8,
    pub satisfaction: u8,
    pub ease: u8,
    pub personalization: u8,
    pub trust: u8,
    pub reuse: u8,
    #[serde(default)]
    pub open_feedback: String,
}

impl SurveyResponse {
    pub fn validate(&self) -> Result<(), String> {
        let answers = [
            ("helpfulness", self.helpfulness, HELPFULNESS_SCALE),
            ("satisfaction", self.satisfaction, LIKERT_SCALE),
            ("ease", self.ease, LIKERT_SCALE),
            ("personalization", self.personalization, LIKERT_SCALE),
            ("trust", self.trust, LIKERT_SCALE),
            ("reuse", self.reuse, LIKERT_SCALE),
        ];

        for (question, answer, max) in answers {
            if !(1..=max).contains(&answer) {
                return Err(format!(
                    "{} must be between 1 and {}, got {}",
                    question, max, answer
                ));
            }
        }

        Ok(())
    }
}

/// One row of the results sheet
///
/// Every column is always present so the sheet keeps a stable shape; columns
/// that do not apply to an event are left empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub participant_id: String,
    pub name: String,
    pub group: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub movie_id: String,
    pub genre: String,
    pub survey_helpfulness: String,
    pub survey_satisfaction: String,
    pub survey_ease: String,
    pub survey_personalization: String,
    pub survey_trust: String,
    pub survey_reuse: String,
    pub survey_open_feedback: String,
}

impl EventRecord {
    pub fn new(participant: &Participant, policy: PolicyVariant, event_type: EventKind) -> Self {
        Self {
            participant_id: participant.participant_id.clone(),
            name: participant.name.clone(),
            group: policy.group().to_string(),
            timestamp: Utc::now(),
            event_type,
            movie_id: String::new(),
            genre: String::new(),
            survey_helpfulness: String::new(),
            survey_satisfaction: String::new(),
            survey_ease: String::new(),
            survey_personalization: String::new(),
            survey_trust: String::new(),
            survey_reuse: String::new(),
            survey_open_feedback: String::new(),
        }
    }

    pub fn with_movie(mut self, movie_id: u64, genre: &str) -> Self {
        self.movie_id = movie_id.to_string();
        self.genre = genre.to_string();
        self
    }

    pub fn with_survey(mut self, survey: &SurveyResponse) -> Self {
        self.survey_helpfulness = survey.helpfulness.to_string();
        self.survey_satisfaction = survey.satisfaction.to_string();
        self.survey_ease = survey.ease.to_string();
        self.survey_personalization = survey.personalization.to_string();
        self.survey_trust = survey.trust.to_string();
        self.survey_reuse = survey.reuse.to_string();
        self.survey_open_feedback = survey.open_feedback.clone();
        self
    }
}
