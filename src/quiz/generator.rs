//! Question generation
//!
//! The engine never talks to a language model itself. Hosts plug one in
//! through [`QuestionGenerator`]; when none is configured, or the call fails,
//! the session falls back to a small embedded question set so the quiz is
//! never empty.

use super::validate_questions;
use crate::error::ProctorError;
use crate::types::{QuestionSource, QuizQuestion};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Number of questions a session asks by default
pub const DEFAULT_QUESTION_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// What to ask the generator for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub topic: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub count: usize,
}

impl Default for QuestionRequest {
    fn default() -> Self {
        Self {
            topic: "general knowledge".to_string(),
            difficulty: Difficulty::default(),
            count: DEFAULT_QUESTION_COUNT,
        }
    }
}

/// Source of quiz questions (an LLM client, a question bank, ...)
pub trait QuestionGenerator: Send + Sync {
    /// Produce up to `request.count` questions
    fn generate(&self, request: &QuestionRequest) -> Result<Vec<QuizQuestion>, ProctorError>;
}

/// Questions plus where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSet {
    pub questions: Vec<QuizQuestion>,
    pub source: QuestionSource,
}

impl QuestionSet {
    pub fn fallback() -> Self {
        Self {
            questions: fallback_questions(),
            source: QuestionSource::Fallback,
        }
    }
}

/// Ask `generator` for questions, falling back to the embedded set when it is
/// absent, fails, or returns nothing usable.
pub fn load_questions(
    generator: Option<&dyn QuestionGenerator>,
    request: &QuestionRequest,
) -> QuestionSet {
    let Some(generator) = generator else {
        info!("no question generator configured, using fallback questions");
        return QuestionSet::fallback();
    };

    match generator.generate(request) {
        Ok(mut questions) => {
            questions.truncate(request.count);
            if questions.is_empty() {
                warn!(topic = %request.topic, "generator returned no questions, using fallback");
                return QuestionSet::fallback();
            }
            if let Err(e) = validate_questions(&questions) {
                warn!(error = %e, "generated questions failed validation, using fallback");
                return QuestionSet::fallback();
            }
            info!(count = questions.len(), topic = %request.topic, "loaded generated questions");
            QuestionSet {
                questions,
                source: QuestionSource::Generated,
            }
        }
        Err(e) => {
            warn!(
                error = %e,
                transient = e.is_transient(),
                "question generation failed, using fallback"
            );
            QuestionSet::fallback()
        }
    }
}

/// Embedded general-knowledge questions
pub fn fallback_questions() -> Vec<QuizQuestion> {
    const BANK: [(&str, [&str; 4], usize); 5] = [
        (
            "What is the capital of Japan?",
            ["Seoul", "Tokyo", "Beijing", "Bangkok"],
            1,
        ),
        (
            "Which gas do plants primarily absorb from the atmosphere?",
            ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
            2,
        ),
        (
            "How many continents are there on Earth?",
            ["Five", "Six", "Seven", "Eight"],
            2,
        ),
        (
            "Who wrote the play Romeo and Juliet?",
            ["William Shakespeare", "Charles Dickens", "Jane Austen", "Mark Twain"],
            0,
        ),
        (
            "What is the largest planet in the solar system?",
            ["Saturn", "Earth", "Neptune", "Jupiter"],
            3,
        ),
    ];

    BANK.iter()
        .enumerate()
        .map(|(i, (prompt, options, correct_index))| QuizQuestion {
            id: format!("q{}", i + 1),
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_index: *correct_index,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<QuizQuestion>, ProctorError>);

    impl QuestionGenerator for Fixed {
        fn generate(&self, _request: &QuestionRequest) -> Result<Vec<QuizQuestion>, ProctorError> {
            match &self.0 {
                Ok(questions) => Ok(questions.clone()),
                Err(e) => Err(ProctorError::ProviderUnavailable(e.to_string())),
            }
        }
    }

    #[test]
    fn test_fallback_set_is_valid() {
        let questions = fallback_questions();
        assert_eq!(questions.len(), DEFAULT_QUESTION_COUNT);
        validate_questions(&questions).unwrap();
    }

    #[test]
    fn test_no_generator_uses_fallback() {
        let set = load_questions(None, &QuestionRequest::default());
        assert_eq!(set.source, QuestionSource::Fallback);
        assert_eq!(set.questions.len(), 5);
    }

    #[test]
    fn test_failing_generator_uses_fallback() {
        let generator = Fixed(Err(ProctorError::ProviderUnavailable("timeout".into())));
        let set = load_questions(Some(&generator), &QuestionRequest::default());
        assert_eq!(set.source, QuestionSource::Fallback);
    }

    #[test]
    fn test_invalid_generated_questions_use_fallback() {
        let mut questions = fallback_questions();
        questions[0].options.truncate(2);
        let generator = Fixed(Ok(questions));
        let set = load_questions(Some(&generator), &QuestionRequest::default());
        assert_eq!(set.source, QuestionSource::Fallback);
    }

    #[test]
    fn test_generated_questions_truncated_to_count() {
        let generator = Fixed(Ok(fallback_questions()));
        let request = QuestionRequest {
            count: 3,
            ..QuestionRequest::default()
        };
        let set = load_questions(Some(&generator), &request);
        assert_eq!(set.source, QuestionSource::Generated);
        assert_eq!(set.questions.len(), 3);
    }
}
