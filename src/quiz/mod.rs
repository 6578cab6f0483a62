//! Quiz engine
//!
//! Holds the session's question set and the candidate's answers, and scores
//! them exactly once. Question text comes from outside (a generator, a file,
//! or the embedded fallback set); this module only validates and scores it.

mod generator;
mod parse;

pub use generator::{
    fallback_questions, load_questions, Difficulty, QuestionGenerator, QuestionRequest,
    QuestionSet,
};
pub use parse::{parse_questions, parse_questions_json, parse_questions_text};

use crate::error::ProctorError;
use crate::types::{QuestionSource, QuizAnswer, QuizQuestion, QuizResult};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Every question offers exactly this many options
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone)]
pub struct QuizEngine {
    questions: Vec<QuizQuestion>,
    source: QuestionSource,
    answers: HashMap<String, Option<usize>>,
    result: Option<QuizResult>,
}

impl QuizEngine {
    /// Create an engine over a validated question set
    pub fn new(questions: Vec<QuizQuestion>, source: QuestionSource) -> Result<Self, ProctorError> {
        validate_questions(&questions)?;
        Ok(Self {
            questions,
            source,
            answers: HashMap::new(),
            result: None,
        })
    }

    pub fn from_set(set: QuestionSet) -> Result<Self, ProctorError> {
        Self::new(set.questions, set.source)
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn source(&self) -> QuestionSource {
        self.source
    }

    /// Scored result, once submitted
    pub fn result(&self) -> Option<QuizResult> {
        self.result
    }

    pub fn is_submitted(&self) -> bool {
        self.result.is_some()
    }

    /// Record (or clear, with `None`) the answer to one question
    pub fn answer(&mut self, question_id: &str, selected: Option<usize>) -> Result<(), ProctorError> {
        if self.is_submitted() {
            return Err(ProctorError::AlreadySubmitted);
        }
        if !self.questions.iter().any(|q| q.id == question_id) {
            return Err(ProctorError::InvalidQuestion(format!(
                "unknown question id `{question_id}`"
            )));
        }
        if let Some(index) = selected {
            if index >= OPTIONS_PER_QUESTION {
                return Err(ProctorError::InvalidQuestion(format!(
                    "option {index} out of range for `{question_id}`"
                )));
            }
        }
        self.answers.insert(question_id.to_string(), selected);
        Ok(())
    }

    /// Answers recorded so far
    pub fn recorded_answers(&self) -> Vec<QuizAnswer> {
        self.questions
            .iter()
            .map(|q| QuizAnswer {
                question_id: q.id.clone(),
                selected_index: self.answers.get(&q.id).copied().flatten(),
            })
            .collect()
    }

    /// Score an explicit answer map. Unanswered questions count as incorrect.
    pub fn submit(&mut self, answers: &HashMap<String, usize>) -> Result<QuizResult, ProctorError> {
        if self.is_submitted() {
            return Err(ProctorError::AlreadySubmitted);
        }

        for id in answers.keys() {
            if !self.questions.iter().any(|q| &q.id == id) {
                warn!(question_id = %id, "ignoring answer to unknown question");
            }
        }

        let correct = self
            .questions
            .iter()
            .filter(|q| answers.get(&q.id) == Some(&q.correct_index))
            .count() as u32;

        let result = QuizResult {
            correct,
            total: self.questions.len() as u32,
        };
        self.result = Some(result);
        Ok(result)
    }

    /// Score the answers recorded through `answer`
    pub fn submit_recorded(&mut self) -> Result<QuizResult, ProctorError> {
        let answers: HashMap<String, usize> = self
            .answers
            .iter()
            .filter_map(|(id, selected)| selected.map(|s| (id.clone(), s)))
            .collect();
        self.submit(&answers)
    }
}

/// Check option counts, answer indices and id uniqueness
pub fn validate_questions(questions: &[QuizQuestion]) -> Result<(), ProctorError> {
    let mut seen = HashSet::new();
    for question in questions {
        if question.id.trim().is_empty() {
            return Err(ProctorError::InvalidQuestion("empty question id".to_string()));
        }
        if !seen.insert(question.id.as_str()) {
            return Err(ProctorError::InvalidQuestion(format!(
                "duplicate question id `{}`",
                question.id
            )));
        }
        if question.options.len() != OPTIONS_PER_QUESTION {
            return Err(ProctorError::InvalidQuestion(format!(
                "`{}` has {} options, expected {}",
                question.id,
                question.options.len(),
                OPTIONS_PER_QUESTION
            )));
        }
        if question.correct_index >= OPTIONS_PER_QUESTION {
            return Err(ProctorError::InvalidQuestion(format!(
                "`{}` has correct_index {}",
                question.id, question.correct_index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, correct_index: usize) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            prompt: format!("Prompt {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index,
        }
    }

    fn five_questions() -> Vec<QuizQuestion> {
        (1..=5).map(|i| question(&format!("q{i}"), i % 4)).collect()
    }

    #[test]
    fn test_two_correct_three_unanswered() {
        let mut engine = QuizEngine::new(five_questions(), QuestionSource::Supplied).unwrap();
        let mut answers = HashMap::new();
        answers.insert("q1".to_string(), 1);
        answers.insert("q2".to_string(), 2);

        let result = engine.submit(&answers).unwrap();
        assert_eq!(result, QuizResult { correct: 2, total: 5 });
    }

    #[test]
    fn test_resubmission_fails() {
        let mut engine = QuizEngine::new(five_questions(), QuestionSource::Supplied).unwrap();
        engine.submit(&HashMap::new()).unwrap();
        assert!(matches!(
            engine.submit(&HashMap::new()),
            Err(ProctorError::AlreadySubmitted)
        ));
        assert!(matches!(
            engine.answer("q1", Some(0)),
            Err(ProctorError::AlreadySubmitted)
        ));
    }

    #[test]
    fn test_recorded_answers_and_changes() {
        let mut engine = QuizEngine::new(five_questions(), QuestionSource::Supplied).unwrap();
        engine.answer("q1", Some(0)).unwrap();
        engine.answer("q1", Some(1)).unwrap();
        engine.answer("q3", Some(3)).unwrap();
        engine.answer("q4", Some(0)).unwrap();
        engine.answer("q4", None).unwrap();

        let recorded = engine.recorded_answers();
        assert_eq!(recorded.len(), 5);
        assert_eq!(recorded[0].selected_index, Some(1));
        assert_eq!(recorded[3].selected_index, None);

        let result = engine.submit_recorded().unwrap();
        assert_eq!(result.correct, 2);
        assert_eq!(engine.result(), Some(result));
    }

    #[test]
    fn test_answer_validation() {
        let mut engine = QuizEngine::new(five_questions(), QuestionSource::Supplied).unwrap();
        assert!(engine.answer("nope", Some(0)).is_err());
        assert!(engine.answer("q1", Some(4)).is_err());
    }

    #[test]
    fn test_unknown_and_out_of_range_answers_are_incorrect() {
        let mut engine = QuizEngine::new(five_questions(), QuestionSource::Supplied).unwrap();
        let mut answers = HashMap::new();
        answers.insert("zzz".to_string(), 0);
        answers.insert("q1".to_string(), 9);
        assert_eq!(engine.submit(&answers).unwrap().correct, 0);
    }

    #[test]
    fn test_question_validation() {
        let mut bad = five_questions();
        bad[2].options.pop();
        assert!(QuizEngine::new(bad, QuestionSource::Supplied).is_err());

        let mut dup = five_questions();
        dup[1].id = "q1".to_string();
        assert!(QuizEngine::new(dup, QuestionSource::Supplied).is_err());

        let mut out_of_range = five_questions();
        out_of_range[0].correct_index = 4;
        assert!(QuizEngine::new(out_of_range, QuestionSource::Supplied).is_err());
    }

    #[test]
    fn test_empty_quiz_scores_zero_of_zero() {
        let mut engine = QuizEngine::new(Vec::new(), QuestionSource::Supplied).unwrap();
        assert_eq!(
            engine.submit_recorded().unwrap(),
            QuizResult { correct: 0, total: 0 }
        );
    }
}
