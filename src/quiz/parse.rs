//! Question parsing
//!
//! Generators hand back either structured JSON or free text in the usual
//! numbered multiple-choice layout:
//!
//! ```text
//! 1. What is the capital of France?
//! A) Berlin
//! B) Paris
//! C) Rome
//! D) Madrid
//! Answer: B
//! ```
//!
//! Blocks that do not produce a complete question (a prompt, four options and
//! an answer letter) are skipped.

use super::OPTIONS_PER_QUESTION;
use crate::error::ProctorError;
use crate::types::QuizQuestion;
use serde::Deserialize;
use tracing::debug;

/// Parse either layout, trying JSON first
pub fn parse_questions(input: &str) -> Result<Vec<QuizQuestion>, ProctorError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        parse_questions_json(input)
    } else {
        parse_questions_text(input)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionDocument {
    List(Vec<RawQuestion>),
    Wrapped { questions: Vec<RawQuestion> },
}

#[derive(Deserialize)]
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "question")]
    prompt: String,
    options: Vec<String>,
    #[serde(alias = "answer_index")]
    correct_index: usize,
}

/// Parse a JSON array of questions, or an object with a `questions` array.
/// Missing ids are assigned `q1`, `q2`, ...
pub fn parse_questions_json(input: &str) -> Result<Vec<QuizQuestion>, ProctorError> {
    let document: QuestionDocument = serde_json::from_str(input)?;
    let raw = match document {
        QuestionDocument::List(list) => list,
        QuestionDocument::Wrapped { questions } => questions,
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, q)| QuizQuestion {
            id: q.id.unwrap_or_else(|| format!("q{}", i + 1)),
            prompt: q.prompt,
            options: q.options,
            correct_index: q.correct_index,
        })
        .collect())
}

#[derive(Default)]
struct Draft {
    prompt: Option<String>,
    options: Vec<String>,
    answer: Option<usize>,
}

impl Draft {
    fn finish(self, questions: &mut Vec<QuizQuestion>) {
        match (self.prompt, self.answer) {
            (Some(prompt), Some(correct_index)) if self.options.len() == OPTIONS_PER_QUESTION => {
                questions.push(QuizQuestion {
                    id: format!("q{}", questions.len() + 1),
                    prompt,
                    options: self.options,
                    correct_index,
                });
            }
            (prompt, answer) => {
                debug!(
                    has_prompt = prompt.is_some(),
                    options = self.options.len(),
                    has_answer = answer.is_some(),
                    "skipping incomplete question block"
                );
            }
        }
    }
}

/// Parse numbered free-text questions
pub fn parse_questions_text(input: &str) -> Result<Vec<QuizQuestion>, ProctorError> {
    let mut questions = Vec::new();
    let mut draft = Draft::default();

    for raw_line in input.lines() {
        let line = clean_line(raw_line);
        if line.is_empty() {
            continue;
        }

        if let Some(letter) = answer_letter(line) {
            draft.answer = Some(letter);
        } else if let Some(option) = option_text(line) {
            if draft.prompt.is_some() {
                draft.options.push(option.to_string());
            }
        } else if let Some(prompt) = question_prompt(line) {
            std::mem::take(&mut draft).finish(&mut questions);
            draft.prompt = Some(prompt.to_string());
        } else if let Some(prompt) = draft.prompt.as_mut() {
            // Prompt wrapped onto a second line
            if draft.options.is_empty() {
                prompt.push(' ');
                prompt.push_str(line);
            }
        }
    }
    draft.finish(&mut questions);

    if questions.is_empty() {
        return Err(ProctorError::ParseError(
            "no complete questions found in text".to_string(),
        ));
    }
    Ok(questions)
}

fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_start_matches('#')
        .trim_matches('*')
        .trim()
}

fn letter_index(c: char) -> Option<usize> {
    match c.to_ascii_uppercase() {
        'A' => Some(0),
        'B' => Some(1),
        'C' => Some(2),
        'D' => Some(3),
        _ => None,
    }
}

/// `Answer: B`, `Correct answer: (c) ...`, `Correct option - D`
fn answer_letter(line: &str) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    let rest_start = ["correct answer", "correct option", "answer"]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| prefix.len())?;

    let rest = line[rest_start..].trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
    let rest = rest.trim_start_matches('(');
    let mut chars = rest.chars();
    let letter = letter_index(chars.next()?)?;
    match chars.next() {
        None => Some(letter),
        Some(c) if !c.is_alphanumeric() => Some(letter),
        _ => None,
    }
}

/// `A) text`, `b. text`, `(C) text`, `D: text`
fn option_text(line: &str) -> Option<&str> {
    let body = line.strip_prefix('(').unwrap_or(line);
    let mut chars = body.char_indices();
    let (_, letter) = chars.next()?;
    letter_index(letter)?;
    let (sep_at, sep) = chars.next()?;
    if !matches!(sep, ')' | '.' | ':') {
        return None;
    }
    let text = body[sep_at + sep.len_utf8()..].trim();
    (!text.is_empty()).then_some(text)
}

/// `1. prompt`, `2) prompt`, `Q3: prompt`, `Question 4. prompt`
fn question_prompt(line: &str) -> Option<&str> {
    let lower = line.to_ascii_lowercase();
    let body = if lower.starts_with("question") {
        &line["question".len()..]
    } else if lower.starts_with('q') && line[1..].starts_with(|c: char| c.is_ascii_digit()) {
        &line[1..]
    } else {
        line
    };
    let body = body.trim_start();

    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &body[digits..];
    let rest = rest.strip_prefix(|c: char| matches!(c, '.' | ')' | ':'))?;
    let prompt = rest.trim_matches(|c: char| c == '*' || c.is_whitespace());
    (!prompt.is_empty()).then_some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEXT: &str = "\
Here are your questions:

1. What is the capital of France?
A) Berlin
B) Paris
C) Rome
D) Madrid
Answer: B

**Question 2:** Which planet is known as the Red Planet?
a. Venus
b. Mars
c. Jupiter
d. Saturn
Correct answer: (b) Mars

3. Incomplete question
A) one
B) two
Answer: A
";

    #[test]
    fn test_parse_text_layout() {
        let questions = parse_questions_text(TEXT).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "q1");
        assert_eq!(questions[0].prompt, "What is the capital of France?");
        assert_eq!(questions[0].options[1], "Paris");
        assert_eq!(questions[0].correct_index, 1);
        assert_eq!(questions[1].id, "q2");
        assert_eq!(questions[1].prompt, "Which planet is known as the Red Planet?");
        assert_eq!(questions[1].correct_index, 1);
    }

    #[test]
    fn test_parse_text_without_questions_fails() {
        assert!(matches!(
            parse_questions_text("sorry, I cannot help with that"),
            Err(ProctorError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_json_list_and_wrapped() {
        let list = r#"[{"question":"2+2?","options":["1","2","3","4"],"correct_index":3}]"#;
        let parsed = parse_questions(list).unwrap();
        assert_eq!(parsed[0].id, "q1");
        assert_eq!(parsed[0].prompt, "2+2?");

        let wrapped = r#"{"questions":[{"id":"math-1","prompt":"3+3?","options":["6","5","4","3"],"answer_index":0}]}"#;
        let parsed = parse_questions(wrapped).unwrap();
        assert_eq!(parsed[0].id, "math-1");
        assert_eq!(parsed[0].correct_index, 0);
    }

    #[test]
    fn test_line_classifiers() {
        assert_eq!(answer_letter("Answer: c"), Some(2));
        assert_eq!(answer_letter("Answer - D) Madrid"), Some(3));
        assert_eq!(answer_letter("Answers vary"), None);
        assert_eq!(option_text("(A) first"), Some("first"));
        assert_eq!(option_text("Earth is round."), None);
        assert_eq!(question_prompt("Q4: Who wrote Hamlet?"), Some("Who wrote Hamlet?"));
        assert_eq!(question_prompt("2024 was a leap year"), None);
    }
}
