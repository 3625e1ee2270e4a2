use crate::types::{Question, QuestionWithIndex, Quiz};

/// Sequential walk over a quiz's question list. The cursor owns a
/// snapshot of the questions; edits to the quiz bank never reach a game
/// in progress.
#[derive(Debug)]
pub struct QuestionCursor {
    questions: Vec<Question>,
    /// Index of the question `advance` hands out next.
    next: usize,
    /// Set once an `advance` call has run past the end.
    finished: bool,
}

impl QuestionCursor {
    pub fn new(quiz: &Quiz) -> Self {
        Self {
            questions: quiz.questions.clone(),
            next: 0,
            finished: false,
        }
    }

    /// Move to the next question and return it with its position, or
    /// `None` once the quiz is exhausted.
    pub fn advance(&mut self) -> Option<QuestionWithIndex> {
        match self.questions.get(self.next) {
            Some(question) => {
                let question = question.clone();
                let index = self.next;
                self.next += 1;
                Some(QuestionWithIndex { question, index })
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// The question most recently handed out. `None` before the first
    /// `advance` and once the walk has finished.
    pub fn current(&self) -> Option<QuestionWithIndex> {
        if self.next == 0 || self.finished {
            return None;
        }
        let index = self.next - 1;
        Some(QuestionWithIndex {
            question: self.questions[index].clone(),
            index,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether another question remains after the current one.
    pub fn has_next(&self) -> bool {
        self.next < self.questions.len()
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, QuestionType};

    fn quiz(n: usize) -> Quiz {
        Quiz {
            id: "quiz".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            duration: 20,
            questions: (0..n)
                .map(|i| Question {
                    id: format!("q{i}"),
                    question_type: QuestionType::Qcm,
                    text: format!("question {i}"),
                    points: 10,
                    choices: vec![
                        Choice {
                            text: "a".to_string(),
                            is_correct: true,
                        },
                        Choice {
                            text: "b".to_string(),
                            is_correct: false,
                        },
                    ],
                    last_modification: None,
                })
                .collect(),
            hidden: false,
            last_modification: None,
        }
    }

    #[test]
    fn test_walks_questions_in_order() {
        let mut cursor = QuestionCursor::new(&quiz(3));
        for expected in 0..3 {
            let q = cursor.advance().unwrap();
            assert_eq!(q.index, expected);
            assert_eq!(q.question.text, format!("question {expected}"));
            assert_eq!(cursor.current().unwrap().index, expected);
        }
        assert!(!cursor.has_next());
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn test_last_question_stays_current_until_exhausted() {
        let mut cursor = QuestionCursor::new(&quiz(2));
        cursor.advance();
        cursor.advance();
        // The second question is still the active one.
        assert_eq!(cursor.current().unwrap().index, 1);
        assert!(!cursor.is_finished());

        assert!(cursor.advance().is_none());
        assert!(cursor.current().is_none());
        assert!(cursor.is_finished());
    }

    #[test]
    fn test_current_is_none_before_first_advance() {
        let cursor = QuestionCursor::new(&quiz(2));
        assert!(cursor.current().is_none());
        assert!(!cursor.is_finished());
        assert!(cursor.has_next());
        assert_eq!(cursor.total(), 2);
    }
}
