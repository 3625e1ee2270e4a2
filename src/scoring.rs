//! Answer correction and per-question statistics.

use crate::types::{AnswerStats, Question, BONUS_MULTIPLIER};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Outcome of grading one QCM submission.
#[derive(Debug, Clone, PartialEq)]
pub struct QcmVerdict {
    pub points: u32,
    pub bonus: bool,
    pub message: String,
}

/// Grades a QCM submission against the loaded question: full points for
/// an exact match with the correct-choice set, zero otherwise. Who
/// deserves the first-correct bonus is the caller's call; the corrector
/// only applies it.
pub struct QcmCorrector {
    correct: HashSet<usize>,
    points: u32,
}

impl QcmCorrector {
    pub fn new(question: &Question) -> Self {
        Self {
            correct: question.correct_choices().into_iter().collect(),
            points: question.points,
        }
    }

    /// Exact-set comparison; a strict subset or superset scores nothing.
    pub fn is_exact(&self, submitted: &[usize]) -> bool {
        let submitted: HashSet<usize> = submitted.iter().copied().collect();
        submitted == self.correct
    }

    pub fn grade(&self, submitted: &[usize], first_correct: bool) -> QcmVerdict {
        if !self.is_exact(submitted) {
            return QcmVerdict {
                points: 0,
                bonus: false,
                message: "You earned 0 points.".to_string(),
            };
        }
        if first_correct {
            let points = (self.points as f64 * BONUS_MULTIPLIER).round() as u32;
            QcmVerdict {
                points,
                bonus: true,
                message: format!(
                    "You earned {} points, including a 20% first-answer bonus!",
                    points
                ),
            }
        } else {
            QcmVerdict {
                points: self.points,
                bonus: false,
                message: format!("You earned {} points.", self.points),
            }
        }
    }
}

/// Manual-correction credit tier for a QRL answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Full,
    Half,
    Zero,
}

impl Grade {
    pub fn factor(self) -> f64 {
        match self {
            Grade::Full => 1.0,
            Grade::Half => 0.5,
            Grade::Zero => 0.0,
        }
    }

    /// Points for this tier on a question worth `points`.
    pub fn apply(self, points: u32) -> u32 {
        (points as f64 * self.factor()).round() as u32
    }
}

/// Per-choice selection counts for a QCM question. A player picking two
/// of four choices increments two counters; the array length always
/// matches the question's actual choice count.
pub fn tally_choices<'a, I>(choice_count: usize, selections: I) -> Vec<u32>
where
    I: Iterator<Item = &'a Vec<usize>>,
{
    let mut counts = vec![0u32; choice_count];
    for selection in selections {
        for &choice in selection {
            if let Some(slot) = counts.get_mut(choice) {
                *slot += 1;
            }
        }
    }
    counts
}

/// Per-grade counts for a QRL question, ordered full / half / zero.
pub fn tally_grades<'a, I>(grades: I) -> Vec<u32>
where
    I: Iterator<Item = &'a Grade>,
{
    let mut counts = vec![0u32; 3];
    for grade in grades {
        let slot = match grade {
            Grade::Full => 0,
            Grade::Half => 1,
            Grade::Zero => 2,
        };
        counts[slot] += 1;
    }
    counts
}

/// Convenience constructor pairing a tally with its question index.
pub fn stats_for(question_index: usize, bar_counts: Vec<u32>) -> AnswerStats {
    AnswerStats {
        question_index,
        bar_counts,
    }
}
