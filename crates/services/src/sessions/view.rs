use edu_core::model::{Question, QuestionId, QuizOutcome, QuizScore};

use super::service::QuizSession;

/// Marker for one entry of the question strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionMarker {
    Current,
    Answered,
    Unanswered,
}

/// What a quiz screen needs to draw the current question.
///
/// The session itself allows moving on with unanswered questions; the
/// screen gates `Next` and `Submit` on the current question being answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizView {
    pub title: String,
    pub question: Question,
    /// Zero-based.
    pub index: usize,
    pub total: usize,
    pub selected: Option<String>,
    pub markers: Vec<QuestionMarker>,
    pub time_remaining_secs: u32,
    pub answered_count: usize,
}

impl QuizView {
    #[must_use]
    pub fn from_session(session: &QuizSession) -> Self {
        let current = session.current_index();
        let question = session.current_question().clone();
        let markers = session
            .quiz()
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| marker(i, current, session.answer_for(&q.id).is_some()))
            .collect();
        Self {
            title: session.quiz().title.clone(),
            selected: session.answer_for(&question.id).map(str::to_owned),
            question,
            index: current,
            total: session.quiz().questions.len(),
            markers,
            time_remaining_secs: session.time_remaining_secs(),
            answered_count: session.answers().len(),
        }
    }

    #[must_use]
    pub fn question_id(&self) -> &QuestionId {
        &self.question.id
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        !self.is_last() && self.selected.is_some()
    }

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.is_last() && self.selected.is_some()
    }

    /// Whole-number percentage of the quiz walked through so far.
    #[must_use]
    pub fn position_percent(&self) -> u8 {
        let pct = (self.index + 1) * 100 / self.total.max(1);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    #[must_use]
    pub fn countdown(&self) -> String {
        format_countdown(self.time_remaining_secs)
    }
}

fn marker(index: usize, current: usize, answered: bool) -> QuestionMarker {
    if index == current {
        QuestionMarker::Current
    } else if answered {
        QuestionMarker::Answered
    } else {
        QuestionMarker::Unanswered
    }
}

/// `m:ss`, minutes unpadded.
#[must_use]
pub fn format_countdown(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Summary shown once a quiz is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultView {
    pub score: QuizScore,
    pub xp_gain: u32,
    pub outcome: QuizOutcome,
}

impl ResultView {
    #[must_use]
    pub fn new(score: QuizScore) -> Self {
        Self {
            score,
            xp_gain: score.xp_gain(),
            outcome: score.outcome(),
        }
    }

    #[must_use]
    pub fn headline(&self) -> &'static str {
        match self.outcome {
            QuizOutcome::Pass => "Great Job!",
            QuizOutcome::Retry => "Keep Trying!",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::time::fixed_now;
    use edu_core::model::UserId;
    use std::sync::Arc;
    use storage::demo;

    fn session() -> QuizSession {
        let quiz = Arc::new(demo::quizzes().remove(0));
        QuizSession::new(quiz, UserId::new("user1"), fixed_now()).unwrap()
    }

    #[test]
    fn next_requires_an_answer_on_screen() {
        let mut session = session();
        let view = QuizView::from_session(&session);
        assert!(!view.can_go_previous());
        assert!(!view.can_go_next());
        assert!(!view.can_submit());

        session.answer(&QuestionId::new("q1"), "3").unwrap();
        let view = QuizView::from_session(&session);
        assert!(view.can_go_next());
        assert!(!view.can_submit());
        assert_eq!(view.selected.as_deref(), Some("3"));
    }

    #[test]
    fn submit_is_offered_on_the_answered_last_question() {
        let mut session = session();
        session.next().unwrap();
        let view = QuizView::from_session(&session);
        assert!(view.is_last());
        assert!(view.can_go_previous());
        assert!(!view.can_submit());
        assert_eq!(
            view.markers,
            vec![QuestionMarker::Unanswered, QuestionMarker::Current]
        );

        session.answer(&QuestionId::new("q2"), "5x").unwrap();
        let view = QuizView::from_session(&session);
        assert!(view.can_submit());
        assert!(!view.can_go_next());
        assert_eq!(view.position_percent(), 100);
    }

    #[test]
    fn countdown_formats_minutes_and_padded_seconds() {
        assert_eq!(format_countdown(600), "10:00");
        assert_eq!(format_countdown(65), "1:05");
        assert_eq!(format_countdown(9), "0:09");
        assert_eq!(format_countdown(0), "0:00");
    }

    #[test]
    fn result_headline_follows_pass_threshold() {
        assert_eq!(ResultView::new(QuizScore::new(70)).headline(), "Great Job!");
        assert_eq!(ResultView::new(QuizScore::new(69)).headline(), "Keep Trying!");
        assert_eq!(ResultView::new(QuizScore::PERFECT).xp_gain, 200);
    }
}
