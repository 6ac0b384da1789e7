use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::grading::model::SubmissionId;
use crate::schemas::submission::SubmissionSummary;

/// Picks the submission a free-text query most likely refers to.
pub trait SubmissionSearch: Send + Sync {
    fn best_match(&self, query: &str, candidates: &[SubmissionSummary]) -> Option<SubmissionId>;
}

#[derive(Default)]
pub struct FuzzySubmissionSearch {
    matcher: SkimMatcherV2,
}

impl FuzzySubmissionSearch {
    pub fn new() -> Self {
        Self::default()
    }

    fn score(&self, candidate: &SubmissionSummary, query: &str) -> Option<i64> {
        let exact = candidate.id.to_string() == query
            || candidate.student_id.is_some_and(|student| student.to_string() == query);
        if exact {
            return Some(i64::MAX);
        }

        let mut fields = vec![candidate.id.to_string()];
        fields.extend(candidate.student_id.map(|student| student.to_string()));
        fields.extend(candidate.student_name.clone());

        fields.iter().filter_map(|text| fuzzy_match_score(&self.matcher, text, query)).max()
    }
}

impl SubmissionSearch for FuzzySubmissionSearch {
    fn best_match(&self, query: &str, candidates: &[SubmissionSummary]) -> Option<SubmissionId> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        candidates
            .iter()
            .filter_map(|candidate| self.score(candidate, query).map(|score| (score, candidate.id)))
            // Earliest submission wins a tie.
            .max_by(|(left, left_id), (right, right_id)| left.cmp(right).then(right_id.cmp(left_id)))
            .map(|(_, id)| id)
    }
}

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_lowercase(), &query.to_lowercase()))
}
