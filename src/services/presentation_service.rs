use rand::seq::SliceRandom;
use rand::Rng;

use crate::dto::respond_dto::{PresentedAlternative, PresentedQuestion};
use crate::models::question::QuestionWithAlternatives;

pub struct PresentationService;

impl PresentationService {
    /// Shuffles questions and each question's alternatives independently and
    /// drops the correctness flags. Nothing about the order is stored.
    pub fn present(questions: Vec<QuestionWithAlternatives>) -> Vec<PresentedQuestion> {
        let mut rng = rand::thread_rng();
        Self::present_with(questions, &mut rng)
    }

    pub fn present_with<R: Rng + ?Sized>(
        questions: Vec<QuestionWithAlternatives>,
        rng: &mut R,
    ) -> Vec<PresentedQuestion> {
        let mut presented: Vec<PresentedQuestion> = questions
            .into_iter()
            .map(|q| {
                let mut alternatives: Vec<PresentedAlternative> = q
                    .alternatives
                    .into_iter()
                    .map(|a| PresentedAlternative { id: a.id, text: a.body })
                    .collect();
                alternatives.shuffle(rng);
                PresentedQuestion {
                    id: q.question.id,
                    kind: q.question.kind,
                    prompt: q.question.prompt,
                    weight: q.question.weight,
                    alternatives,
                }
            })
            .collect();
        presented.shuffle(rng);
        presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{Alternative, Question, QuestionKind};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn tree(n: usize) -> Vec<QuestionWithAlternatives> {
        (0..n)
            .map(|i| {
                let id = Uuid::new_v4();
                QuestionWithAlternatives {
                    question: Question {
                        id,
                        questionnaire_id: Uuid::nil(),
                        kind: QuestionKind::MultipleChoice,
                        prompt: format!("q{}", i),
                        position: i as i32,
                        weight: "1".parse().unwrap(),
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                    alternatives: (0..4)
                        .map(|j| Alternative {
                            id: Uuid::new_v4(),
                            question_id: id,
                            body: format!("q{}a{}", i, j),
                            is_correct: j == 0,
                            position: j,
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    #[test]
    fn keeps_every_question_and_alternative() {
        let source = tree(10);
        let mut rng = StdRng::seed_from_u64(7);
        let presented = PresentationService::present_with(source.clone(), &mut rng);

        let expected: BTreeSet<_> = source.iter().map(|q| q.question.id).collect();
        let actual: BTreeSet<_> = presented.iter().map(|q| q.id).collect();
        assert_eq!(expected, actual);

        for q in &presented {
            let original = source.iter().find(|s| s.question.id == q.id).unwrap();
            let expected: BTreeSet<_> = original.alternatives.iter().map(|a| a.id).collect();
            let actual: BTreeSet<_> = q.alternatives.iter().map(|a| a.id).collect();
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn output_carries_no_correctness_flag() {
        let presented = PresentationService::present(tree(3));
        let json = serde_json::to_value(&presented).unwrap();
        let text = json.to_string();
        assert!(!text.contains("is_correct"));
    }

    #[test]
    fn order_varies_between_draws() {
        let source = tree(12);
        let mut rng = StdRng::seed_from_u64(42);
        let first: Vec<_> = PresentationService::present_with(source.clone(), &mut rng)
            .into_iter()
            .map(|q| q.id)
            .collect();
        let second: Vec<_> = PresentationService::present_with(source, &mut rng)
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_ne!(first, second);
    }
}
