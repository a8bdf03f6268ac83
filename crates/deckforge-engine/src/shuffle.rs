//! Answer-position randomization for multiple-choice cards.
//!
//! Models lean toward putting the correct answer early; shuffling the
//! options after the combine step removes that positional bias.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use deckforge_utils::types::{Card, CombinedArtifact};

const OPTION_COUNT: usize = 4;
const LETTERS: [char; OPTION_COUNT] = ['A', 'B', 'C', 'D'];

/// Shuffle the options of every well-formed MCQ card in the artifact.
pub fn shuffle_mcq_answers<R: Rng>(artifact: &mut CombinedArtifact, rng: &mut R) {
    for card in &mut artifact.cards {
        shuffle_card(card, rng);
    }
}

/// Shuffle one card's options and remap its correct-answer letter.
///
/// Cards without exactly four options, or with an unrecognized correct
/// letter, are left untouched.
fn shuffle_card<R: Rng>(card: &mut Card, rng: &mut R) {
    let Some(options) = &card.options else {
        return;
    };
    if options.len() != OPTION_COUNT {
        debug!(
            front = %card.front,
            count = options.len(),
            "Skipping shuffle for card without exactly four options"
        );
        return;
    }
    let Some(correct_index) = card
        .correct_answer
        .as_deref()
        .and_then(letter_to_index)
    else {
        debug!(front = %card.front, "Skipping shuffle for card with no recognizable correct letter");
        return;
    };

    let mut indexed: Vec<(usize, String)> = options.iter().cloned().enumerate().collect();
    indexed.shuffle(rng);

    // The pair carrying the original correct index now sits at the new
    // correct position.
    let new_index = indexed
        .iter()
        .position(|(original, _)| *original == correct_index)
        .unwrap_or(correct_index);

    card.options = Some(indexed.into_iter().map(|(_, option)| option).collect());
    card.correct_answer = Some(LETTERS[new_index].to_string());
}

fn letter_to_index(letter: &str) -> Option<usize> {
    let c = letter.trim().chars().next()?.to_ascii_uppercase();
    LETTERS.iter().position(|&l| l == c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mcq_card(options: Vec<&str>, correct: &str) -> Card {
        Card {
            card_type: "mcq".into(),
            tags: Vec::new(),
            front: "Which planet is largest?".into(),
            back: "Jupiter".into(),
            options: Some(options.into_iter().map(String::from).collect()),
            correct_answer: Some(correct.into()),
        }
    }

    #[test]
    fn correct_letter_tracks_shuffled_option() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut card = mcq_card(vec!["Mars", "Venus", "Jupiter", "Mercury"], "C");
            shuffle_card(&mut card, &mut rng);

            let options = card.options.as_ref().unwrap();
            let letter = card.correct_answer.as_deref().unwrap();
            let index = letter_to_index(letter).unwrap();
            assert_eq!(options[index], "Jupiter", "seed {seed}");
        }
    }

    #[test]
    fn shuffle_preserves_option_multiset() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut card = mcq_card(vec!["a", "b", "c", "d"], "A");
        shuffle_card(&mut card, &mut rng);

        let mut options = card.options.unwrap();
        options.sort();
        assert_eq!(options, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn skips_cards_without_four_options() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut card = mcq_card(vec!["true", "false"], "B");
        shuffle_card(&mut card, &mut rng);

        assert_eq!(card.options.as_ref().unwrap(), &["true", "false"]);
        assert_eq!(card.correct_answer.as_deref(), Some("B"));
    }

    #[test]
    fn skips_basic_cards() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut card = Card {
            card_type: "basic".into(),
            tags: Vec::new(),
            front: "f".into(),
            back: "b".into(),
            options: None,
            correct_answer: None,
        };
        shuffle_card(&mut card, &mut rng);
        assert!(card.options.is_none());
    }

    #[test]
    fn letter_parsing_is_case_insensitive() {
        assert_eq!(letter_to_index("a"), Some(0));
        assert_eq!(letter_to_index(" D"), Some(3));
        assert_eq!(letter_to_index("E"), None);
        assert_eq!(letter_to_index(""), None);
    }
}
