//! C7: PhraseSelector (spec §4.7). Classifies a LEGO's basket of practice
//! phrases into component/build/eternal pools and picks debut and eternal
//! phrases for the Round and ongoing review.

use std::collections::HashSet;

use rand::Rng;

use crate::config::LegoIntroductionConfig;
use crate::error::SchedulerError;
use crate::model::{
    ClassifiedBasket, LegoPair, PhraseClassification, PhraseId, PhraseRole, PracticePhrase,
};
use crate::rng::shuffle;

/// Characters the LEGO actually contributes, stripped of whitespace and
/// punctuation so a phrase is matched on the content it teaches rather than
/// on a curated `contains_lego_ids` list that may be stale or absent.
fn lego_chars(lego: &LegoPair) -> HashSet<char> {
    lego.pair
        .target_text
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
        .collect()
}

fn phrase_covers_lego(phrase: &PracticePhrase, chars: &HashSet<char>) -> bool {
    if chars.is_empty() {
        return false;
    }
    let phrase_chars: HashSet<char> = phrase.pair.target_text.chars().collect();
    chars.iter().all(|c| phrase_chars.contains(c))
}

/// Synthesizes a debut phrase straight from the LEGO itself when no practice
/// phrase in the course covers it, so a LEGO with a thin phrase bank still
/// gets introduced rather than failing the whole basket.
fn synthesize_debut(lego: &LegoPair) -> PracticePhrase {
    PracticePhrase {
        id: format!("{}-debut-synthesized", lego.id),
        classification: PhraseClassification::Role(PhraseRole::Build),
        pair: lego.pair.clone(),
        audio: lego.audio.clone(),
        word_count: lego.pair.target_text.split_whitespace().count().max(1) as u32,
        contains_lego_ids: vec![lego.id.clone()],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EternalSelectionMode {
    RandomUrn,
    Sequential,
    MaxDistance,
}

pub struct PhraseSelector;

impl PhraseSelector {
    /// Splits a LEGO's raw phrase set into components/build/eternal pools.
    /// A phrase is kept only if its target text actually contains every
    /// character the LEGO contributes, rather than trusting a curated
    /// `contains_lego_ids` list; the two non-component pools are then sorted
    /// ascending by target character length so selection can walk them by
    /// difficulty.
    pub fn classify_basket(
        lego: &LegoPair,
        phrases: Vec<PracticePhrase>,
        config: &LegoIntroductionConfig,
    ) -> Result<ClassifiedBasket, SchedulerError> {
        let chars = lego_chars(lego);
        let mut components = Vec::new();
        let mut build_pool = Vec::new();
        let mut eternal_pool = Vec::new();

        for phrase in phrases {
            if !phrase_covers_lego(&phrase, &chars) {
                continue;
            }
            match phrase.role() {
                PhraseRole::Component => components.push(phrase),
                PhraseRole::Build => build_pool.push(phrase),
                PhraseRole::Use => eternal_pool.push(phrase),
            }
        }

        let by_length = |p: &PracticePhrase| p.pair.target_text.chars().count();
        build_pool.sort_by_key(by_length);
        eternal_pool.sort_by_key(by_length);

        let debut = build_pool
            .first()
            .or(eternal_pool.first())
            .cloned()
            .unwrap_or_else(|| synthesize_debut(lego));

        let debut_phrases = build_pool
            .iter()
            .take(config.max_build_phrases as usize)
            .cloned()
            .collect();

        Ok(ClassifiedBasket {
            lego_id: lego.id.clone(),
            components,
            debut,
            debut_phrases,
            build_pool,
            eternal_pool,
            introduction_audio: Some(lego.audio.known.clone()),
        })
    }

    pub fn select_debut_phrase(basket: &ClassifiedBasket) -> PracticePhrase {
        basket.debut.clone()
    }

    /// Picks the next phrase for ongoing ("eternal") review, updating
    /// `eternal_urn`/`last_eternal_phrase_id` on the passed-in progress.
    pub fn select_eternal_phrase(
        basket: &ClassifiedBasket,
        eternal_urn: &mut Vec<PhraseId>,
        last_eternal_phrase_id: &mut Option<PhraseId>,
        mode: EternalSelectionMode,
        rng: &mut impl Rng,
    ) -> Option<PracticePhrase> {
        if basket.eternal_pool.is_empty() {
            return None;
        }

        let chosen_id = match mode {
            EternalSelectionMode::RandomUrn => {
                if eternal_urn.is_empty() {
                    let mut ids: Vec<PhraseId> =
                        basket.eternal_pool.iter().map(|p| p.id.clone()).collect();
                    shuffle(&mut ids, rng);
                    *eternal_urn = ids;
                }
                eternal_urn.pop()
            }
            EternalSelectionMode::Sequential => {
                let ids: Vec<&PhraseId> = basket.eternal_pool.iter().map(|p| &p.id).collect();
                let next_index = match last_eternal_phrase_id {
                    Some(last) => ids
                        .iter()
                        .position(|id| *id == last)
                        .map(|i| (i + 1) % ids.len())
                        .unwrap_or(0),
                    None => 0,
                };
                Some(ids[next_index].clone())
            }
            EternalSelectionMode::MaxDistance => {
                let last_len = last_eternal_phrase_id
                    .as_ref()
                    .and_then(|id| basket.eternal_pool.iter().find(|p| &p.id == id))
                    .map(|p| p.pair.target_text.chars().count() as i64);
                basket
                    .eternal_pool
                    .iter()
                    .max_by_key(|p| {
                        let len = p.pair.target_text.chars().count() as i64;
                        match last_len {
                            Some(l) => (len - l).abs(),
                            None => len,
                        }
                    })
                    .map(|p| p.id.clone())
            }
        }?;

        *last_eternal_phrase_id = Some(chosen_id.clone());
        basket.eternal_pool.iter().find(|p| p.id == chosen_id).cloned()
    }
}
