//! Loads the bundled demo course and classifies each LEGO's phrase basket.
//! A real host would load this from its own content store; this crate
//! exists only to drive `helix-core` end to end, so the course is baked in.

use std::collections::HashMap;

use anyhow::{Context, Result};
use helix_core::{ClassifiedBasket, LegoId, LegoKind, LegoPair, PhraseSelector, PracticePhrase, SeedPair};
use serde::Deserialize;

const COURSE_YAML: &str = include_str!("../data/course.yaml");

#[derive(Debug, Deserialize)]
struct RawCourse {
    seeds: Vec<SeedPair>,
    phrases: Vec<PracticePhrase>,
}

pub struct DemoCourse {
    pub seeds: Vec<SeedPair>,
    pub legos: HashMap<LegoId, LegoPair>,
    pub baskets: HashMap<LegoId, ClassifiedBasket>,
}

impl DemoCourse {
    pub fn load(config: &helix_core::config::LegoIntroductionConfig) -> Result<Self> {
        let raw: RawCourse =
            serde_yaml::from_str(COURSE_YAML).context("parsing bundled demo course")?;

        let mut legos = HashMap::new();
        for seed in &raw.seeds {
            for lego in &seed.legos {
                legos.insert(lego.id.clone(), lego.clone());
            }
        }

        let mut baskets = HashMap::new();
        for lego in legos.values() {
            let basket = PhraseSelector::classify_basket(lego, raw.phrases.clone(), config)
                .with_context(|| format!("classifying basket for lego {}", lego.id))?;
            baskets.insert(lego.id.clone(), basket);
        }

        Ok(Self {
            seeds: raw.seeds,
            legos,
            baskets,
        })
    }

    pub fn lego_kind(&self, lego_id: &LegoId) -> LegoKind {
        self.legos.get(lego_id).map(|l| l.kind).unwrap_or(LegoKind::Atomic)
    }
}
