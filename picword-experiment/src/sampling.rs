//! Trial sequence construction.

use crate::catalog::StimulusCatalog;
use crate::error::EngineError;
use picword_cache::Atom;
use picword_core::TrialItem;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Every audio file once per repetition.
    Simple,
    /// Every word once per repetition, spread evenly over the talkers.
    Stratified,
}

impl SamplingMode {
    pub fn from_stratified(stratified: bool) -> Self {
        if stratified {
            SamplingMode::Stratified
        } else {
            SamplingMode::Simple
        }
    }
}

pub struct TrialSetBuilder<'a> {
    catalog: &'a StimulusCatalog,
    repetitions: usize,
    mode: SamplingMode,
}

impl<'a> TrialSetBuilder<'a> {
    pub fn new(catalog: &'a StimulusCatalog) -> Self {
        Self {
            catalog,
            repetitions: 1,
            mode: SamplingMode::Simple,
        }
    }

    pub fn repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions.max(1);
        self
    }

    pub fn mode(mut self, mode: SamplingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds the unshuffled trial sequence.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<TrialItem>, EngineError> {
        let words = self.catalog.words();
        let talkers = self.catalog.talkers();
        if words.is_empty() || talkers.is_empty() {
            return Err(EngineError::InsufficientStimuli {
                words: words.len(),
                talkers: talkers.len(),
            });
        }

        let trials = match self.mode {
            SamplingMode::Simple => self.simple(),
            SamplingMode::Stratified => self.stratified(words, talkers, rng),
        };
        info!(
            mode = ?self.mode,
            repetitions = self.repetitions,
            trials = trials.len(),
            "trial set built"
        );
        Ok(trials)
    }

    /// Whole passes over the audio items: `[pass1…][pass2…]…`.
    fn simple(&self) -> Vec<TrialItem> {
        let items = self.catalog.audio_items();
        let mut trials = Vec::with_capacity(items.len() * self.repetitions);
        for _ in 0..self.repetitions {
            trials.extend_from_slice(items);
        }
        trials
    }

    /// Shuffles the words once, repeats that order `repetitions` times, and
    /// deals contiguous slices of `ceil(words × repetitions / talkers)` to
    /// the talkers in order. Trailing talkers get a short or empty slice when
    /// the pool does not divide evenly.
    fn stratified<R: Rng + ?Sized>(
        &self,
        words: &[Atom],
        talkers: &[Atom],
        rng: &mut R,
    ) -> Vec<TrialItem> {
        let mut order = words.to_vec();
        order.shuffle(rng);

        let pool: Vec<&Atom> = (0..self.repetitions).flat_map(|_| order.iter()).collect();
        let slice_len = pool.len().div_ceil(talkers.len());

        talkers
            .iter()
            .zip(pool.chunks(slice_len))
            .flat_map(|(talker, slice)| {
                slice.iter().map(move |word| TrialItem {
                    word: (*word).clone(),
                    talker: talker.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn catalog(words: &[&str], talkers: &[&str]) -> StimulusCatalog {
        let audio = words.iter().flat_map(|w| {
            talkers
                .iter()
                .map(move |t| PathBuf::from(format!("/audio/{w}-{t}.wav")))
        });
        let images = words.iter().map(|w| PathBuf::from(format!("/img/{w}.png")));
        StimulusCatalog::from_paths(audio.collect::<Vec<_>>(), images.collect::<Vec<_>>())
    }

    fn per_talker(trials: &[TrialItem]) -> HashMap<Atom, usize> {
        let mut counts = HashMap::new();
        for item in trials {
            *counts.entry(item.talker.clone()).or_default() += 1;
        }
        counts
    }

    #[test]
    fn simple_mode_repeats_whole_passes_in_key_order() {
        let catalog = catalog(&["cat", "dog"], &["t1", "t2"]);
        let trials = TrialSetBuilder::new(&catalog)
            .repetitions(3)
            .build(&mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(trials.len(), 4 * 3);
        let pass = catalog.audio_items();
        for chunk in trials.chunks(pass.len()) {
            assert_eq!(chunk, pass);
        }
    }

    #[test]
    fn stratified_mode_gives_each_word_once_per_repetition() {
        let words = ["cat", "dog", "bird", "fish", "owl", "cow"];
        let catalog = catalog(&words, &["t1", "t2", "t3"]);
        let trials = TrialSetBuilder::new(&catalog)
            .repetitions(2)
            .mode(SamplingMode::Stratified)
            .build(&mut StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(trials.len(), words.len() * 2);
        let mut word_counts: HashMap<Atom, usize> = HashMap::new();
        for item in &trials {
            *word_counts.entry(item.word.clone()).or_default() += 1;
        }
        assert!(word_counts.values().all(|&n| n == 2));

        let n = (words.len() * 2).div_ceil(3);
        for count in per_talker(&trials).values() {
            assert!(count.abs_diff(n) <= 1, "slice of {count} vs {n}");
        }
    }

    #[test]
    fn stratified_slices_are_contiguous_and_reuse_one_shuffle() {
        let words = ["a", "b", "c", "d", "e"];
        let catalog = catalog(&words, &["t1", "t2"]);
        let trials = TrialSetBuilder::new(&catalog)
            .repetitions(2)
            .mode(SamplingMode::Stratified)
            .build(&mut StdRng::seed_from_u64(3))
            .unwrap();

        // 10 items dealt 5 and 5: talker order follows the catalog.
        assert!(trials[..5].iter().all(|i| &*i.talker == "t1"));
        assert!(trials[5..].iter().all(|i| &*i.talker == "t2"));

        // The second pass repeats the first pass's word order.
        let order: Vec<&str> = trials.iter().map(|i| &*i.word).collect();
        assert_eq!(order[..5], order[5..]);
    }

    #[test]
    fn uneven_pools_shorten_the_last_slice() {
        let catalog = catalog(&["a", "b", "c", "d", "e"], &["t1", "t2", "t3"]);
        let trials = TrialSetBuilder::new(&catalog)
            .mode(SamplingMode::Stratified)
            .build(&mut StdRng::seed_from_u64(11))
            .unwrap();

        let counts = per_talker(&trials);
        assert_eq!(trials.len(), 5);
        assert_eq!(counts[&Atom::from("t1")], 2);
        assert_eq!(counts[&Atom::from("t2")], 2);
        assert_eq!(counts[&Atom::from("t3")], 1);
    }

    #[test]
    fn no_talkers_fails_fast() {
        let catalog = StimulusCatalog::from_paths(
            Vec::<PathBuf>::new(),
            [PathBuf::from("/img/cat.png")],
        );
        for mode in [SamplingMode::Simple, SamplingMode::Stratified] {
            let err = TrialSetBuilder::new(&catalog)
                .mode(mode)
                .build(&mut StdRng::seed_from_u64(0))
                .unwrap_err();
            assert!(matches!(
                err,
                EngineError::InsufficientStimuli { words: 0, talkers: 0 }
            ));
        }
    }
}
