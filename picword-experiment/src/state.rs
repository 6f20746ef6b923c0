//! The trial scheduler: one task that drives a run from loading the stimuli
//! to the finish prompt.
//!
//! Every step awaits its predecessor, so tile updates, audio and log rows
//! happen in one total order. Participant input is read at step boundaries
//! and while waiting; an escape combo seen there ends the run before any
//! further visible effect.

use crate::abort::AbortWatcher;
use crate::catalog::StimulusCatalog;
use crate::collaborators::{
    AudioPlayer, DialogHost, Prompt, PromptHandle, PromptRegistry, RunInput,
};
use crate::config::ExperimentConfig;
use crate::error::EngineError;
use crate::results::ResultsLog;
use crate::sampling::{SamplingMode, TrialSetBuilder};
use crate::tiles::{TileAnimator, TileBoard};
use crate::trial::Trial;
use chrono::Local;
use picword_cache::Atom;
use picword_core::{RunEvent, RunPhase, Settings, SettingsError, TrialItem, TrialRecord, TrialStep};
use picword_timing::Timer;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum RunOutcome {
    Finished,
    /// Ended by the escape combo or by the participant station going away.
    Aborted,
    Failed(EngineError),
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Every phase the run passed through, starting with `Idle`.
    pub phases: Vec<RunPhase>,
    /// Trials completed or skipped.
    pub trials_run: usize,
    pub total_trials: usize,
    pub rows_written: usize,
    pub skipped: usize,
    pub results_path: Option<PathBuf>,
}

/// What follows a finished trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Next,
    Break,
    Finish,
}

/// Decides what follows once `counter` of `total` trials are done. The
/// finish check comes first, so the last trial never triggers a break.
pub fn boundary_after(counter: usize, total: usize, block_size: usize) -> Boundary {
    if counter >= total {
        Boundary::Finish
    } else if block_size > 0 && counter % block_size == 0 {
        Boundary::Break
    } else {
        Boundary::Next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Abort,
}

enum Wake {
    Nothing,
    Selected(usize),
    Abort,
}

/// Mutable state of one run, owned by the scheduler.
#[derive(Debug)]
pub struct RunContext<Ts> {
    pub phase: RunPhase,
    pub history: Vec<RunPhase>,
    pub counter: usize,
    pub aborted: bool,
    pub skipped: usize,
    pub trials: Vec<TrialItem>,
    pub current: Option<Trial<Ts>>,
    prompts: PromptRegistry,
}

impl<Ts> RunContext<Ts> {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            history: vec![RunPhase::Idle],
            counter: 0,
            aborted: false,
            skipped: 0,
            trials: Vec::new(),
            current: None,
            prompts: PromptRegistry::default(),
        }
    }

    fn advance(&mut self, event: RunEvent) -> Result<(), EngineError> {
        let next = self
            .phase
            .next(event)
            .ok_or(EngineError::InvalidTransition {
                from: self.phase,
                event,
            })?;
        info!(from = ?self.phase, to = ?next, ?event, "phase change");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    fn set_step(&mut self, step: TrialStep) {
        if let Some(trial) = self.current.as_mut() {
            trial.step = step;
        }
    }
}

pub struct TrialScheduler<A, D, T, R>
where
    A: AudioPlayer,
    D: DialogHost,
    T: Timer,
    R: Rng,
{
    settings: Settings,
    config: ExperimentConfig,
    audio: A,
    dialogs: D,
    inputs: mpsc::UnboundedReceiver<RunInput>,
    timer: T,
    rng: R,
    tiles: TileAnimator,
    watcher: AbortWatcher,
    catalog: StimulusCatalog,
    log: Option<ResultsLog<BufWriter<File>>>,
    ctx: RunContext<T::Timestamp>,
}

impl<A, D, T, R> TrialScheduler<A, D, T, R>
where
    A: AudioPlayer,
    D: DialogHost,
    T: Timer,
    R: Rng,
{
    pub fn new(
        settings: Settings,
        config: ExperimentConfig,
        audio: A,
        dialogs: D,
        inputs: mpsc::UnboundedReceiver<RunInput>,
        timer: T,
        rng: R,
    ) -> Self {
        let settings = settings.clamped();
        let watcher = AbortWatcher::new(&settings.escape_combo, config.abort_window());
        Self {
            settings,
            config,
            audio,
            dialogs,
            inputs,
            timer,
            rng,
            tiles: TileAnimator::new(),
            watcher,
            catalog: StimulusCatalog::default(),
            log: None,
            ctx: RunContext::new(),
        }
    }

    /// Snapshots of the two tiles, updated after every tile mutation.
    pub fn tiles(&self) -> watch::Receiver<TileBoard> {
        self.tiles.subscribe()
    }

    pub fn phase(&self) -> RunPhase {
        self.ctx.phase
    }

    /// Drives the run to a terminal phase.
    pub async fn run(mut self) -> RunReport {
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(err).await,
        };
        let (rows_written, results_path) = self.close_log();
        info!(
            ?outcome,
            trials = self.ctx.counter,
            rows = rows_written,
            skipped = self.ctx.skipped,
            "run ended"
        );
        RunReport {
            outcome,
            phases: self.ctx.history,
            trials_run: self.ctx.counter,
            total_trials: self.ctx.trials.len(),
            rows_written,
            skipped: self.ctx.skipped,
            results_path,
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome, EngineError> {
        self.ctx.advance(RunEvent::Started)?;
        self.load().await?;
        self.ctx.advance(RunEvent::StimuliLoaded)?;

        if self.pause(self.config.ready_delay()).await == Flow::Abort {
            return self.abort();
        }
        if self.prompt(Prompt::ready()).await == Flow::Abort {
            return self.abort();
        }
        self.begin().await?;
        self.ctx.advance(RunEvent::PromptDismissed)?;

        loop {
            if self.run_trial().await? == Flow::Abort {
                return self.abort();
            }
            self.ctx.counter += 1;

            let total = self.ctx.trials.len();
            match boundary_after(self.ctx.counter, total, self.settings.block_size as usize) {
                Boundary::Next => {}
                Boundary::Break => {
                    self.ctx.advance(RunEvent::BlockBoundary)?;
                    if self.blank(self.config.break_delay()).await? == Flow::Abort {
                        return self.abort();
                    }
                    let rest = Prompt::rest(&self.settings.escape_combo);
                    if self.prompt(rest).await == Flow::Abort {
                        return self.abort();
                    }
                    self.ctx.advance(RunEvent::PromptDismissed)?;
                }
                Boundary::Finish => {
                    self.ctx.advance(RunEvent::TrialsExhausted)?;
                    if self.blank(self.config.finish_delay()).await? == Flow::Abort {
                        return self.abort();
                    }
                    if self.prompt(Prompt::finish()).await == Flow::Abort {
                        return self.abort();
                    }
                    self.ctx.advance(RunEvent::PromptDismissed)?;
                    return Ok(RunOutcome::Finished);
                }
            }
        }
    }

    async fn load(&mut self) -> Result<(), EngineError> {
        self.settings.validate()?;
        let catalog = match (
            &self.settings.stimuli_path_audio,
            &self.settings.stimuli_path_image,
        ) {
            (Some(audio), Some(images)) => StimulusCatalog::load(audio, images).await?,
            _ => return Err(SettingsError::Unset("stimuli").into()),
        };

        let trials = TrialSetBuilder::new(&catalog)
            .repetitions(self.settings.repetitions as usize)
            .mode(SamplingMode::from_stratified(self.settings.stratified_sampling))
            .build(&mut self.rng)?;

        if catalog.image_count() < 3 {
            return Err(EngineError::InsufficientImages {
                found: catalog.image_count(),
            });
        }
        if let Some(word) = catalog.missing_images(&trials).into_iter().next() {
            return Err(EngineError::MissingImage(word));
        }

        self.catalog = catalog;
        self.ctx.trials = trials;
        Ok(())
    }

    /// Shuffles the sequence, resets the counter and opens the results log.
    async fn begin(&mut self) -> Result<(), EngineError> {
        self.ctx.trials.shuffle(&mut self.rng);
        self.ctx.counter = 0;
        let responses = self
            .settings
            .responses_path
            .clone()
            .ok_or(SettingsError::Unset("responses"))?;
        self.log = Some(ResultsLog::create(&responses, &Local::now()).await?);
        info!(trials = self.ctx.trials.len(), "run started");
        Ok(())
    }

    async fn run_trial(&mut self) -> Result<Flow, EngineError> {
        if self.drain_inputs() == Flow::Abort {
            return Ok(Flow::Abort);
        }

        let index = self.ctx.counter;
        let item = self.ctx.trials[index % self.ctx.trials.len()].clone();
        info!(trial = index + 1, word = %item.word, talker = %item.talker, "trial started");

        let choices = self.pick_choices(&item.word)?;
        let paths = self.image_paths(&choices)?;
        let mut trial = Trial::new(index, item.clone(), self.timer.now());
        trial.choices = Some(choices);
        trial.step = TrialStep::Presenting;
        self.ctx.current = Some(trial);

        self.tiles.update(Some(&paths), &mut self.rng).await?;
        if self.pause(self.config.tile_settle()).await == Flow::Abort {
            return Ok(Flow::Abort);
        }
        self.tiles.settle();

        self.ctx.set_step(TrialStep::LoadingAudio);
        let Some(audio) = self.catalog.audio_path(&item).map(Path::to_path_buf) else {
            warn!(trial = index + 1, key = %item, "no audio file for trial, skipping");
            return Ok(self.skip());
        };
        if let Err(err) = self.audio.load_wav(&audio).await {
            warn!(trial = index + 1, %err, "audio failed to load, skipping trial");
            return Ok(self.skip());
        }
        if self.drain_inputs() == Flow::Abort {
            return Ok(Flow::Abort);
        }

        self.ctx.set_step(TrialStep::AwaitingResponse);
        self.audio.play();
        let Some(choice) = self.await_response().await else {
            return Ok(Flow::Abort);
        };

        self.audio.stop();
        self.log_response(choice)?;
        Ok(Flow::Continue)
    }

    /// Two random distractors plus the target, in random order.
    fn pick_choices(&mut self, target: &Atom) -> Result<[Atom; 3], EngineError> {
        let others: Vec<&str> = self
            .catalog
            .image_keys()
            .filter(|key| *key != &**target)
            .collect();
        let mut choices: Vec<Atom> = others
            .choose_multiple(&mut self.rng, 2)
            .map(|key| Atom::from(*key))
            .collect();
        choices.push(target.clone());
        choices.shuffle(&mut self.rng);
        debug!(?choices, "images chosen");

        <[Atom; 3]>::try_from(choices).map_err(|_| EngineError::InsufficientImages {
            found: self.catalog.image_count(),
        })
    }

    fn image_paths(&self, choices: &[Atom; 3]) -> Result<[PathBuf; 3], EngineError> {
        let mut paths: [PathBuf; 3] = Default::default();
        for (slot, word) in paths.iter_mut().zip(choices) {
            *slot = self
                .catalog
                .image_path(word)
                .ok_or_else(|| EngineError::MissingImage(word.clone()))?
                .to_path_buf();
        }
        Ok(paths)
    }

    fn log_response(&mut self, choice: usize) -> Result<(), EngineError> {
        let Some(trial) = self.ctx.current.as_mut() else {
            return Ok(());
        };
        let Some(names) = self.tiles.incoming().names.clone() else {
            warn!(trial = trial.number(), "incoming tile has no names, response not logged");
            return Ok(());
        };
        if trial.choices.as_ref() != Some(&names) {
            return Err(EngineError::TileMismatch {
                trial: trial.number(),
            });
        }

        let record = TrialRecord {
            trial: trial.number(),
            response: names[choice].clone(),
            images: names,
            target: trial.item.word.clone(),
            speaker: trial.item.talker.clone(),
        };
        info!(
            trial = record.trial,
            response = %record.response,
            correct = record.is_correct(),
            elapsed_ms = self.timer.elapsed(trial.started).as_millis() as u64,
            "response logged"
        );
        if let Some(log) = self.log.as_mut() {
            log.append(&record)?;
        }
        trial.step = TrialStep::Logged;
        Ok(())
    }

    fn skip(&mut self) -> Flow {
        self.ctx.set_step(TrialStep::Skipped);
        self.ctx.skipped += 1;
        self.drain_inputs()
    }

    /// Blanks the display, then waits out `delay`.
    async fn blank(&mut self, delay: Duration) -> Result<Flow, EngineError> {
        self.ctx.current = None;
        self.tiles.update(None, &mut self.rng).await?;
        if self.pause(delay).await == Flow::Abort {
            return Ok(Flow::Abort);
        }
        self.tiles.settle();
        Ok(Flow::Continue)
    }

    async fn pause(&mut self, delay: Duration) -> Flow {
        let sleep = self.timer.sleep(delay);
        tokio::pin!(sleep);
        loop {
            let input = tokio::select! {
                () = &mut sleep => return Flow::Continue,
                input = self.inputs.recv() => input,
            };
            if let Wake::Abort = self.on_input(input) {
                return Flow::Abort;
            }
        }
    }

    async fn prompt(&mut self, prompt: Prompt) -> Flow {
        let kind = prompt.kind;
        let mut handle = self.ctx.prompts.open(&mut self.dialogs, prompt);
        let flow = self.await_closed(&mut handle).await;
        self.ctx.prompts.closed(kind);
        flow
    }

    async fn await_closed(&mut self, handle: &mut PromptHandle) -> Flow {
        loop {
            let input = tokio::select! {
                () = handle.closed() => return Flow::Continue,
                input = self.inputs.recv() => input,
            };
            if let Wake::Abort = self.on_input(input) {
                return Flow::Abort;
            }
        }
    }

    async fn await_response(&mut self) -> Option<usize> {
        loop {
            let input = self.inputs.recv().await;
            match self.on_input(input) {
                Wake::Selected(choice) => return Some(choice),
                Wake::Abort => return None,
                Wake::Nothing => {}
            }
        }
    }

    /// Handles whatever input queued up while a step was busy.
    fn drain_inputs(&mut self) -> Flow {
        loop {
            match self.inputs.try_recv() {
                Ok(input) => {
                    if let Wake::Abort = self.on_input(Some(input)) {
                        return Flow::Abort;
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => {
                    self.on_input(None);
                    return Flow::Abort;
                }
            }
        }
    }

    fn on_input(&mut self, input: Option<RunInput>) -> Wake {
        match input {
            None => {
                warn!("participant input closed");
                Wake::Abort
            }
            Some(RunInput::KeyDown { key, at }) => {
                if self.watcher.key_down(&key, at) {
                    info!(combo = %self.settings.escape_combo, "escape combo typed");
                    Wake::Abort
                } else {
                    debug!(%key, buffered = self.watcher.buffer().len(), "key down");
                    Wake::Nothing
                }
            }
            Some(RunInput::Select(choice)) if choice < 3 && self.accepting_response() => {
                Wake::Selected(choice)
            }
            Some(RunInput::Select(choice)) => {
                debug!(choice, "selection ignored");
                Wake::Nothing
            }
            Some(RunInput::Replay) => {
                if self.accepting_response() && !self.audio.playing() {
                    debug!("replaying target");
                    self.audio.play();
                }
                Wake::Nothing
            }
        }
    }

    fn accepting_response(&self) -> bool {
        self.ctx.phase.allows_response()
            && !self.tiles.in_transition()
            && self
                .ctx
                .current
                .as_ref()
                .is_some_and(|trial| trial.step == TrialStep::AwaitingResponse)
    }

    fn abort(&mut self) -> Result<RunOutcome, EngineError> {
        self.ctx.aborted = true;
        self.audio.stop();
        self.ctx.prompts.close_all(&mut self.dialogs);
        self.ctx.advance(RunEvent::Abort)?;
        Ok(RunOutcome::Aborted)
    }

    async fn fail(&mut self, err: EngineError) -> RunOutcome {
        error!(%err, "run failed");
        self.audio.stop();
        self.ctx.prompts.close_all(&mut self.dialogs);
        if let Err(transition) = self.ctx.advance(RunEvent::Failed) {
            warn!(%transition, "failure after the run ended");
        }
        if !self.ctx.aborted {
            self.ctx.aborted = true;
            self.prompt(Prompt::error(err.to_string())).await;
        }
        RunOutcome::Failed(err)
    }

    fn close_log(&mut self) -> (usize, Option<PathBuf>) {
        let Some(log) = self.log.take() else {
            return (0, None);
        };
        let rows = log.rows();
        let path = log.path().to_path_buf();
        if let Err(err) = log.close() {
            warn!(%err, "results log did not flush");
        }
        (rows, Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_takes_precedence_over_a_break() {
        assert_eq!(boundary_after(4, 4, 2), Boundary::Finish);
        assert_eq!(boundary_after(5, 4, 2), Boundary::Finish);
    }

    #[test]
    fn breaks_fall_on_block_multiples() {
        let seen: Vec<Boundary> = (1..=6).map(|n| boundary_after(n, 6, 2)).collect();
        assert_eq!(
            seen,
            [
                Boundary::Next,
                Boundary::Break,
                Boundary::Next,
                Boundary::Break,
                Boundary::Next,
                Boundary::Finish,
            ]
        );
    }

    #[test]
    fn block_size_of_one_breaks_after_every_trial_but_the_last() {
        let seen: Vec<Boundary> = (1..=3).map(|n| boundary_after(n, 3, 1)).collect();
        assert_eq!(seen, [Boundary::Break, Boundary::Break, Boundary::Finish]);
    }

    #[test]
    fn context_refuses_invalid_transitions() {
        let mut ctx: RunContext<()> = RunContext::new();
        assert!(matches!(
            ctx.advance(RunEvent::BlockBoundary),
            Err(EngineError::InvalidTransition {
                from: RunPhase::Idle,
                ..
            })
        ));
        ctx.advance(RunEvent::Started).unwrap();
        ctx.advance(RunEvent::Abort).unwrap();
        assert_eq!(ctx.history, [RunPhase::Idle, RunPhase::Loading, RunPhase::Aborted]);
    }
}
