//! The engine thread: a current-thread tokio runtime driving one run.
//!
//! cpal streams and the thread-local rng are not `Send`, so the scheduler is
//! built on the thread that runs it.

use crate::audio::CpalPlayer;
use crate::prompts::{PromptStack, WindowPrompts};
use picword_core::Settings;
use picword_experiment::{ExperimentConfig, RunInput, RunReport, TileBoard, TrialScheduler};
use picword_timing::TokioTimer;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use winit::event_loop::EventLoopProxy;

/// Engine to window notifications.
#[derive(Debug)]
pub enum UserEvent {
    Tiles(watch::Receiver<TileBoard>),
    PromptsChanged,
    RunEnded(RunReport),
    /// The run could not be started at all.
    EngineFailed(String),
}

pub fn spawn(
    settings: Settings,
    config: ExperimentConfig,
    inputs: mpsc::UnboundedReceiver<RunInput>,
    prompts: Arc<Mutex<PromptStack>>,
    proxy: EventLoopProxy<UserEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("picword-engine".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build();
            match runtime {
                Ok(runtime) => runtime.block_on(run(settings, config, inputs, prompts, proxy)),
                Err(err) => {
                    error!(%err, "cannot start engine runtime");
                    let _ = proxy.send_event(UserEvent::EngineFailed(err.to_string()));
                }
            }
        })
}

async fn run(
    settings: Settings,
    config: ExperimentConfig,
    inputs: mpsc::UnboundedReceiver<RunInput>,
    prompts: Arc<Mutex<PromptStack>>,
    proxy: EventLoopProxy<UserEvent>,
) {
    let audio = match CpalPlayer::new() {
        Ok(audio) => audio,
        Err(err) => {
            error!(%err, "audio output unavailable");
            let _ = proxy.send_event(UserEvent::EngineFailed(err.to_string()));
            return;
        }
    };
    let dialogs = WindowPrompts::new(prompts, proxy.clone());
    let scheduler = TrialScheduler::new(
        settings,
        config,
        audio,
        dialogs,
        inputs,
        TokioTimer,
        rand::rng(),
    );
    let _ = proxy.send_event(UserEvent::Tiles(scheduler.tiles()));

    info!("engine running");
    let report = scheduler.run().await;
    let _ = proxy.send_event(UserEvent::RunEnded(report));
}
