#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** Parley **
//! Terminal player for compiled dialogue programs.
//!
//! Usage: `parley_engine [parley.toml]`

use std::env;
use std::path::PathBuf;

use parley_engine::config::DEFAULT_CONFIG_FILE;
use parley_engine::input::{InputEvent, InputManager};
use parley_engine::player::{Player, parse_choice};
use parley_engine::style::DialogueStyle;
use parley_engine::{CommandOutcome, PlayerConfig, Runner, RuntimeResult, load_program};

use anyhow::{Context, Result};
use colored::Colorize;
use log::{info, warn};

fn main() -> Result<()> {
    env_logger::init();
    let config_path = env::args().nth(1).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
    info!("Start: loading player config from '{}'", config_path.display());
    let config = PlayerConfig::load(&config_path).context("while loading player config")?;
    let program = load_program(&config.program).context("while loading compiled program")?;

    let runner_config = config.runner_config().on_command(|event| {
        if let CommandOutcome::Failed(err) = event.outcome {
            warn!("command '{}' failed: {err}", event.raw);
        }
    });
    let mut runner = Runner::new(program, runner_config).context("while starting the dialogue")?;
    info!("Starting the dialogue!");

    println!("{:^60}", "PARLEY".bright_yellow().underline());
    run_dialogue(&mut runner, Player::new(config))
}

/// Print results and collect choices until the dialogue ends or input runs out.
fn run_dialogue(runner: &mut Runner, mut player: Player) -> Result<()> {
    let mut input = InputManager::new();
    loop {
        let Some(result) = runner.current().cloned() else {
            break;
        };
        for line in player.render(&result) {
            println!("{line}");
        }
        if runner.is_finished() {
            println!("{}", Player::farewell());
            break;
        }

        let choice = match &result {
            RuntimeResult::Options(options) => {
                let count = options.options.len();
                let Some(choice) = read_choice(&mut input, count)? else {
                    info!("input closed; leaving the dialogue");
                    break;
                };
                Some(choice)
            },
            RuntimeResult::Text(text) if !text.text.is_empty() => {
                match input.read_line("")? {
                    InputEvent::Line(_) => {},
                    InputEvent::Eof | InputEvent::Interrupted => break,
                }
                None
            },
            _ => None,
        };

        if let Err(err) = runner.advance(choice) {
            println!("{}", err.to_string().error_style());
            break;
        }
    }
    Ok(())
}

/// Prompt until a valid option number is entered. `None` when input ends.
fn read_choice(input: &mut InputManager, count: usize) -> Result<Option<usize>> {
    loop {
        match input.read_line("> ")? {
            InputEvent::Line(line) => match parse_choice(&line, count) {
                Some(choice) => return Ok(Some(choice)),
                None => println!("{}", Player::invalid_choice(count)),
            },
            InputEvent::Eof | InputEvent::Interrupted => return Ok(None),
        }
    }
}
