// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Color;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hpc_sim::cli::Cli;
use hpc_sim::common::config::ThemeConfig;
use hpc_sim::docs::DefinitionRegistry;
use hpc_sim::scenario::ScenarioDefinition;
use hpc_sim::utils::{bold, colored};
use hpc_sim::validation::StepEvent;
use hpc_sim::{Session, SessionOutput};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hpc_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut registry = DefinitionRegistry::builtin();
    if let Some(path) = &cli.definitions {
        let site = DefinitionRegistry::load_async(path)
            .await
            .with_context(|| format!("failed to load command definitions from {}", path.display()))?;
        registry.merge(site);
    }

    let build_config = cli.cluster.build_config();
    info!(
        "Building cluster '{}' with {} {} nodes",
        build_config.name, build_config.node_count, build_config.system_type
    );
    let mut session = Session::with_cluster(build_config, Arc::new(registry));
    if let Some(node) = &cli.node {
        session.set_current_node(node.clone());
    }

    if let Some(path) = &cli.scenario {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let definition = ScenarioDefinition::from_json(&text)
            .with_context(|| format!("invalid scenario {}", path.display()))?;
        let title = definition.title.clone();
        let report = session.start_scenario(definition)?;
        eprintln!(
            "{} {title} ({} faults injected)",
            bold("Scenario:"),
            report.applied
        );
    }

    if !cli.commands.is_empty() {
        let mut exit_code = 0;
        for line in &cli.commands {
            let output = session.execute(line);
            exit_code = output.result.exit_code;
            print_output(&output, cli.json)?;
        }
        std::process::exit(exit_code);
    }

    run_shell(&mut session, cli.json).await
}

async fn run_shell(session: &mut Session, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let color = ThemeConfig::prompt_color(session.validator().is_some());
        print!("{}", colored(&session.prompt(), color));
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let output = session.execute(&line);
        print_output(&output, json)?;
        if session.has_exited() {
            break;
        }
    }
    Ok(())
}

fn print_output(output: &SessionOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(output)?);
        return Ok(());
    }
    if !output.result.output.is_empty() {
        println!("{}", output.result.output);
    }
    for event in &output.step_events {
        match event {
            StepEvent::Progress { step_id, progress } => {
                eprintln!("{}", colored(&format!("[{step_id}] {:.0}% done", progress * 100.0), Color::Cyan));
            }
            StepEvent::CheckFailed { step_id, reasons } => {
                eprintln!(
                    "{}",
                    colored(&format!("[{step_id}] not yet: {}", reasons.join("; ")), Color::Yellow)
                );
            }
            StepEvent::Completed { step_id } => {
                eprintln!("{}", colored(&format!("[{step_id}] step completed"), Color::Green));
            }
            StepEvent::ScenarioCompleted { scenario_id } => {
                eprintln!("{}", bold(&format!("Scenario '{scenario_id}' completed")));
            }
        }
    }
    Ok(())
}
