use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plankit_model::*;
use plankit_sim::{SequentialSimulator, demos, validate_plan};
use std::time::Instant;

/// Sequential simulation of planning problems.
#[derive(Debug, Parser)]
#[command(name = "plansim", rename_all = "kebab-case")]
struct Args {
    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs a robot carrying a package with a limited battery, and validates its plan.
    Demo,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(Instant::now()))
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Demo => demo(),
    }
}

fn demo() -> Result<()> {
    let problem = demos::robot_problem().context("Unable to build the robot problem")?;
    println!("{problem}");
    let env = problem.env();
    let battery = env.fluent(env.fluents.get("battery")?, [])?;
    let simulator = SequentialSimulator::new(&problem, true)?;
    let plan = demos::robot_plan(&problem)?;

    let mut state = simulator.get_initial_state()?;
    let show = |state: &SequentialState| -> Result<String> {
        let value = state.get_value(battery).context("No value for the battery")?;
        Ok((env / value).to_string())
    };
    println!("battery: {}", show(&state)?);
    for instance in plan.iter() {
        state = simulator
            .apply(&state, instance.action, &instance.parameters)?
            .with_context(|| format!("`{}` is not applicable", instance.format(&problem)))?;
        println!(
            "{:<16} battery: {:>3}   goal: {}",
            instance.format(&problem),
            show(&state)?,
            simulator.is_goal(&state)?
        );
    }

    let result = validate_plan(&simulator, &plan)?;
    println!("\nPlan is {}", result.status);
    for (metric, value) in problem.quality_metrics().iter().zip(&result.metric_values) {
        println!("  {}: {}", env / metric, env / *value);
    }
    anyhow::ensure!(result.is_valid(), "Invalid plan: {:?}", result.reason);
    Ok(())
}
