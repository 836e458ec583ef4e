use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use nimbus_core::blueprint::{Blueprint, SIGNATURE_VERSION};
use nimbus_core::error::ProvisionError;
use nimbus_core::plan::Plan;
use nimbus_core::provisioner::{Provisioner, StepOutcome};
use nimbus_provider_aws::AwsProvider;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(
    about = "Provision a public VPC and three compute nodes on EC2",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Create every resource (default)
    Apply,
    /// Show the steps that apply would run, without calling the provider
    Plan,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let blueprint = Blueprint::default();

    let result = match cli.command.unwrap_or(Commands::Apply) {
        Commands::Apply => run_apply(blueprint).await,
        Commands::Plan => run_plan(&blueprint),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level),
    );
}

fn run_plan(blueprint: &Blueprint) -> Result<(), String> {
    if let Err(errors) = blueprint.validate() {
        return Err(ProvisionError::InvalidBlueprint(errors).to_string());
    }

    let plan = Plan::from_blueprint(blueprint);
    print_target(blueprint);
    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for (i, step) in plan.steps().iter().enumerate() {
        let marker = if step.is_create() {
            "+".green()
        } else {
            "~".yellow()
        };
        println!("  {:>2}. {} {}", i + 1, marker, step);
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
    Ok(())
}

async fn run_apply(blueprint: Blueprint) -> Result<(), String> {
    print_target(&blueprint);
    let provider = AwsProvider::new(&blueprint.profile, &blueprint.region).await;
    let provisioner = Provisioner::new(provider, blueprint);

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    match provisioner.apply(print_outcome).await {
        Ok(ids) => {
            println!();
            println!(
                "{}",
                format!(
                    "Apply complete! {} instance(s) launched in {}.",
                    ids.instances.len(),
                    ids.vpc_id
                )
                .green()
                .bold()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(step) = e.failed_step() {
                println!("  {} {}", "✗".red(), step);
            }
            print_leftovers(&e);
            Err(e.to_string())
        }
    }
}

fn print_target(blueprint: &Blueprint) {
    println!(
        "{} profile={} region={} signature={}",
        "Target:".bold(),
        blueprint.profile,
        blueprint.region,
        SIGNATURE_VERSION
    );
    println!();
}

fn print_outcome(outcome: &StepOutcome) {
    println!("  {} {}", "✓".green(), outcome.message());
}

/// Resources are not rolled back; list them so they can be removed by hand
fn print_leftovers(error: &ProvisionError) {
    let created = error.created();
    if created.is_empty() {
        return;
    }

    println!();
    println!(
        "{}",
        "The following resources were created and remain in the account:"
            .yellow()
            .bold()
    );
    for resource in created {
        println!("  • {}", resource);
    }
    println!();
}
