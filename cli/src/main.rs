use aicron_engine::{commit_to_host, logging, probe, tools, Compiler, Config, Gateway, Provider, MODEL_CATALOG};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use common::{next_runs_from_now, parse_schedule, JobDescriptor, JobStatus, ProviderConfig, ProviderOverrides};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Turn plain-language requests into cron jobs", long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at info level or above
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ProviderArgs {
    /// Model identifier, e.g. "ollama/llama3" or "openai/gpt-4o"
    #[arg(short, long)]
    model: Option<String>,
    /// Backend endpoint
    #[arg(long)]
    api_base: Option<String>,
    /// Credential for hosted backends
    #[arg(long)]
    api_key: Option<String>,
}

impl From<ProviderArgs> for ProviderOverrides {
    fn from(args: ProviderArgs) -> Self {
        ProviderOverrides {
            model: args.model,
            api_base: args.api_base,
            api_key: args.api_key,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a request into a job
    Generate {
        /// What to schedule, e.g. "back up /var/www every night"
        #[arg(required = true)]
        request: Vec<String>,
        #[command(flatten)]
        provider: ProviderArgs,
        /// Add a directory listing to the prompt
        #[arg(long = "list-dir", value_name = "PATH")]
        list_dirs: Vec<String>,
        /// Add a file search to the prompt
        #[arg(long, value_name = "PATTERN")]
        find: Vec<String>,
        /// Root for --find searches
        #[arg(long, default_value = ".")]
        search_root: String,
        /// Upcoming runs to preview
        #[arg(long, default_value_t = 5, value_parser = runs_parser())]
        runs: u16,
        /// Print the job as JSON
        #[arg(long)]
        json: bool,
        /// Write the job to the scheduler table
        #[arg(long)]
        commit: bool,
        /// Run this instead of the generated command
        #[arg(long = "command", value_name = "CMD")]
        command_override: Option<String>,
        /// Comment stored with the entry
        #[arg(long)]
        comment: Option<String>,
        /// Do not switch to the mock model when the local server is down
        #[arg(long)]
        strict: bool,
    },
    /// Check a cron expression and preview its runs
    Validate {
        expression: String,
        /// Upcoming runs to preview
        #[arg(long, default_value_t = 5, value_parser = runs_parser())]
        runs: u16,
    },
    /// Add an entry without asking a model
    Add {
        expression: String,
        command: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Find files matching a glob
    Find {
        pattern: String,
        #[arg(default_value = ".")]
        path: String,
    },
    /// List known models
    Models,
    /// Show local backend status
    Status,
}

const MAX_RUNS: i64 = 1000;

fn runs_parser() -> clap::builder::RangedI64ValueParser<u16> {
    clap::value_parser!(u16).range(0..=MAX_RUNS)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::setup_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Generate {
            request,
            provider,
            list_dirs,
            find,
            search_root,
            runs,
            json,
            commit,
            command_override,
            comment,
            strict,
        } => {
            let provider = select_provider(
                ProviderConfig::merged(provider.into(), &config.provider_defaults()),
                strict,
            )
            .await;

            let mut context = Vec::new();
            for path in &list_dirs {
                context.push(tools::directory_context(path));
            }
            for pattern in &find {
                context.push(tools::search_context(pattern, &search_root));
            }

            let gateway = Gateway::with_proxy(config.provider.proxy.as_deref());
            let compiler = Compiler::new(config.compiler.language.as_str());
            let descriptor = compiler
                .compile(&gateway, &request.join(" "), &provider, &context)
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                print_descriptor(&descriptor, provider.model());
                if descriptor.is_ok() {
                    print_runs(descriptor.schedule(), usize::from(runs));
                }
            }

            if commit {
                let command = command_override.unwrap_or_else(|| descriptor.command().to_string());
                let comment = comment.unwrap_or_else(|| config.scheduler.comment.clone());
                commit_to_host(
                    &descriptor,
                    &command,
                    &comment,
                    config.scheduler.targets_user,
                    &config.scheduler.tab_file,
                )?;
                println!("Job added.");
            }
        }
        Commands::Validate { expression, runs } => {
            let schedule = parse_schedule(&expression)
                .map_err(|e| anyhow::anyhow!("'{}' is not a valid cron expression: {}", expression, e))?;
            if schedule.is_standard() {
                println!("'{}' is valid", expression);
            } else {
                println!("'{}' is valid (has a seconds field, not accepted by crontab)", expression);
            }
            print_runs(&expression, usize::from(runs));
        }
        Commands::Add { expression, command, comment } => {
            let descriptor = JobDescriptor::ok(expression.as_str(), "", command.as_str(), None);
            let comment = comment.unwrap_or_else(|| config.scheduler.comment.clone());
            commit_to_host(
                &descriptor,
                &command,
                &comment,
                config.scheduler.targets_user,
                &config.scheduler.tab_file,
            )?;
            println!("Job added.");
        }
        Commands::Ls { path } => {
            println!("{}", tools::render(&tools::list_directory(&path)));
        }
        Commands::Find { pattern, path } => {
            println!("{}", tools::render(&tools::find_files(&pattern, &path)));
        }
        Commands::Models => {
            let mut table = Table::new();
            table.set_header(vec!["Model", "Label", "Endpoint"]);
            for (model, label) in MODEL_CATALOG {
                let endpoint = Provider::for_model(model)
                    .and_then(|p| p.default_base())
                    .unwrap_or("-");
                table.add_row(vec![*model, *label, endpoint]);
            }
            println!("{table}");
        }
        Commands::Status => {
            let defaults = config.provider_defaults();
            let base = Some(&defaults)
                .filter(|d| d.is_local_family())
                .and_then(|d| d.resolved_api_base())
                .unwrap_or_else(|| common::OLLAMA_DEFAULT_BASE.to_string());

            let mut table = Table::new();
            table.set_header(vec!["Check", "Result"]);
            table.add_row(vec!["Configured model".to_string(), defaults.model().to_string()]);
            table.add_row(vec!["Ollama installed".to_string(), yes_no(probe::local_backend_installed())]);
            table.add_row(vec![
                format!("Ollama running at {}", base),
                yes_no(probe::local_backend_running(&base).await),
            ]);
            println!("{table}");
        }
    }

    Ok(())
}

/// Swap a local-family model for the mock model when its server is not
/// answering, unless `strict`.
async fn select_provider(provider: ProviderConfig, strict: bool) -> ProviderConfig {
    if strict || !provider.is_local_family() {
        return provider;
    }
    let Some(base) = provider.resolved_api_base() else {
        return provider;
    };
    if probe::local_backend_running(&base).await {
        return provider;
    }
    log::warn!("No local model server at {}, using {}", base, common::MOCK_MODEL);
    eprintln!(
        "Local model server at {} is not running; falling back to the mock model (use --strict to disable).",
        base
    );
    ProviderConfig::new(common::MOCK_MODEL)
}

fn print_descriptor(descriptor: &JobDescriptor, model: &str) {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Model", model]);
    table.add_row(vec!["Status", status_label(descriptor.status())]);
    table.add_row(vec!["Schedule", descriptor.schedule()]);
    table.add_row(vec!["Explanation", descriptor.explanation()]);
    if !descriptor.command().is_empty() {
        table.add_row(vec!["Command", descriptor.command()]);
    }
    if let Some(warning) = descriptor.warning() {
        table.add_row(vec!["Warning", warning]);
    }
    println!("{table}");

    if descriptor.is_ok() && descriptor.command().is_empty() {
        println!("No command was generated; pass --command to commit this schedule.");
    }
}

fn print_runs(expression: &str, count: usize) {
    if count == 0 {
        return;
    }
    let runs = next_runs_from_now(expression, count);
    if runs.is_empty() {
        println!("'{}' does not produce any upcoming runs.", expression);
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Next run"]);
    for (i, run) in runs.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            run.format("%Y-%m-%d %H:%M:%S (%a)").to_string(),
        ]);
    }
    println!("{table}");
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Ok => "ok",
        JobStatus::ParseError => "parse error",
        JobStatus::ProviderError => "provider error",
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_args() {
        let cli = Cli::try_parse_from([
            "aicron", "generate", "back", "up", "/var/www", "--model", "mock",
            "--list-dir", "/var/www", "--runs", "3", "--strict",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate { request, provider, list_dirs, runs, strict, commit, .. } => {
                assert_eq!(request.join(" "), "back up /var/www");
                assert_eq!(provider.model.as_deref(), Some("mock"));
                assert_eq!(list_dirs, vec!["/var/www"]);
                assert_eq!(runs, 3);
                assert!(strict);
                assert!(!commit);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_runs_is_bounded() {
        assert!(Cli::try_parse_from(["aicron", "validate", "* * * * *", "--runs", "1000"]).is_ok());
        assert!(Cli::try_parse_from(["aicron", "validate", "* * * * *", "--runs", "99999999999999999"]).is_err());
    }

    #[test]
    fn test_generate_requires_request() {
        assert!(Cli::try_parse_from(["aicron", "generate"]).is_err());
    }

    #[tokio::test]
    async fn test_strict_keeps_local_model() {
        let provider = ProviderConfig::new("ollama/llama3").with_api_base("http://127.0.0.1:9");
        let selected = select_provider(provider, true).await;
        assert_eq!(selected.model(), "ollama/llama3");
    }

    #[tokio::test]
    async fn test_unreachable_local_model_falls_back_to_mock() {
        let provider = ProviderConfig::new("ollama/llama3").with_api_base("http://127.0.0.1:9");
        let selected = select_provider(provider, false).await;
        assert!(selected.is_mock());
    }

    #[tokio::test]
    async fn test_hosted_model_is_not_probed() {
        let provider = ProviderConfig::new("openai/gpt-4o");
        let selected = select_provider(provider, false).await;
        assert_eq!(selected.model(), "openai/gpt-4o");
    }
}
