use crate::demo::{run_demo, run_form_list, run_form_show, run_validate, DemoArgs, ValidateArgs};
use crate::server;
use admission_portal::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Admission Portal",
    about = "Serve, inspect and exercise schema-driven admission forms",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect the configured form definitions
    Forms {
        #[command(subcommand)]
        command: FormsCommand,
    },
    /// Validate a JSON answer file against a form without storing it
    Validate(ValidateArgs),
    /// Walk the nursing admission form end to end from the command line
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum FormsCommand {
    /// List every known form with its steps
    List(FormSourceArgs),
    /// Print the full schema of one form as JSON
    Show {
        /// Short code of the form, e.g. bsc-nursing-2026
        short_code: String,
        #[command(flatten)]
        source: FormSourceArgs,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct FormSourceArgs {
    /// JSON file with additional form definitions (defaults to APP_FORMS_SEED)
    #[arg(long)]
    pub(crate) forms: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Forms {
            command: FormsCommand::List(source),
        } => run_form_list(source),
        Command::Forms {
            command: FormsCommand::Show { short_code, source },
        } => run_form_show(&short_code, source),
        Command::Validate(args) => run_validate(args),
        Command::Demo(args) => run_demo(args),
    }
}
