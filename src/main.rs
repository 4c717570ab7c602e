//! pim CLI - a personal task manager whose tasks form a graph.

use std::process;

use clap::Parser;
use pim::cli::{Cli, Commands, ConfigCommands, TaskCommands};
use pim::commands::{self, NewTask, Output, Session, TaskEdit};
use pim::config::{OutputFormat, ResolvedConfig, resolve_config};
use pim::logging;

fn main() {
    let cli = Cli::parse();

    let config = match resolve_config(&cli.overrides()) {
        Ok(config) => config,
        Err(e) => exit_with_error(&e, cli.human_readable),
    };
    logging::init(config.log_level());
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("PIM_GIT_COMMIT"),
        built = env!("PIM_BUILD_TIMESTAMP"),
        "starting"
    );

    let human = config.output_format() == OutputFormat::Human;
    if let Err(e) = run_command(cli.command, &config, human) {
        exit_with_error(&e, human);
    }
}

fn exit_with_error(e: &pim::Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", e);
    } else {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    }
    process::exit(1);
}

fn run_command(command: Commands, config: &ResolvedConfig, human: bool) -> Result<(), pim::Error> {
    match command {
        Commands::Init => {
            let result = commands::init(config)?;
            output(&result, human);
        }

        Commands::Task { command } => {
            let mut session = Session::open(config)?;
            match command {
                TaskCommands::Create {
                    name,
                    parent,
                    tag,
                    estimate,
                    target,
                    link,
                    user,
                } => {
                    let new = NewTask {
                        name,
                        parents: parent,
                        tags: tag,
                        estimate,
                        target,
                        links: link,
                        users: user,
                    };
                    let result = commands::task_create(&mut session, new)?;
                    output(&result, human);
                }
                TaskCommands::List { parent, tag, dates } => {
                    let result = commands::task_list(&session, parent.as_deref(), &tag, dates)?;
                    output(&result, human);
                }
                TaskCommands::Show { id } => {
                    let result = commands::task_show(&session, &id)?;
                    output(&result, human);
                }
                TaskCommands::Update {
                    id,
                    name,
                    state,
                    tag,
                    untag,
                    estimate,
                    target,
                    add_parent,
                    remove_parent,
                } => {
                    let edit = TaskEdit {
                        name,
                        state,
                        tags: tag,
                        untags: untag,
                        estimate,
                        target,
                        add_parents: add_parent,
                        remove_parents: remove_parent,
                    };
                    let result = commands::task_update(&mut session, &id, edit)?;
                    output(&result, human);
                }
                TaskCommands::Delete { id, reparent } => {
                    let result = commands::task_delete(&mut session, &id, reparent.as_deref())?;
                    output(&result, human);
                }
            }
        }

        Commands::Today { parent } => {
            let session = Session::open(config)?;
            output(&commands::today(&session, parent.as_deref())?, human);
        }

        Commands::Week { parent } => {
            let session = Session::open(config)?;
            output(&commands::week(&session, parent.as_deref())?, human);
        }

        Commands::Completed { on, parent } => {
            let session = Session::open(config)?;
            let result = commands::completed(&session, on.as_deref(), parent.as_deref())?;
            output(&result, human);
        }

        Commands::Tags { parent } => {
            let session = Session::open(config)?;
            output(&commands::tags(&session, parent.as_deref())?, human);
        }

        Commands::Tree { id } => {
            let session = Session::open(config)?;
            output(&commands::tree(&session, id.as_deref())?, human);
        }

        Commands::Export { file } => {
            let session = Session::open(config)?;
            output(&commands::export(&session, &file)?, human);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(config), human),
            ConfigCommands::Set { key, value } => {
                output(&commands::config_set(config, &key, &value)?, human);
            }
        },
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
