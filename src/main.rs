use clap::Parser;
use nu_ansi_term::Color;
use reedline::{DefaultCompleter, FileBackedHistory, Reedline, Signal};
use schemashell::cli::Args;
use schemashell::commands::{CommandOutcome, CommandParser, ShellCommand};
use schemashell::config::Config;
use schemashell::prompt::ShellPrompt;
use schemashell::session::SessionState;
use schemashell::logging;
use std::error::Error as StdError;
use std::io::IsTerminal;

fn print_banner() {
    println!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    println!("Type 'help' for commands, 'quit' to leave");
}

/// Prompt for a password when a connect command omitted it and the shell is
/// attached to a terminal.
fn fill_password(command: ShellCommand) -> ShellCommand {
    if !std::io::stdin().is_terminal() {
        return command;
    }
    match command {
        ShellCommand::Connect {
            server,
            host,
            port,
            database,
            urlx,
            user,
            password: None,
        } => {
            let password = rpassword::prompt_password("password: ").ok();
            ShellCommand::Connect {
                server,
                host,
                port,
                database,
                urlx,
                user,
                password: password.filter(|p| !p.is_empty()),
            }
        }
        ShellCommand::ConnectUrl {
            url,
            user,
            password: None,
        } => {
            let password = rpassword::prompt_password("password: ").ok();
            ShellCommand::ConnectUrl {
                url,
                user,
                password: password.filter(|p| !p.is_empty()),
            }
        }
        other => other,
    }
}

async fn run_line(
    line: &str,
    session: &mut SessionState,
    config: &Config,
    interactive: bool,
) -> Option<CommandOutcome> {
    let command = match CommandParser::parse(line) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", Color::Red.paint(format!("{e}")));
            return None;
        }
    };
    let command = if interactive {
        fill_password(command)
    } else {
        command
    };
    match command.dispatch(session, config).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            eprintln!("{}", Color::Red.paint(format!("Error: {e}")));
            None
        }
    }
}

fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Exit => {}
        CommandOutcome::Output(text) => {
            let text = text.trim_end();
            if !text.is_empty() {
                println!("{text}");
            }
        }
        CommandOutcome::Unavailable(reason) => {
            println!("{}", Color::Yellow.paint(format!("unavailable: {reason}")));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    let args = Args::parse();
    let config = Config::load();
    let _log_guard = match logging::init(&config, args.log_level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging disabled: {e}");
            None
        }
    };

    let mut session = SessionState::new();

    if let Some(url) = &args.url {
        let user = args.user.clone().unwrap_or_default();
        match session
            .connect_url(url, &user, args.password.as_deref(), &config)
            .await
        {
            Ok(connector) => println!("Connected to {}", connector.display_name),
            Err(e) => eprintln!("{}", Color::Red.paint(format!("Error: {e}"))),
        }
    }

    // One-shot mode: run the given commands and leave.
    if !args.command.is_empty() {
        for line in &args.command {
            if let Some(outcome) = run_line(line, &mut session, &config, false).await {
                let exit = outcome == CommandOutcome::Exit;
                print_outcome(&outcome);
                if exit {
                    break;
                }
            }
        }
        session.sweep().await;
        return Ok(());
    }

    print_banner();

    let config_dir = Config::config_dir()?;
    std::fs::create_dir_all(&config_dir)?;
    let history = FileBackedHistory::with_file(500, config_dir.join("history.txt"))?;
    let completer = DefaultCompleter::new_with_wordlen(CommandParser::command_names(), 2);
    let mut line_editor = Reedline::create()
        .with_history(Box::new(history))
        .with_completer(Box::new(completer));

    let mut prompt = ShellPrompt::new();

    loop {
        match line_editor.read_line(&prompt)? {
            Signal::Success(input) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if let Some(outcome) = run_line(input, &mut session, &config, true).await {
                    if outcome == CommandOutcome::Exit {
                        break;
                    }
                    print_outcome(&outcome);
                }
                prompt.update(session.description(), session.is_loaded());
            }
            Signal::CtrlC => {
                println!("^C");
                continue;
            }
            Signal::CtrlD => {
                break;
            }
        }
    }

    // Release the connection on the way out.
    session.sweep().await;
    Ok(())
}
