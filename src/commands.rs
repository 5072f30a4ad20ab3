//! Typed shell commands: parsing, availability gating and dispatch.
//!
//! Every line the shell reads is parsed into a `ShellCommand` value; the
//! dispatcher checks the command's availability against the session state
//! and only then runs the handler. The command set is fixed at startup;
//! there is no dynamic registration.

use crate::config::Config;
use crate::connector::DatabaseConnector;
use crate::options::{FilterOptions, GrepOptions, InclusionRule, InfoLevel, LimitOptions,
                     OutputFormat, ShowOptions, SortOptions};
use crate::render;
use crate::session::{ExecuteOutcome, SessionError, SessionState};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Connect {
        server: String,
        host: Option<String>,
        port: Option<u16>,
        database: String,
        urlx: Option<String>,
        user: String,
        password: Option<String>,
    },
    ConnectUrl {
        url: String,
        user: String,
        password: Option<String>,
    },
    IsConnected,
    Disconnect,
    Sweep,
    Servers,
    Filter {
        no_empty_tables: bool,
        parents: u32,
        children: u32,
    },
    Grep {
        columns: Option<String>,
        parameters: Option<String>,
        definitions: Option<String>,
        invert_match: bool,
        only_matching: bool,
    },
    Limit {
        schemas: Option<String>,
        table_types: Option<String>,
        tables: Option<String>,
        exclude_columns: Option<String>,
        routine_types: Option<String>,
        routines: Option<String>,
        exclude_parameters: Option<String>,
        synonyms: Option<String>,
        sequences: Option<String>,
    },
    LoadCatalog {
        info_level: InfoLevel,
    },
    IsLoaded,
    Output {
        title: Option<String>,
        output_file: Option<PathBuf>,
        output_format: Option<OutputFormat>,
    },
    Show {
        no_info: bool,
        no_remarks: bool,
        weak_associations: bool,
        portable_names: bool,
    },
    Sort {
        tables: bool,
        columns: bool,
        parameters: bool,
    },
    Execute {
        command: String,
        output_file: Option<PathBuf>,
        output_format: Option<OutputFormat>,
    },
    Commands,
    Config {
        file: Option<PathBuf>,
    },
    SystemInfo,
    Version,
    Help,
    Quit,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid command syntax: {0}")]
    InvalidSyntax(String),
    #[error("missing required argument: {0}")]
    MissingArgument(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What the shell loop does with a finished command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Exit,
    Output(String),
    Unavailable(String),
}

/// Precondition gate evaluated before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Always,
    Connected,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum CommandCategory {
    Connection,
    Filter,
    Load,
    Output,
    Execute,
    System,
}

pub struct CommandDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub usage: &'static str,
    pub category: CommandCategory,
    pub availability: Availability,
}

static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        name: "connect",
        help: "Connect to a database, using a server specification",
        usage: "connect -server <id> -user <name> [-host h] [-port n] [-database d] [-urlx params] [-password p]",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "connect-url",
        help: "Connect to a database, using a connection URL",
        usage: "connect-url -url <url> -user <name> [-password p]",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "is-connected",
        help: "Check whether the session holds a live connection",
        usage: "is-connected",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "disconnect",
        help: "Disconnect from the database, keeping options and catalog",
        usage: "disconnect",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "sweep",
        help: "Disconnect and reset the whole session",
        usage: "sweep",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "servers",
        help: "List available database servers",
        usage: "servers",
        category: CommandCategory::Connection,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "filter",
        help: "Filter database object metadata",
        usage: "filter [-noemptytables] [-parents n] [-children n]",
        category: CommandCategory::Filter,
        availability: Availability::Connected,
    },
    CommandDescriptor {
        name: "grep",
        help: "Grep database object metadata",
        usage: "grep [-grepcolumns re] [-grepinout re] [-grepdef re] [-invert-match] [-only-matching]",
        category: CommandCategory::Filter,
        availability: Availability::Connected,
    },
    CommandDescriptor {
        name: "limit",
        help: "Limit which database objects are retrieved",
        usage: "limit [-schemas re] [-tabletypes t,v] [-tables re] [-excludecolumns re] [-routinetypes f,p] [-routines re] [-excludeinout re] [-synonyms re] [-sequences re]",
        category: CommandCategory::Filter,
        availability: Availability::Connected,
    },
    CommandDescriptor {
        name: "load-catalog",
        help: "Load a catalog of schema metadata",
        usage: "load-catalog -infolevel minimum|standard|detailed|maximum",
        category: CommandCategory::Load,
        availability: Availability::Connected,
    },
    CommandDescriptor {
        name: "is-loaded",
        help: "Check whether a catalog is loaded",
        usage: "is-loaded",
        category: CommandCategory::Load,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "output",
        help: "Set output title, file and format",
        usage: "output [-title t] [-o|-outputfile f] [-fmt|-outputformat text|json|html|dot]",
        category: CommandCategory::Output,
        availability: Availability::Loaded,
    },
    CommandDescriptor {
        name: "show",
        help: "Set display flags for rendered output",
        usage: "show [-noinfo] [-noremarks] [-weakassociations] [-portablenames]",
        category: CommandCategory::Output,
        availability: Availability::Loaded,
    },
    CommandDescriptor {
        name: "sort",
        help: "Set sort flags for rendered output",
        usage: "sort [-sorttables] [-sortcolumns] [-sortinout]",
        category: CommandCategory::Output,
        availability: Availability::Loaded,
    },
    CommandDescriptor {
        name: "execute",
        help: "Execute a render command over the loaded catalog",
        usage: "execute <command> [-o|-outputfile f] [-fmt|-outputformat text|json|html|dot]",
        category: CommandCategory::Execute,
        availability: Availability::Loaded,
    },
    CommandDescriptor {
        name: "commands",
        help: "List available render commands",
        usage: "commands",
        category: CommandCategory::Execute,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "config",
        help: "Show configuration, or load extra settings from a file",
        usage: "config [-file path]",
        category: CommandCategory::System,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "system-info",
        help: "System information",
        usage: "system-info",
        category: CommandCategory::System,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "version",
        help: "Version information",
        usage: "version",
        category: CommandCategory::System,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "help",
        help: "Show this help",
        usage: "help",
        category: CommandCategory::System,
        availability: Availability::Always,
    },
    CommandDescriptor {
        name: "quit",
        help: "Leave the shell",
        usage: "quit",
        category: CommandCategory::System,
        availability: Availability::Always,
    },
];

/// Parsed `-flag [value]` arguments of one command line.
struct Flags(HashMap<String, Option<String>>);

impl Flags {
    fn take_str(&mut self, names: &[&str]) -> Result<Option<String>, CommandError> {
        for name in names {
            if let Some(value) = self.0.remove(*name) {
                return match value {
                    Some(value) => Ok(Some(value)),
                    None => Err(CommandError::InvalidSyntax(format!(
                        "flag -{name} needs a value"
                    ))),
                };
            }
        }
        Ok(None)
    }

    fn require_str(&mut self, names: &[&str]) -> Result<String, CommandError> {
        self.take_str(names)?
            .ok_or_else(|| CommandError::MissingArgument(format!("-{}", names[0])))
    }

    /// A boolean flag: bare means true, otherwise the value must parse.
    fn take_bool(&mut self, name: &str) -> Result<bool, CommandError> {
        match self.0.remove(name) {
            None => Ok(false),
            Some(None) => Ok(true),
            Some(Some(value)) => value.parse().map_err(|_| {
                CommandError::InvalidSyntax(format!("flag -{name} takes true or false"))
            }),
        }
    }

    fn take_u32(&mut self, name: &str) -> Result<u32, CommandError> {
        match self.take_str(&[name])? {
            None => Ok(0),
            Some(value) => value
                .parse()
                .map_err(|_| CommandError::InvalidSyntax(format!("flag -{name} takes a number"))),
        }
    }

    fn take_u16(&mut self, name: &str) -> Result<Option<u16>, CommandError> {
        match self.take_str(&[name])? {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| CommandError::InvalidSyntax(format!("flag -{name} takes a port"))),
        }
    }

    /// Reject anything the command did not consume.
    fn finish(self, command: &str) -> Result<(), CommandError> {
        if let Some(name) = self.0.keys().next() {
            return Err(CommandError::InvalidSyntax(format!(
                "unknown flag -{name} for {command}"
            )));
        }
        Ok(())
    }
}

pub struct CommandParser;

impl CommandParser {
    /// Parse one shell line into a typed command.
    pub fn parse(input: &str) -> Result<ShellCommand, CommandError> {
        let mut tokens = input.split_whitespace();
        let Some(name) = tokens.next() else {
            return Err(CommandError::InvalidSyntax("empty command".to_string()));
        };
        let name = name.to_ascii_lowercase();

        let mut positional = Vec::new();
        let mut flags: HashMap<String, Option<String>> = HashMap::new();
        let rest: Vec<&str> = tokens.collect();
        let mut index = 0;
        while index < rest.len() {
            let token = rest[index];
            if let Some(flag) = token.strip_prefix('-') {
                let flag = flag.trim_start_matches('-').to_ascii_lowercase();
                let value = rest.get(index + 1).filter(|v| !v.starts_with('-'));
                if let Some(value) = value {
                    flags.insert(flag, Some((*value).to_string()));
                    index += 2;
                } else {
                    flags.insert(flag, None);
                    index += 1;
                }
            } else {
                positional.push(token.to_string());
                index += 1;
            }
        }
        let mut flags = Flags(flags);

        let command = match name.as_str() {
            "connect" => {
                let command = ShellCommand::Connect {
                    server: flags.require_str(&["server"])?,
                    host: flags.take_str(&["host"])?,
                    port: flags.take_u16("port")?,
                    database: flags.take_str(&["database"])?.unwrap_or_default(),
                    urlx: flags.take_str(&["urlx"])?,
                    user: flags.require_str(&["user"])?,
                    password: flags.take_str(&["password"])?,
                };
                flags.finish("connect")?;
                command
            }
            "connect-url" => {
                let command = ShellCommand::ConnectUrl {
                    url: flags.require_str(&["url"])?,
                    user: flags.require_str(&["user"])?,
                    password: flags.take_str(&["password"])?,
                };
                flags.finish("connect-url")?;
                command
            }
            "is-connected" => ShellCommand::IsConnected,
            "disconnect" => ShellCommand::Disconnect,
            "sweep" => ShellCommand::Sweep,
            "servers" => ShellCommand::Servers,
            "filter" => {
                let command = ShellCommand::Filter {
                    no_empty_tables: flags.take_bool("noemptytables")?,
                    parents: flags.take_u32("parents")?,
                    children: flags.take_u32("children")?,
                };
                flags.finish("filter")?;
                command
            }
            "grep" => {
                let command = ShellCommand::Grep {
                    columns: flags.take_str(&["grepcolumns"])?,
                    parameters: flags.take_str(&["grepinout"])?,
                    definitions: flags.take_str(&["grepdef"])?,
                    invert_match: flags.take_bool("invert-match")?,
                    only_matching: flags.take_bool("only-matching")?,
                };
                flags.finish("grep")?;
                command
            }
            "limit" => {
                let command = ShellCommand::Limit {
                    schemas: flags.take_str(&["schemas"])?,
                    table_types: flags.take_str(&["tabletypes"])?,
                    tables: flags.take_str(&["tables"])?,
                    exclude_columns: flags.take_str(&["excludecolumns"])?,
                    routine_types: flags.take_str(&["routinetypes"])?,
                    routines: flags.take_str(&["routines"])?,
                    exclude_parameters: flags.take_str(&["excludeinout"])?,
                    synonyms: flags.take_str(&["synonyms"])?,
                    sequences: flags.take_str(&["sequences"])?,
                };
                flags.finish("limit")?;
                command
            }
            "load-catalog" => {
                let level = flags.require_str(&["infolevel"])?;
                let info_level = InfoLevel::from_str(&level).map_err(|_| {
                    CommandError::InvalidSyntax(format!("unknown info level '{level}'"))
                })?;
                flags.finish("load-catalog")?;
                ShellCommand::LoadCatalog { info_level }
            }
            "is-loaded" => ShellCommand::IsLoaded,
            "output" => {
                let command = ShellCommand::Output {
                    title: flags.take_str(&["title"])?,
                    output_file: flags.take_str(&["o", "outputfile"])?.map(PathBuf::from),
                    output_format: parse_format(&mut flags)?,
                };
                flags.finish("output")?;
                command
            }
            "show" => {
                let command = ShellCommand::Show {
                    no_info: flags.take_bool("noinfo")?,
                    no_remarks: flags.take_bool("noremarks")?,
                    weak_associations: flags.take_bool("weakassociations")?,
                    portable_names: flags.take_bool("portablenames")?,
                };
                flags.finish("show")?;
                command
            }
            "sort" => {
                let command = ShellCommand::Sort {
                    tables: flags.take_bool("sorttables")?,
                    columns: flags.take_bool("sortcolumns")?,
                    parameters: flags.take_bool("sortinout")?,
                };
                flags.finish("sort")?;
                command
            }
            "execute" => {
                let command_name = match flags.take_str(&["command"])? {
                    Some(name) => name,
                    None => positional
                        .first()
                        .cloned()
                        .ok_or_else(|| CommandError::MissingArgument("command".to_string()))?,
                };
                let command = ShellCommand::Execute {
                    command: command_name,
                    output_file: flags.take_str(&["o", "outputfile"])?.map(PathBuf::from),
                    output_format: parse_format(&mut flags)?,
                };
                flags.finish("execute")?;
                command
            }
            "commands" => ShellCommand::Commands,
            "config" => {
                let command = ShellCommand::Config {
                    file: flags.take_str(&["file"])?.map(PathBuf::from),
                };
                flags.finish("config")?;
                command
            }
            "system-info" => ShellCommand::SystemInfo,
            "version" => ShellCommand::Version,
            "help" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            _ => return Err(CommandError::UnknownCommand(name)),
        };
        Ok(command)
    }

    /// Command names for the line editor's completer.
    pub fn command_names() -> Vec<String> {
        COMMANDS.iter().map(|c| c.name.to_string()).collect()
    }
}

fn parse_format(flags: &mut Flags) -> Result<Option<OutputFormat>, CommandError> {
    match flags.take_str(&["fmt", "outputformat"])? {
        None => Ok(None),
        Some(value) => OutputFormat::from_str(&value)
            .map(Some)
            .map_err(|_| CommandError::InvalidSyntax(format!("unknown output format '{value}'"))),
    }
}

impl ShellCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ShellCommand::Connect { .. } => "connect",
            ShellCommand::ConnectUrl { .. } => "connect-url",
            ShellCommand::IsConnected => "is-connected",
            ShellCommand::Disconnect => "disconnect",
            ShellCommand::Sweep => "sweep",
            ShellCommand::Servers => "servers",
            ShellCommand::Filter { .. } => "filter",
            ShellCommand::Grep { .. } => "grep",
            ShellCommand::Limit { .. } => "limit",
            ShellCommand::LoadCatalog { .. } => "load-catalog",
            ShellCommand::IsLoaded => "is-loaded",
            ShellCommand::Output { .. } => "output",
            ShellCommand::Show { .. } => "show",
            ShellCommand::Sort { .. } => "sort",
            ShellCommand::Execute { .. } => "execute",
            ShellCommand::Commands => "commands",
            ShellCommand::Config { .. } => "config",
            ShellCommand::SystemInfo => "system-info",
            ShellCommand::Version => "version",
            ShellCommand::Help => "help",
            ShellCommand::Quit => "quit",
        }
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        let name = self.name();
        COMMANDS
            .iter()
            .find(|c| c.name == name)
            .expect("every command has a descriptor")
    }

    pub fn availability(&self) -> Availability {
        self.descriptor().availability
    }

    pub fn category(&self) -> CommandCategory {
        self.descriptor().category
    }

    /// Gate, then run. The handler is never invoked when its precondition
    /// is unmet; on error the session keeps its previous valid state.
    pub async fn dispatch(
        &self,
        session: &mut SessionState,
        config: &Config,
    ) -> Result<CommandOutcome, CommandError> {
        match self.availability() {
            Availability::Always => {}
            Availability::Connected => {
                if !session.is_connected().await {
                    return Ok(CommandOutcome::Unavailable(
                        "there is no database connection".to_string(),
                    ));
                }
            }
            Availability::Loaded => {
                if !session.is_loaded() {
                    return Ok(CommandOutcome::Unavailable(
                        "there is no schema metadata loaded".to_string(),
                    ));
                }
            }
        }
        debug!(command = self.name(), "dispatching");

        let outcome = match self {
            ShellCommand::Connect {
                server,
                host,
                port,
                database,
                urlx,
                user,
                password,
            } => {
                let connector = session
                    .connect(
                        server,
                        host.as_deref(),
                        *port,
                        database,
                        urlx.as_deref(),
                        user,
                        password.as_deref(),
                        config,
                    )
                    .await?;
                CommandOutcome::Output(format!("Connected to {}", connector.display_name))
            }
            ShellCommand::ConnectUrl {
                url,
                user,
                password,
            } => {
                let connector = session
                    .connect_url(url, user, password.as_deref(), config)
                    .await?;
                CommandOutcome::Output(format!("Connected to {}", connector.display_name))
            }
            ShellCommand::IsConnected => {
                CommandOutcome::Output(session.is_connected().await.to_string())
            }
            ShellCommand::Disconnect => {
                session.disconnect().await;
                CommandOutcome::Output("Disconnected".to_string())
            }
            ShellCommand::Sweep => {
                session.sweep().await;
                CommandOutcome::Output("Session swept".to_string())
            }
            ShellCommand::Servers => {
                let mut out = String::new();
                for connector in DatabaseConnector::all() {
                    let _ = writeln!(out, "{}", connector);
                }
                CommandOutcome::Output(out)
            }
            ShellCommand::Filter {
                no_empty_tables,
                parents,
                children,
            } => {
                session.set_filter(FilterOptions {
                    exclude_empty_tables: *no_empty_tables,
                    parent_depth: *parents,
                    child_depth: *children,
                });
                CommandOutcome::Output("Filter options set".to_string())
            }
            ShellCommand::Grep {
                columns,
                parameters,
                definitions,
                invert_match,
                only_matching,
            } => {
                // Compile every pattern before touching the session.
                let grep = GrepOptions {
                    columns: include_rule(columns.as_deref())?,
                    parameters: include_rule(parameters.as_deref())?,
                    definitions: include_rule(definitions.as_deref())?,
                    invert_match: *invert_match,
                    only_matching: *only_matching,
                };
                session.set_grep(grep);
                CommandOutcome::Output("Grep options set".to_string())
            }
            ShellCommand::Limit {
                schemas,
                table_types,
                tables,
                exclude_columns,
                routine_types,
                routines,
                exclude_parameters,
                synonyms,
                sequences,
            } => {
                let limit = LimitOptions {
                    schemas: include_rule(schemas.as_deref())?,
                    table_types: split_types(table_types.as_deref()),
                    tables: include_rule(tables.as_deref())?,
                    exclude_columns: exclude_rule(exclude_columns.as_deref())?,
                    routine_types: split_types(routine_types.as_deref()),
                    routines: include_rule(routines.as_deref())?,
                    exclude_parameters: exclude_rule(exclude_parameters.as_deref())?,
                    synonyms: include_rule(synonyms.as_deref())?,
                    sequences: include_rule(sequences.as_deref())?,
                };
                session.set_limit(limit);
                CommandOutcome::Output("Limit options set".to_string())
            }
            ShellCommand::LoadCatalog { info_level } => {
                session.load_catalog(*info_level).await?;
                CommandOutcome::Output("Loaded catalog".to_string())
            }
            ShellCommand::IsLoaded => CommandOutcome::Output(session.is_loaded().to_string()),
            ShellCommand::Output {
                title,
                output_file,
                output_format,
            } => {
                session.set_output(title.clone(), output_file.clone(), *output_format);
                CommandOutcome::Output("Output options set".to_string())
            }
            ShellCommand::Show {
                no_info,
                no_remarks,
                weak_associations,
                portable_names,
            } => {
                session.set_show(ShowOptions {
                    no_info: *no_info,
                    no_remarks: *no_remarks,
                    weak_associations: *weak_associations,
                    portable_names: *portable_names,
                });
                CommandOutcome::Output("Show options set".to_string())
            }
            ShellCommand::Sort {
                tables,
                columns,
                parameters,
            } => {
                session.set_sort(SortOptions {
                    tables: *tables,
                    columns: *columns,
                    parameters: *parameters,
                });
                CommandOutcome::Output("Sort options set".to_string())
            }
            ShellCommand::Execute {
                command,
                output_file,
                output_format,
            } => {
                let outcome = session
                    .execute(command, output_file.clone(), *output_format)
                    .await?;
                match outcome {
                    ExecuteOutcome::Console { rendered } => CommandOutcome::Output(format!(
                        "{}\nCommand completed to console",
                        rendered.trim_end()
                    )),
                    file => CommandOutcome::Output(file.status()),
                }
            }
            ShellCommand::Commands => {
                let mut out = String::new();
                for command in render::RENDER_COMMANDS {
                    let _ = writeln!(out, "{:<8} {}", command.name, command.description);
                }
                CommandOutcome::Output(out)
            }
            ShellCommand::Config { file } => match file {
                Some(path) => {
                    let settings = read_settings_file(path)?;
                    let count = settings.len();
                    session.merge_extra_settings(settings);
                    CommandOutcome::Output(format!(
                        "Loaded {} settings from {}",
                        count,
                        path.display()
                    ))
                }
                None => CommandOutcome::Output(describe_config(config, session)),
            },
            ShellCommand::SystemInfo => CommandOutcome::Output(system_info()),
            ShellCommand::Version => CommandOutcome::Output(format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )),
            ShellCommand::Help => CommandOutcome::Output(help_text()),
            ShellCommand::Quit => CommandOutcome::Exit,
        };
        Ok(outcome)
    }
}

fn include_rule(pattern: Option<&str>) -> Result<Option<InclusionRule>, CommandError> {
    match pattern {
        None => Ok(None),
        Some(pattern) => InclusionRule::include(pattern)
            .map(Some)
            .map_err(|e| CommandError::Session(SessionError::InvalidPattern(e))),
    }
}

fn exclude_rule(pattern: Option<&str>) -> Result<Option<InclusionRule>, CommandError> {
    match pattern {
        None => Ok(None),
        Some(pattern) => InclusionRule::exclude(pattern)
            .map(Some)
            .map_err(|e| CommandError::Session(SessionError::InvalidPattern(e))),
    }
}

fn split_types(value: Option<&str>) -> Option<Vec<String>> {
    value.map(|v| {
        v.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
}

/// Parse a `key=value` settings file; blank lines and `#` comments skipped.
fn read_settings_file(path: &PathBuf) -> Result<HashMap<String, String>, CommandError> {
    let content = std::fs::read_to_string(path).map_err(SessionError::from)?;
    let mut settings = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            settings.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(settings)
}

fn describe_config(config: &Config, session: &SessionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "default info level:    {}", config.default_info_level);
    let _ = writeln!(out, "default output format: {}", config.default_output_format);
    let _ = writeln!(out, "log level:             {}", config.log_level);
    let _ = writeln!(out, "extra settings:        {}", session.extra_settings().len());
    out
}

fn system_info() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(
        out,
        "{} {} on {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        host
    );
    let _ = writeln!(out, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    out
}

fn help_text() -> String {
    let mut out = String::new();
    for category in CommandCategory::iter() {
        let _ = writeln!(out, "{} Commands", category);
        for descriptor in COMMANDS.iter().filter(|c| c.category == category) {
            let _ = writeln!(out, "  {:<14} {}", descriptor.name, descriptor.help);
            let _ = writeln!(out, "  {:<14} usage: {}", "", descriptor.usage);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_core_commands() {
        assert_eq!(CommandParser::parse("quit").unwrap(), ShellCommand::Quit);
        assert_eq!(CommandParser::parse("exit").unwrap(), ShellCommand::Quit);
        assert_eq!(CommandParser::parse("help").unwrap(), ShellCommand::Help);
        assert_eq!(
            CommandParser::parse("is-connected").unwrap(),
            ShellCommand::IsConnected
        );
        assert_eq!(CommandParser::parse("sweep").unwrap(), ShellCommand::Sweep);
    }

    #[test]
    fn parses_connect_with_all_flags() {
        let command = CommandParser::parse(
            "connect -server postgresql -host db.internal -port 5433 \
             -database books -urlx sslmode=disable -user sa -password secret",
        )
        .unwrap();
        assert_eq!(
            command,
            ShellCommand::Connect {
                server: "postgresql".to_string(),
                host: Some("db.internal".to_string()),
                port: Some(5433),
                database: "books".to_string(),
                urlx: Some("sslmode=disable".to_string()),
                user: "sa".to_string(),
                password: Some("secret".to_string()),
            }
        );
    }

    #[test]
    fn connect_requires_server_and_user() {
        assert!(matches!(
            CommandParser::parse("connect -user sa"),
            Err(CommandError::MissingArgument(_))
        ));
        assert!(matches!(
            CommandParser::parse("connect -server sqlite"),
            Err(CommandError::MissingArgument(_))
        ));
    }

    #[test]
    fn parses_grep_with_bare_and_valued_booleans() {
        let command =
            CommandParser::parse("grep -grepcolumns t.*t -invert-match -only-matching true")
                .unwrap();
        assert_eq!(
            command,
            ShellCommand::Grep {
                columns: Some("t.*t".to_string()),
                parameters: None,
                definitions: None,
                invert_match: true,
                only_matching: true,
            }
        );
    }

    #[test]
    fn parses_load_catalog_info_level() {
        assert_eq!(
            CommandParser::parse("load-catalog -infolevel standard").unwrap(),
            ShellCommand::LoadCatalog {
                info_level: InfoLevel::Standard
            }
        );
        assert!(matches!(
            CommandParser::parse("load-catalog -infolevel everything"),
            Err(CommandError::InvalidSyntax(_))
        ));
        assert!(matches!(
            CommandParser::parse("load-catalog"),
            Err(CommandError::MissingArgument(_))
        ));
    }

    #[test]
    fn parses_execute_with_positional_command_and_aliases() {
        let command = CommandParser::parse("execute schema -o out.txt -fmt json").unwrap();
        assert_eq!(
            command,
            ShellCommand::Execute {
                command: "schema".to_string(),
                output_file: Some(PathBuf::from("out.txt")),
                output_format: Some(OutputFormat::Json),
            }
        );
        let command = CommandParser::parse("execute -command brief -outputfile x").unwrap();
        assert_eq!(
            command,
            ShellCommand::Execute {
                command: "brief".to_string(),
                output_file: Some(PathBuf::from("x")),
                output_format: None,
            }
        );
        assert!(matches!(
            CommandParser::parse("execute"),
            Err(CommandError::MissingArgument(_))
        ));
    }

    #[test]
    fn rejects_unknown_commands_and_flags() {
        assert!(matches!(
            CommandParser::parse("frobnicate"),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            CommandParser::parse("sort -sortindexes"),
            Err(CommandError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn every_shell_command_has_a_descriptor() {
        for descriptor in COMMANDS {
            assert!(!descriptor.help.is_empty());
            assert!(!descriptor.usage.is_empty());
        }
        assert_eq!(ShellCommand::Quit.category(), CommandCategory::System);
        assert_eq!(ShellCommand::IsLoaded.availability(), Availability::Always);
        assert_eq!(
            ShellCommand::LoadCatalog {
                info_level: InfoLevel::Standard
            }
            .availability(),
            Availability::Connected
        );
    }

    #[test]
    fn help_covers_every_category() {
        let help = help_text();
        for category in CommandCategory::iter() {
            assert!(help.contains(&format!("{} Commands", category)));
        }
    }

    #[tokio::test]
    async fn filter_commands_are_unavailable_when_disconnected() {
        let mut session = SessionState::new();
        let config = Config::default();
        for line in [
            "filter -noemptytables",
            "grep -grepcolumns .*",
            "limit -tables .*",
            "load-catalog -infolevel standard",
        ] {
            let command = CommandParser::parse(line).unwrap();
            let outcome = command.dispatch(&mut session, &config).await.unwrap();
            assert_eq!(
                outcome,
                CommandOutcome::Unavailable("there is no database connection".to_string()),
                "{line} should be gated"
            );
        }
    }

    #[tokio::test]
    async fn execute_is_unavailable_before_load() {
        let mut session = SessionState::new();
        let config = Config::default();
        let command = CommandParser::parse("execute schema").unwrap();
        let outcome = command.dispatch(&mut session, &config).await.unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Unavailable("there is no schema metadata loaded".to_string())
        );
    }

    #[tokio::test]
    async fn is_connected_is_always_available() {
        let mut session = SessionState::new();
        let config = Config::default();
        let command = CommandParser::parse("is-connected").unwrap();
        let outcome = command.dispatch(&mut session, &config).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Output("false".to_string()));
    }

    async fn run(line: &str, session: &mut SessionState, config: &Config) -> CommandOutcome {
        CommandParser::parse(line)
            .unwrap()
            .dispatch(session, config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("shop.db");
        let mut session = SessionState::new();
        let config = Config::default();

        let connect = format!(
            "connect -server sqlite -database {} -urlx mode=rwc -user sa",
            database.display()
        );
        let outcome = run(&connect, &mut session, &config).await;
        assert_eq!(
            outcome,
            CommandOutcome::Output("Connected to SQLite".to_string())
        );

        let pool = session.pool().unwrap();
        sqlx::query("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, \
             customer_id INTEGER REFERENCES customers(id))",
        )
        .execute(pool)
        .await
        .unwrap();

        assert_eq!(
            run("is-connected", &mut session, &config).await,
            CommandOutcome::Output("true".to_string())
        );
        assert_eq!(
            run("is-loaded", &mut session, &config).await,
            CommandOutcome::Output("false".to_string())
        );
        assert_eq!(
            run("load-catalog -infolevel standard", &mut session, &config).await,
            CommandOutcome::Output("Loaded catalog".to_string())
        );
        assert_eq!(
            run("is-loaded", &mut session, &config).await,
            CommandOutcome::Output("true".to_string())
        );
        assert_eq!(session.catalog().unwrap().tables.len(), 2);

        let out_file = dir.path().join("schema.dot");
        let execute = format!("execute schema -o {} -fmt dot", out_file.display());
        let outcome = run(&execute, &mut session, &config).await;
        assert_eq!(
            outcome,
            CommandOutcome::Output(format!("Output sent to {}", out_file.display()))
        );
        assert!(out_file.exists());

        assert_eq!(
            run("sweep", &mut session, &config).await,
            CommandOutcome::Output("Session swept".to_string())
        );
        assert_eq!(
            run("is-connected", &mut session, &config).await,
            CommandOutcome::Output("false".to_string())
        );
        assert_eq!(
            run("is-loaded", &mut session, &config).await,
            CommandOutcome::Output("false".to_string())
        );
    }

    #[tokio::test]
    async fn malformed_grep_pattern_reports_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("p.db");
        let mut session = SessionState::new();
        let config = Config::default();
        let connect = format!(
            "connect -server sqlite -database {} -urlx mode=rwc -user sa",
            database.display()
        );
        run(&connect, &mut session, &config).await;

        let command = CommandParser::parse("grep -grepcolumns [broken").unwrap();
        let result = command.dispatch(&mut session, &config).await;
        assert!(matches!(
            result,
            Err(CommandError::Session(SessionError::InvalidPattern(_)))
        ));
        // The failed command left the previous grep options untouched.
        assert!(!session.crawl_options().grep.is_active());
    }
}
