use std::path::PathBuf;

pub const HELP_TEXT: &str = "\
Type a message and press Enter to send it. Ctrl-C stops a streaming reply.

  /new                      start a new chat
  /chats [filter]           list chats
  /switch <id>              make a chat active
  /show                     print the active chat
  /rename <title>           rename the active chat
  /delete <id>              delete a chat
  /clear                    remove all messages from the active chat
  /system <text>            set the system prompt (empty to disable)
  /model <id>               set the model
  /key <key>                set the API key
  /dark [on|off]            set or toggle the dark theme flag
  /lang <tag>               set the speech language (empty resets)
  /autospeak [on|off]       set or toggle speaking replies aloud
  /settings                 show settings
  /attach <path>            attach a local file to the next message
  /detach                   drop staged attachments
  /projects [filter]        list projects
  /project new <name>       create a project
  /project switch <id>      make a project active
  /project rename <name>    rename the active project
  /project delete <id>      delete a project
  /files                    list files of the active project
  /file add <path>          add an empty file
  /file show <path>         print a file
  /file write <path> <text> replace a file's content
  /preview                  print the preview document
  /export <dir>             write the active project as a .tar.gz
  /help                     show this help
  /quit                     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    NewChat,
    Chats(Option<String>),
    SwitchChat(String),
    ShowChat,
    RenameChat(String),
    DeleteChat(String),
    ClearChat,
    System(String),
    Model(String),
    Key(String),
    /// `None` toggles.
    Dark(Option<bool>),
    SpeechLang(String),
    /// `None` toggles.
    AutoSpeak(Option<bool>),
    Settings,
    Attach(PathBuf),
    Detach,
    Projects(Option<String>),
    NewProject(String),
    SwitchProject(String),
    RenameProject(String),
    DeleteProject(String),
    Files,
    AddFile(String),
    ShowFile(String),
    WriteFile { path: String, content: String },
    Preview,
    Export(PathBuf),
    Help,
    Quit,
}

/// Split off the first whitespace-delimited word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}

fn required(value: &str, usage: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("Usage: {usage}"));
    }
    Ok(value.to_string())
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn flag(value: &str, usage: &str) -> Result<Option<bool>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "on" | "true" | "yes" | "1" => Ok(Some(true)),
        "off" | "false" | "no" | "0" => Ok(Some(false)),
        _ => Err(format!("Usage: {usage}")),
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, args) = split_word(rest);
    let command = match name {
        "new" => Command::NewChat,
        "chats" => Command::Chats(optional(args)),
        "switch" => Command::SwitchChat(required(args, "/switch <id>")?),
        "show" => Command::ShowChat,
        // Blank titles fall back to "Untitled" in the store.
        "rename" => Command::RenameChat(args.to_string()),
        "delete" => Command::DeleteChat(required(args, "/delete <id>")?),
        "clear" => Command::ClearChat,
        "system" => Command::System(args.to_string()),
        "model" => Command::Model(args.to_string()),
        "key" => Command::Key(args.to_string()),
        "dark" => Command::Dark(flag(args, "/dark [on|off]")?),
        "lang" => Command::SpeechLang(args.to_string()),
        "autospeak" => Command::AutoSpeak(flag(args, "/autospeak [on|off]")?),
        "settings" => Command::Settings,
        "attach" => Command::Attach(PathBuf::from(required(args, "/attach <path>")?)),
        "detach" => Command::Detach,
        "projects" => Command::Projects(optional(args)),
        "project" => parse_project(args)?,
        "files" => Command::Files,
        "file" => parse_file(args)?,
        "preview" => Command::Preview,
        "export" => Command::Export(PathBuf::from(required(args, "/export <dir>")?)),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command: /{other} (try /help)")),
    };
    Ok(Some(command))
}

fn parse_project(args: &str) -> Result<Command, String> {
    let (sub, rest) = split_word(args);
    match sub {
        "new" => Ok(Command::NewProject(rest.to_string())),
        "switch" => Ok(Command::SwitchProject(required(
            rest,
            "/project switch <id>",
        )?)),
        "rename" => Ok(Command::RenameProject(rest.to_string())),
        "delete" => Ok(Command::DeleteProject(required(
            rest,
            "/project delete <id>",
        )?)),
        _ => Err("Usage: /project new|switch|rename|delete ...".to_string()),
    }
}

fn parse_file(args: &str) -> Result<Command, String> {
    let (sub, rest) = split_word(args);
    match sub {
        "add" => Ok(Command::AddFile(required(rest, "/file add <path>")?)),
        "show" => Ok(Command::ShowFile(required(rest, "/file show <path>")?)),
        "write" => {
            let (path, content) = split_word(rest);
            let path = required(path, "/file write <path> <text>")?;
            Ok(Command::WriteFile {
                path,
                content: content.replace("\\n", "\n"),
            })
        }
        _ => Err("Usage: /file add|show|write ...".to_string()),
    }
}
