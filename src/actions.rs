use std::path::PathBuf;
use std::str::FromStr;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::process::{LaunchOptions, WindowBounds};

/// Actions that can be dispatched through the application
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Launch a new Rio window
    Launch(LaunchOptions),
    /// Print tracked Rio processes
    ListProcesses,
    /// Terminate a tracked process
    Kill(u32),
    /// Bring a process window to front
    Attach(u32),
    /// Create a new session
    CreateSession {
        name: String,
        profile: Option<String>,
    },
    /// Print all sessions
    ListSessions,
    /// Print one session
    ShowSession(String),
    /// Rename a session
    RenameSession { id: String, name: String },
    /// Delete a session
    DeleteSession(String),
    /// Launch a new window for a session
    RestoreSession(String),
    /// Focus a session window, restoring it if none is live
    AttachSession(String),
    /// Snapshot live windows into a session
    SaveSession(String),
    /// Start recording a session
    Record(String),
    /// Stop recording a session
    StopRecording(String),
    /// Print the active recording of a session
    RecordingStatus(String),
    /// Replay the newest recording of a session
    Play(String),
    /// Convert the newest recording of a session
    Export { id: String, format: String },
    /// Print all recordings on disk
    ListRecordings,
    /// Periodic reconciliation tick
    Rescan,
    /// An event was published on the bus
    Event(String, Value),
    /// An error occurred
    Error(String),
    /// Print the command list
    Help,
    /// Request to quit the application
    Quit,
}

pub const HELP: &str = "\
commands:
  launch [dir] [--profile id] [--x n] [--y n] [--width n] [--height n]
         [--cmd command args..]
  ps                      list Rio processes
  kill <pid>              terminate a Rio process
  attach <pid>            bring a Rio window to front
  new <name> [profile]    create a session
  sessions                list sessions
  show <id>               show a session
  rename <id> <name>      rename a session
  rm <id>                 delete a session
  restore <id>            launch a window for a session
  open <id>               focus or restore a session
  save <id>               store live windows in a session
  rec <id>                start recording a session
  stop <id>               stop recording a session
  recording <id>          show the active recording
  play <id>               replay the newest recording
  export <id> <gif|svg|txt>
  recordings              list recordings
  help
  quit";

fn one_arg(command: &str, args: &[&str]) -> Result<String, String> {
    match args {
        [arg] => Ok(arg.to_string()),
        _ => Err(format!("usage: {} <id>", command)),
    }
}

fn parse_pid(command: &str, args: &[&str]) -> Result<u32, String> {
    match args {
        [pid] => pid
            .parse()
            .map_err(|_| format!("{}: invalid pid '{}'", command, pid)),
        _ => Err(format!("usage: {} <pid>", command)),
    }
}

fn flag_value<T: FromStr>(flag: &str, value: Option<&&str>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("launch: {} needs a number", flag))?;
    value
        .parse()
        .map_err(|_| format!("launch: invalid {} value '{}'", flag, value))
}

fn parse_launch(args: &[&str]) -> Result<LaunchOptions, String> {
    let mut options = LaunchOptions::default();
    let mut bounds = WindowBounds::default();
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        match *arg {
            "--x" => bounds.x = Some(flag_value(arg, rest.next())?),
            "--y" => bounds.y = Some(flag_value(arg, rest.next())?),
            "--width" => bounds.width = Some(flag_value(arg, rest.next())?),
            "--height" => bounds.height = Some(flag_value(arg, rest.next())?),
            "--profile" => {
                let id = rest.next().ok_or("launch: --profile needs an id")?;
                options.profile_id = Some(id.to_string());
            }
            "--cmd" => {
                let command = rest.next().ok_or("launch: --cmd needs a command")?;
                options.command = Some(command.to_string());
                // Everything after the command belongs to it
                options.args = rest.by_ref().map(|a| a.to_string()).collect();
            }
            dir if options.working_directory.is_none() && !dir.starts_with("--") => {
                options.working_directory = Some(PathBuf::from(dir));
            }
            other => return Err(format!("launch: unexpected argument '{}'", other)),
        }
    }
    options.bounds = bounds;
    Ok(options)
}

impl Action {
    /// Whether handling this action hands stdin to a child process.
    pub fn takes_terminal(&self) -> bool {
        matches!(self, Action::Play(_))
    }

    /// Parse one line of user input.
    pub fn parse(line: &str) -> Result<Action, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = words.split_first() else {
            return Err("empty command".to_string());
        };

        let action = match *command {
            "launch" => Action::Launch(parse_launch(args)?),
            "ps" => Action::ListProcesses,
            "kill" => Action::Kill(parse_pid(command, args)?),
            "attach" => Action::Attach(parse_pid(command, args)?),
            "new" => match args {
                [name] => Action::CreateSession {
                    name: name.to_string(),
                    profile: None,
                },
                [name, profile] => Action::CreateSession {
                    name: name.to_string(),
                    profile: Some(profile.to_string()),
                },
                _ => return Err("usage: new <name> [profile]".to_string()),
            },
            "sessions" => Action::ListSessions,
            "show" => Action::ShowSession(one_arg(command, args)?),
            "rename" => match args {
                [id, name @ ..] if !name.is_empty() => Action::RenameSession {
                    id: id.to_string(),
                    name: name.join(" "),
                },
                _ => return Err("usage: rename <id> <name>".to_string()),
            },
            "rm" => Action::DeleteSession(one_arg(command, args)?),
            "restore" => Action::RestoreSession(one_arg(command, args)?),
            "open" => Action::AttachSession(one_arg(command, args)?),
            "save" => Action::SaveSession(one_arg(command, args)?),
            "rec" => Action::Record(one_arg(command, args)?),
            "stop" => Action::StopRecording(one_arg(command, args)?),
            "recording" => Action::RecordingStatus(one_arg(command, args)?),
            "play" => Action::Play(one_arg(command, args)?),
            "export" => match args {
                [id, format] => Action::Export {
                    id: id.to_string(),
                    format: format.to_string(),
                },
                _ => return Err("usage: export <id> <gif|svg|txt>".to_string()),
            },
            "recordings" => Action::ListRecordings,
            "help" | "?" => Action::Help,
            "quit" | "exit" | "q" => Action::Quit,
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(action)
    }
}

/// Forward parsed command lines until `quit` or end of input. After an
/// action that takes the terminal, reading pauses until `resume` fires so
/// the child gets every keystroke.
pub async fn read_commands<R>(
    reader: R,
    tx: UnboundedSender<Action>,
    mut resume: UnboundedReceiver<()>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let action = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => Action::parse(&line).unwrap_or_else(Action::Error),
            Ok(None) => Action::Quit,
            Err(e) => Action::Error(format!("stdin: {}", e)),
        };
        let quit = action == Action::Quit;
        let paused = action.takes_terminal();
        if tx.send(action).is_err() || quit {
            break;
        }
        if paused && resume.recv().await.is_none() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_launch_options() {
        let action = Action::parse("launch /srv --profile work --cmd htop -d 5").unwrap();
        let Action::Launch(options) = action else {
            panic!("expected launch");
        };
        assert_eq!(options.working_directory, Some(PathBuf::from("/srv")));
        assert_eq!(options.profile_id.as_deref(), Some("work"));
        assert_eq!(options.command.as_deref(), Some("htop"));
        assert_eq!(options.args, vec!["-d", "5"]);

        assert_eq!(
            Action::parse("launch").unwrap(),
            Action::Launch(LaunchOptions::default())
        );
        assert!(Action::parse("launch --profile").is_err());
    }

    #[test]
    fn test_parse_launch_bounds() {
        let Action::Launch(options) =
            Action::parse("launch --x -20 --y 40 --width 800 --height 600").unwrap()
        else {
            panic!("expected launch");
        };
        assert_eq!(
            options.bounds,
            WindowBounds {
                x: Some(-20),
                y: Some(40),
                width: Some(800),
                height: Some(600),
            }
        );
        assert_eq!(options.working_directory, None);

        assert!(Action::parse("launch --width").is_err());
        assert!(Action::parse("launch --width -5").unwrap_err().contains("--width"));
        assert!(Action::parse("launch --x left").is_err());
    }

    #[test]
    fn test_parse_pids() {
        assert_eq!(Action::parse("kill 42").unwrap(), Action::Kill(42));
        assert_eq!(Action::parse("attach 7").unwrap(), Action::Attach(7));
        assert!(Action::parse("kill abc").is_err());
        assert!(Action::parse("kill -5").is_err());
        assert!(Action::parse("kill").is_err());
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(
            Action::parse("new dev work").unwrap(),
            Action::CreateSession {
                name: "dev".into(),
                profile: Some("work".into())
            }
        );
        assert_eq!(
            Action::parse("rename abc my api").unwrap(),
            Action::RenameSession {
                id: "abc".into(),
                name: "my api".into()
            }
        );
        assert_eq!(
            Action::parse("open abc").unwrap(),
            Action::AttachSession("abc".into())
        );
        assert!(Action::parse("rm").is_err());
        assert!(Action::parse("rename abc").is_err());
    }

    #[test]
    fn test_parse_export() {
        assert_eq!(
            Action::parse("export abc svg").unwrap(),
            Action::Export {
                id: "abc".into(),
                format: "svg".into()
            }
        );
        assert!(Action::parse("export abc").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert!(Action::parse("   ").is_err());
        assert!(Action::parse("frobnicate").unwrap_err().contains("help"));
        assert_eq!(Action::parse(" quit ").unwrap(), Action::Quit);
    }

    #[tokio::test]
    async fn test_reader_waits_while_playback_owns_stdin() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (resume_tx, resume_rx) = mpsc::unbounded_channel();
        let input = BufReader::new(&b"play abc\n\nquit\nkill 1\n"[..]);
        let reader = tokio::spawn(read_commands(input, tx, resume_rx));

        assert_eq!(rx.recv().await, Some(Action::Play("abc".into())));
        // nothing is read while the player runs
        assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err());

        resume_tx.send(()).unwrap();
        assert_eq!(rx.recv().await, Some(Action::Quit));
        reader.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_reader_quits_on_end_of_input() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_resume_tx, resume_rx) = mpsc::unbounded_channel();
        read_commands(BufReader::new(&b"ps\nbogus\n"[..]), tx, resume_rx).await;

        assert_eq!(rx.recv().await, Some(Action::ListProcesses));
        assert!(matches!(rx.recv().await, Some(Action::Error(_))));
        assert_eq!(rx.recv().await, Some(Action::Quit));
    }
}
