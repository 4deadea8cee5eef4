//! Line-oriented session shell. Every input line counts as keyboard activity for
//! the session monitor. A navigation requested by the app (forced or voluntary
//! logout) is handled like a page load: the app is bootstrapped again and the
//! one-shot logout notice, if any, is printed.

use crate::{
    app::{App, AppParts},
    auth::{ActivityEmitter, ActivityKind, Navigator},
    cli::commands::client::Options,
    config::ClientConfig,
    error::ApiError,
    features::AuditQuery,
    persist::{FileStorage, MemoryStorage, Storage},
};
use anyhow::{Context, Result};
use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

const HELP: &str = "\
commands:
  login <email> [password]   sign in (prompts for the password if omitted)
  logout                     sign out
  whoami                     show the signed-in user
  refresh                    refresh the session now
  users                      list users
  credentials                list credentials
  audit [limit] [page]       list audit log entries
  help                       show this help
  quit                       leave the shell";

#[derive(Debug)]
pub struct Args {
    pub options: Options,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    Empty,
    Login {
        email: String,
        password: Option<String>,
    },
    Logout,
    Whoami,
    Refresh,
    Users,
    Credentials,
    Audit(AuditQuery),
    Help,
    Quit,
}

impl ShellCommand {
    pub(crate) fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Self::Empty);
        };

        let parsed = match command.to_ascii_lowercase().as_str() {
            "login" => {
                let email = words
                    .next()
                    .ok_or_else(|| "usage: login <email> [password]".to_string())?;
                Self::Login {
                    email: email.to_string(),
                    password: words.next().map(str::to_string),
                }
            }
            "logout" => Self::Logout,
            "whoami" | "me" => Self::Whoami,
            "refresh" => Self::Refresh,
            "users" => Self::Users,
            "credentials" | "creds" => Self::Credentials,
            "audit" => {
                let mut number = |name: &str| -> Result<Option<u32>, String> {
                    words
                        .next()
                        .map(|raw| raw.parse::<u32>().map_err(|_| format!("invalid {name}: {raw}")))
                        .transpose()
                };
                let limit = number("limit")?;
                let page = number("page")?;
                Self::Audit(AuditQuery { limit, page })
            }
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };

        Ok(parsed)
    }
}

/// Records the navigation target; the shell loop acts on it between commands.
#[derive(Default)]
pub(crate) struct ShellNavigator {
    pending: Mutex<Option<String>>,
}

impl ShellNavigator {
    pub(crate) fn take(&self) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Navigator for ShellNavigator {
    fn navigate(&self, target: &str) {
        debug!(target, "navigation requested");
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(target.to_string());
    }
}

/// Runs the shell on stdin/stdout.
/// # Errors
/// Returns an error if the app cannot be bootstrapped or stdin fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = ClientConfig::with_overrides(args.options.runtime_config());
    let path = args.options.local_state_path();
    let local_storage: Arc<dyn Storage> = Arc::new(
        FileStorage::open(&path).with_context(|| format!("failed to open {}", path.display()))?,
    );
    let session_storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let navigator = Arc::new(ShellNavigator::default());
    let activity = Arc::new(ActivityEmitter::new());

    let build = || {
        App::bootstrap(AppParts {
            config: config.clone(),
            local_storage: local_storage.clone(),
            session_storage: session_storage.clone(),
            navigator: navigator.clone(),
            activity: activity.clone(),
        })
    };

    let mut app = build()?;
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    writeln!(stdout, "credvault {} ({})", env!("CARGO_PKG_VERSION"), config.api_base_url)?;
    print_session(&app, &mut stdout)?;

    loop {
        if let Some(target) = navigator.take() {
            info!(target = %target, "reloading after navigation");
            drop(app);
            app = build()?;
            if let Some(reason) = app.take_logout_notice(target.contains("expired=1")) {
                writeln!(stdout, "{}", reason.notice())?;
            }
        }

        write!(stdout, "credvault> ")?;
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        activity.emit(ActivityKind::KeyDown);

        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(stdout, "{message}")?;
                continue;
            }
        };

        let command = match command {
            ShellCommand::Login {
                email,
                password: None,
            } => {
                write!(stdout, "password: ")?;
                stdout.flush()?;
                let Some(password) = lines.next_line().await? else {
                    break;
                };
                activity.emit(ActivityKind::KeyDown);
                ShellCommand::Login {
                    email,
                    password: Some(password.trim_end().to_string()),
                }
            }
            ShellCommand::Quit => break,
            other => other,
        };

        run_command(&app, command, &mut stdout).await?;
    }

    app.session().monitor().stop();
    Ok(())
}

fn print_session<W: Write>(app: &App, out: &mut W) -> std::io::Result<()> {
    match app.session().user() {
        Some(user) => writeln!(out, "signed in as {} <{}>", user.name, user.email),
        None => writeln!(out, "signed out; use `login <email>`"),
    }
}

/// Executes one command against `app`, reporting API failures on `out`.
pub(crate) async fn run_command<W: Write>(
    app: &App,
    command: ShellCommand,
    out: &mut W,
) -> std::io::Result<()> {
    match command {
        ShellCommand::Empty | ShellCommand::Quit => Ok(()),
        ShellCommand::Help => writeln!(out, "{HELP}"),
        ShellCommand::Whoami => print_session(app, out),
        ShellCommand::Login { email, password } => {
            let password = password.unwrap_or_default();
            match app.session().login(&email, &password).await {
                Ok(user) => writeln!(out, "signed in as {} <{}>", user.name, user.email),
                Err(err) => report(out, &err),
            }
        }
        ShellCommand::Logout => {
            app.session().logout().await;
            writeln!(out, "signed out")
        }
        ShellCommand::Refresh => match app.session().monitor().refresh().await {
            Ok(()) => writeln!(out, "session refreshed"),
            Err(err) => report(out, &err),
        },
        ShellCommand::Users => match app.users().list().await {
            Ok(users) => {
                for user in &users {
                    writeln!(out, "{:<28} {:<32} {}", user.id, user.email, user.role)?;
                }
                writeln!(out, "{} user(s)", users.len())
            }
            Err(err) => report(out, &err),
        },
        ShellCommand::Credentials => match app.credentials().list().await {
            Ok(credentials) => {
                for credential in &credentials {
                    writeln!(
                        out,
                        "{:<28} {:<24} {}",
                        credential.id,
                        credential.name,
                        credential.username.as_deref().unwrap_or("-")
                    )?;
                }
                writeln!(out, "{} credential(s)", credentials.len())
            }
            Err(err) => report(out, &err),
        },
        ShellCommand::Audit(query) => match app.audit().list(query).await {
            Ok(logs) => {
                for log in &logs {
                    writeln!(
                        out,
                        "{:<26} {:<24} {}",
                        log.created_at.as_deref().unwrap_or("-"),
                        log.action,
                        log.actor.as_deref().unwrap_or("-")
                    )?;
                }
                writeln!(out, "{} entr(ies)", logs.len())
            }
            Err(err) => report(out, &err),
        },
    }
}

fn report<W: Write>(out: &mut W, err: &ApiError) -> std::io::Result<()> {
    match err {
        ApiError::SessionEnded(reason) => writeln!(out, "{}", reason.notice()),
        other => writeln!(out, "error: {other}"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::testing::{MockApi, Stack};
    use serde_json::json;

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(ShellCommand::parse("   "), Ok(ShellCommand::Empty));
        assert_eq!(
            ShellCommand::parse("login ada@example.com hunter2"),
            Ok(ShellCommand::Login {
                email: "ada@example.com".into(),
                password: Some("hunter2".into())
            })
        );
        assert_eq!(
            ShellCommand::parse("LOGIN ada@example.com"),
            Ok(ShellCommand::Login {
                email: "ada@example.com".into(),
                password: None
            })
        );
        assert_eq!(
            ShellCommand::parse("audit 10 2"),
            Ok(ShellCommand::Audit(AuditQuery {
                limit: Some(10),
                page: Some(2)
            }))
        );
        assert_eq!(ShellCommand::parse("exit"), Ok(ShellCommand::Quit));
        assert!(ShellCommand::parse("login").is_err());
        assert!(ShellCommand::parse("audit ten").is_err());
        assert!(ShellCommand::parse("rm -rf").is_err());
    }

    #[test]
    fn navigator_keeps_last_target_once() {
        let navigator = ShellNavigator::default();
        navigator.navigate("/login");
        navigator.navigate("/login?expired=1");
        assert_eq!(navigator.take().as_deref(), Some("/login?expired=1"));
        assert_eq!(navigator.take(), None);
    }

    #[tokio::test]
    async fn login_then_list_credentials() {
        let api = Arc::new(MockApi::authenticated());
        api.respond(
            "/auth/login",
            200,
            json!({"user": {"id": "u1", "name": "Ada", "email": "ada@example.com"}}),
        );
        api.respond(
            "/credentials",
            200,
            json!({"data": [{"id": "c1", "name": "github", "username": "ada"}]}),
        );
        let stack = Stack::new(api);
        let mut out = Vec::new();

        run_command(
            &stack.app,
            ShellCommand::parse("login ada@example.com pw").unwrap(),
            &mut out,
        )
        .await
        .unwrap();
        run_command(&stack.app, ShellCommand::Credentials, &mut out)
            .await
            .unwrap();
        run_command(&stack.app, ShellCommand::Whoami, &mut out)
            .await
            .unwrap();

        let text = output(out);
        assert!(text.contains("signed in as Ada <ada@example.com>"));
        assert!(text.contains("github"));
        assert!(text.contains("1 credential(s)"));
    }

    #[tokio::test]
    async fn ended_session_prints_notice() {
        let api = Arc::new(MockApi::expired());
        api.fail_refresh(
            401,
            json!({"code": "SESSION_EXPIRED", "message": "You have been logged in elsewhere"}),
        );
        let stack = Stack::new(api);
        let mut out = Vec::new();

        run_command(&stack.app, ShellCommand::Users, &mut out)
            .await
            .unwrap();

        assert!(output(out).contains("signed in elsewhere"));
        assert_eq!(stack.navigator.targets(), vec!["/login?expired=1".to_string()]);
    }
}
