//! sessionkv CLI
//!
//! Interactive shell over a snapshot file. Every change is written through
//! to the file before the prompt returns.

use clap::Parser;
use sessionkv::{FlushPolicy, Payload, SessionStore, SnapshotFile};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// sessionkv CLI - Interactive Snapshot Shell
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Snapshot file to open (created on first change)
    #[arg(short, long, default_value = "./data/sessions.json")]
    snapshot: PathBuf,
}

#[derive(Debug)]
enum Command {
    Create {
        token: String,
        ttl: Option<Duration>,
        payload: Payload,
    },
    Get {
        token: String,
    },
    Del {
        token: String,
    },
    List,
    Sweep,
}

fn main() -> anyhow::Result<()> {
    // Store warnings (e.g. failed write-through flushes) go to stderr
    fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("sessionkv=warn".parse()?))
        .init();

    let args = Args::parse();

    let file = Arc::new(SnapshotFile::new(&args.snapshot));
    let outcome = file.load();
    if outcome.is_corrupted() {
        eprintln!(
            "Warning: {} was unreadable and has been moved aside",
            args.snapshot.display()
        );
    }

    let store = SessionStore::builder()
        .with_persistence(file.clone(), FlushPolicy::WriteThrough)
        .build();
    store.restore(outcome.into_entries());
    file.mark_synced(store.generation());

    println!(
        "Opened {} ({} sessions). Type 'help' for available commands, 'quit' to exit.\n",
        args.snapshot.display(),
        store.len()
    );

    loop {
        print!("sessionkv> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        let result = parse_command(input).and_then(|cmd| execute(&store, &file, cmd));
        if let Err(e) = result {
            eprintln!("Error: {}", e);
        }
    }

    Ok(())
}

fn execute(store: &SessionStore, file: &SnapshotFile, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Create {
            token,
            ttl,
            payload,
        } => {
            store.create(token, payload, ttl);
            println!("OK");
        }

        Command::Get { token } => match store.fetch(&token) {
            Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            Err(e) => println!("(nil) {}", e),
        },

        Command::Del { token } => {
            let existed = store.delete(&token);
            println!("(integer) {}", if existed { 1 } else { 0 });
        }

        Command::List => {
            let rows = store.listing();
            if rows.is_empty() {
                println!("(empty)");
            }
            for row in rows {
                let remaining = row
                    .remaining_secs
                    .map(|s| format!("{}s", s))
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<36} {:<8} {:>10}  {}",
                    row.token,
                    row.status.to_string(),
                    remaining,
                    serde_json::Value::Object(row.payload)
                );
            }
        }

        Command::Sweep => {
            let outcome = store.sweep();
            if let Some(entries) = outcome.snapshot {
                if let Err(e) = file.flush_generation(outcome.generation, &entries) {
                    store.metrics().record_flush(false);
                    eprintln!("Warning: {} (in-memory state kept)", e);
                }
            }
            println!("(integer) {}", outcome.removed);
        }
    }

    Ok(())
}

fn parse_command(input: &str) -> anyhow::Result<Command> {
    let (cmd, rest) = next_word(input);
    let cmd = cmd.to_uppercase();

    match cmd.as_str() {
        "CREATE" => {
            let (token, rest) = next_word(rest);
            let (ttl, json) = next_word(rest);
            let json = json.trim();
            if token.is_empty() || ttl.is_empty() || json.is_empty() {
                anyhow::bail!("CREATE requires token, ttl and payload: CREATE <token> <ttl_seconds> <json>");
            }
            let ttl = ttl.parse::<u64>()?;
            let payload = match serde_json::from_str(json)? {
                serde_json::Value::Object(map) => map,
                _ => anyhow::bail!("Payload must be a JSON object"),
            };
            Ok(Command::Create {
                token: token.to_string(),
                ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
                payload,
            })
        }

        "GET" => match next_word(rest).0 {
            "" => anyhow::bail!("GET requires a token: GET <token>"),
            token => Ok(Command::Get {
                token: token.to_string(),
            }),
        },

        "DEL" => match next_word(rest).0 {
            "" => anyhow::bail!("DEL requires a token: DEL <token>"),
            token => Ok(Command::Del {
                token: token.to_string(),
            }),
        },

        "LIST" => Ok(Command::List),

        "SWEEP" => Ok(Command::Sweep),

        _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", cmd),
    }
}

/// Split off the first whitespace-delimited word, returning it and the rest
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  CREATE <token> <ttl> <json> - Create or replace a session (ttl 0 = never expires)
  GET <token>                 - Show the payload of a live session
  DEL <token>                 - Delete a session
  LIST                        - List sessions with remaining time and status
  SWEEP                       - Evict expired sessions now

  help                        - Show this help
  quit / exit                 - Exit the CLI

Examples:
  CREATE tok1 300 {{"user":"alice"}}
  CREATE tok2 0 {{"user":"bob"}}
  GET tok1
  LIST
  DEL tok1
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let cmd = parse_command("CREATE   tok1    300   {\"user\": \"alice\"}").unwrap();
        match cmd {
            Command::Create {
                token,
                ttl,
                payload,
            } => {
                assert_eq!(token, "tok1");
                assert_eq!(ttl, Some(Duration::from_secs(300)));
                assert_eq!(payload.get("user"), Some(&json!("alice")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(matches!(parse_command("get   tok1"), Ok(Command::Get { token }) if token == "tok1"));
        assert!(parse_command("DEL   ").is_err());
        assert!(parse_command("CREATE tok 0").is_err());
    }

    #[test]
    fn test_failed_sweep_flush_keeps_shell_running() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let clock = Arc::new(sessionkv::ManualClock::default());
        let file = Arc::new(SnapshotFile::new(blocker.join("sessions.json")));
        let store = SessionStore::builder()
            .with_clock(clock.clone())
            .with_persistence(file.clone(), FlushPolicy::WriteThrough)
            .build();
        store.create("short", Payload::new(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        assert!(execute(&store, &file, Command::Sweep).is_ok());
        assert!(store.is_empty());
        assert!(execute(&store, &file, Command::List).is_ok());
    }
}
