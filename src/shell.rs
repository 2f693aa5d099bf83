//! Interactive shell.
//!
//! Reads queries line by line from stdin, treating a `;`-terminated or
//! blank line as the end of a query, executes it and prints the result or
//! the error. Executed queries are appended to `~/.teql_history`, loaded on
//! startup and trimmed to the most recent entries on exit.

use crate::session::{QueryResult, Session};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const HISTORY_LIMIT: usize = 1000;

pub struct Shell {
    session: Session,
    history_path: Option<PathBuf>,
    history: Vec<String>,
}

impl Shell {
    pub fn new(session: Session) -> Shell {
        Shell {
            session,
            history_path: dirs::home_dir().map(|home| home.join(".teql_history")),
            history: Vec::new(),
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        self.load_history();
        let stdin = io::stdin();
        let mut buffer: Vec<String> = Vec::new();
        loop {
            let prompt = if buffer.is_empty() { "teql> " } else { "      " };
            print!("{prompt}");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                break;
            }
            let trimmed = line.trim_end();
            let complete = trimmed.ends_with(';') || trimmed.trim().is_empty();
            buffer.push(trimmed.to_string());
            if !complete {
                continue;
            }

            let query = buffer.join("\n");
            buffer.clear();
            if query.trim().is_empty() {
                continue;
            }
            self.history.push(query.replace('\n', " "));
            match self.session.execute_all(&query) {
                Ok(results) => {
                    for result in &results {
                        print_result(result);
                    }
                }
                // The shell survives failed queries
                Err(e) => println!("{e}"),
            }
        }
        self.save_history();
        Ok(())
    }

    fn load_history(&mut self) {
        let Some(path) = &self.history_path else {
            return;
        };
        if let Ok(content) = fs::read_to_string(path) {
            self.history = content.lines().map(str::to_string).collect();
        }
    }

    fn save_history(&self) {
        let Some(path) = &self.history_path else {
            return;
        };
        let start = self.history.len().saturating_sub(HISTORY_LIMIT);
        let content = self.history[start..].join("\n");
        if let Err(e) = fs::write(path, content + "\n") {
            tracing::warn!("could not write history file {}: {e}", path.display());
        }
    }
}

/// Print one query result to stdout.
pub fn print_result(result: &QueryResult) {
    match result {
        QueryResult::Select(stores) => {
            for store in stores {
                println!("{}", store.to_json());
            }
        }
        QueryResult::Show(items) => {
            for item in items {
                print!("{item}");
                if !item.ends_with('\n') {
                    println!();
                }
            }
        }
        QueryResult::Update(report) => {
            for file in &report.files {
                match &file.patch {
                    Some(patch) => print!("{patch}"),
                    None => {
                        println!("updated {}: {} operations", file.path.display(), file.opcodes)
                    }
                }
            }
        }
        QueryResult::Set | QueryResult::Use => {}
    }
}
