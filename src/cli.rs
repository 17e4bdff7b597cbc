//! Command-line interface and REPL
//!
//! The REPL drives the console knobs and injects window focus events, which
//! is enough to exercise every worker without hardware.

use crate::drivers::ConsoleConnector;
use crate::router::RouterHandle;
use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Turn { steps: i32, knob: Option<String> },
    Press { knob: Option<String> },
    View { name: String, knob: Option<String> },
    Focus { title: String, appname: String },
    Knobs,
    Help,
    Quit,
    Empty,
}

/// Parse one REPL line
pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());

    let cmd = match word {
        "" => ReplCommand::Empty,
        "+" => ReplCommand::Turn { steps: 1, knob: optional(rest) },
        "-" => ReplCommand::Turn { steps: -1, knob: optional(rest) },
        "turn" => {
            let (steps, knob) = match rest.split_once(char::is_whitespace) {
                Some((steps, knob)) => (steps, optional(knob.trim())),
                None => (rest, None),
            };
            let steps = steps
                .parse()
                .map_err(|_| anyhow::anyhow!("usage: turn <steps> [knob]"))?;
            ReplCommand::Turn { steps, knob }
        }
        "press" => ReplCommand::Press { knob: optional(rest) },
        "view" => {
            let mut parts = rest.split_whitespace();
            let name = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: view <name> [knob]"))?;
            ReplCommand::View {
                name: name.to_string(),
                knob: parts.next().map(str::to_string),
            }
        }
        "focus" => {
            let (title, appname) = rest.split_once('|').unwrap_or((rest, ""));
            ReplCommand::Focus {
                title: title.trim().to_string(),
                appname: appname.trim().to_string(),
            }
        }
        "knobs" => ReplCommand::Knobs,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => anyhow::bail!("unknown command '{}', try 'help'", other),
    };

    Ok(cmd)
}

pub struct Repl {
    router: RouterHandle,
    console: Arc<ConsoleConnector>,
}

impl Repl {
    pub fn new(router: RouterHandle, console: Arc<ConsoleConnector>) -> Self {
        Self { router, console }
    }

    /// Read and execute lines until `quit`, Ctrl-C or Ctrl-D
    ///
    /// Blocks the calling thread.
    pub fn run(&self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline("nobbler> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(ReplCommand::Quit) => break,
                        Ok(cmd) => self.execute(cmd),
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    pub fn execute(&self, cmd: ReplCommand) {
        match cmd {
            ReplCommand::Turn { steps, knob } => {
                for (_, console_knob) in self.targets(knob.as_deref()) {
                    console_knob.turn(steps);
                }
            }
            ReplCommand::Press { knob } => {
                for (_, console_knob) in self.targets(knob.as_deref()) {
                    console_knob.press();
                }
            }
            ReplCommand::View { name, knob } => self.router.set_view(name, knob),
            ReplCommand::Focus { title, appname } => self.router.window_focused(title, appname),
            ReplCommand::Knobs => {
                for (id, console_knob) in self.console.knobs() {
                    let state = console_knob.state();
                    println!(
                        "  {} {} position {} [{}..{}] presses {}",
                        id.bold(),
                        state.config.text.cyan(),
                        state.position,
                        state.config.min_position,
                        state.config.max_position,
                        state.press_nonce
                    );
                }
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit | ReplCommand::Empty => {}
        }
    }

    /// The named console knob, or all of them
    fn targets(&self, knob: Option<&str>) -> Vec<(String, Arc<crate::drivers::ConsoleKnob>)> {
        let knobs = self.console.knobs();
        match knob {
            Some(id) => {
                let selected: Vec<_> = knobs.into_iter().filter(|(k, _)| k == id).collect();
                if selected.is_empty() {
                    println!("{}", format!("no console knob '{}'", id).red());
                }
                selected
            }
            None => knobs,
        }
    }
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    println!("  turn <steps> [knob]     rotate console knobs by <steps> detents");
    println!("  + [knob] / - [knob]     rotate by one detent");
    println!("  press [knob]            press the button");
    println!("  view <name> [knob]      apply a view");
    println!("  focus <title> [| app]   report a focused window");
    println!("  knobs                   show console knob state");
    println!("  quit                    stop nobbler\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_turns() {
        assert_eq!(
            parse_command("turn -3").unwrap(),
            ReplCommand::Turn { steps: -3, knob: None }
        );
        assert_eq!(
            parse_command("turn 2 desk").unwrap(),
            ReplCommand::Turn { steps: 2, knob: Some("desk".to_string()) }
        );
        assert_eq!(
            parse_command("+").unwrap(),
            ReplCommand::Turn { steps: 1, knob: None }
        );
        assert!(parse_command("turn lots").is_err());
    }

    #[test]
    fn test_parse_focus_and_view() {
        assert_eq!(
            parse_command("focus Untitled - Notepad | notepad").unwrap(),
            ReplCommand::Focus {
                title: "Untitled - Notepad".to_string(),
                appname: "notepad".to_string()
            }
        );
        assert_eq!(
            parse_command("focus").unwrap(),
            ReplCommand::Focus { title: String::new(), appname: String::new() }
        );
        assert_eq!(
            parse_command("view brightness A").unwrap(),
            ReplCommand::View { name: "brightness".to_string(), knob: Some("A".to_string()) }
        );
        assert!(parse_command("view").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("   ").unwrap(), ReplCommand::Empty);
        assert_eq!(parse_command("exit").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command("press").unwrap(), ReplCommand::Press { knob: None });
        assert!(parse_command("dance").is_err());
    }

    #[tokio::test]
    async fn test_execute_forwards_to_router() {
        let (router, mut rx) = crate::router::channels();
        let repl = Repl::new(router, Arc::new(ConsoleConnector::new()));

        repl.execute(ReplCommand::View { name: "volume".to_string(), knob: None });
        repl.execute(ReplCommand::Focus { title: "Chrome".to_string(), appname: String::new() });

        assert_eq!(
            rx.knob_rx.try_recv().ok(),
            Some(crate::router::KnobMessage::ViewChange {
                view_name: "volume".to_string(),
                knob_id: None
            })
        );
        assert!(rx.trigger_rx.try_recv().is_ok());
    }
}
