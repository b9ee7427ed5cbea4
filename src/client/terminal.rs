use crate::client::LabClient;
use crate::protocol::{LabError, LabResult, LabSummary};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{stdout, Write};

const LOCAL_HELP: &str = "\
Lab commands:
  /hint             - Reveal the next hint
  /submit <flag>    - Submit a flag
  /objectives       - Show the lab objectives
  /solution         - Show the solution guide (reduces XP)
  /reset            - Start the lab over
  /exit             - Disconnect and exit

Everything else runs in the lab terminal. Type 'help' there for the
available commands.

Keys:
  Up/Down           - Navigate command history
  Left/Right        - Move cursor in input line
  Ctrl+C            - Exit
  Ctrl+D            - Exit (if input is empty)
";

/// Interactive line editor bound to one lab.
pub struct Terminal {
    client: LabClient,
    lab_id: String,
    lab: Option<LabSummary>,
    current_prompt: String,
    command_history: Vec<String>,
    history_index: usize,
    input_buffer: Vec<char>,
    cursor_position: usize,
}

impl Terminal {
    pub fn new(client: LabClient, lab_id: impl Into<String>) -> Self {
        Self {
            client,
            lab_id: lab_id.into(),
            lab: None,
            current_prompt: "$ ".to_string(),
            command_history: Vec::new(),
            history_index: 0,
            input_buffer: Vec::new(),
            cursor_position: 0,
        }
    }

    pub async fn run(&mut self) -> LabResult<()> {
        if !self.client.is_connected() {
            self.client.connect().await?;
        }

        let started = self.client.start_lab(&self.lab_id).await?;
        self.current_prompt = started.prompt.clone();

        terminal::enable_raw_mode().map_err(terminal_error)?;

        self.print_colored(&format!("{}\n", started.lab.title), Color::Cyan)?;
        if !started.lab.description.is_empty() {
            self.print_colored(&format!("{}\n", started.lab.description), Color::Grey)?;
        }
        self.print_status(started.message())?;
        self.print_colored("Type /help for lab commands, /exit to quit.\n\n", Color::Grey)?;
        self.lab = Some(started.lab);

        let result = self.terminal_loop().await;

        self.cleanup_terminal()?;
        if let Err(e) = self.client.disconnect().await {
            self.print_error(&format!("Disconnect error: {}", e))?;
        }

        result
    }

    async fn terminal_loop(&mut self) -> LabResult<()> {
        self.display_prompt()?;

        loop {
            match self.read_input()? {
                InputResult::Command(command) => {
                    if !command.trim().is_empty() {
                        self.command_history.push(command.clone());
                        self.history_index = self.command_history.len();

                        match self.handle_local_command(&command).await {
                            Ok(LocalOutcome::Exit) => break,
                            Ok(LocalOutcome::Handled) => {}
                            Ok(LocalOutcome::NotLocal) => self.execute_remote_command(&command).await?,
                            Err(e) => self.print_error(&e.to_string())?,
                        }
                    }
                    self.display_prompt()?;
                }
                InputResult::Exit => break,
                InputResult::Continue => self.display_prompt()?,
            }
        }

        Ok(())
    }

    async fn handle_local_command(&mut self, command: &str) -> LabResult<LocalOutcome> {
        let command = command.trim();
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));

        match name {
            "/exit" | "/quit" => {
                self.print_status("Goodbye!")?;
                Ok(LocalOutcome::Exit)
            }
            "/help" => {
                self.print_colored(LOCAL_HELP, Color::Cyan)?;
                Ok(LocalOutcome::Handled)
            }
            "/hint" => {
                let hint = self.client.request_hint(&self.lab_id).await?;
                self.print_colored(
                    &format!(
                        "Hint {}: {} ({} remaining)\n",
                        hint.hint_number, hint.hint_text, hint.hints_remaining
                    ),
                    Color::Yellow,
                )?;
                Ok(LocalOutcome::Handled)
            }
            "/submit" => {
                let verdict = self.client.submit_flag(&self.lab_id, rest).await?;
                if verdict.correct {
                    self.print_success(&verdict.message)?;
                    if verdict.xp_awarded > 0 {
                        self.print_success(&format!("+{} XP", verdict.xp_awarded))?;
                    }
                } else {
                    self.print_error(&verdict.message)?;
                }
                Ok(LocalOutcome::Handled)
            }
            "/objectives" => {
                let objectives = self.lab.as_ref().map(|lab| lab.objectives.clone()).unwrap_or_default();
                for (index, objective) in objectives.iter().enumerate() {
                    self.print_colored(&format!("  {}. {}\n", index + 1, objective), Color::Grey)?;
                }
                Ok(LocalOutcome::Handled)
            }
            "/solution" => {
                let view = self.client.view_solution(&self.lab_id).await?;
                self.print_colored(
                    &format!(
                        "Viewing the solution reduces this lab's reward from {} to {} XP ({}% penalty).\n\n{}\n",
                        view.original_xp, view.reduced_xp, view.penalty_percent, view.solution_guide
                    ),
                    Color::Magenta,
                )?;
                Ok(LocalOutcome::Handled)
            }
            "/reset" => {
                self.client.reset_lab(&self.lab_id).await?;
                let started = self.client.start_lab(&self.lab_id).await?;
                self.current_prompt = started.prompt;
                self.print_status("Lab reset.")?;
                Ok(LocalOutcome::Handled)
            }
            _ => Ok(LocalOutcome::NotLocal),
        }
    }

    async fn execute_remote_command(&mut self, command: &str) -> LabResult<()> {
        let outcome = match self.client.execute(&self.lab_id, command).await {
            Ok(outcome) => outcome,
            Err(e @ LabError::Remote { .. }) => return self.print_error(&e.to_string()),
            Err(e) => return Err(e),
        };

        if !outcome.output.is_empty() {
            let color = if outcome.is_error { Color::Red } else { Color::Reset };
            self.print_colored(&format!("{}\n", outcome.output), color)?;
        }

        for index in &outcome.objectives_completed {
            let description = self
                .lab
                .as_ref()
                .and_then(|lab| lab.objectives.get(*index).cloned())
                .unwrap_or_default();
            self.print_success(&format!("Objective {} complete: {}", index + 1, description))?;
        }

        if outcome.lab_completed {
            self.print_success("Lab complete!")?;
        }

        self.current_prompt = outcome.prompt;
        Ok(())
    }

    fn display_prompt(&self) -> LabResult<()> {
        let input: String = self.input_buffer.iter().collect();
        let column = self.current_prompt.chars().count() + self.cursor_position;

        execute!(
            stdout(),
            Print("\r"),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Green),
            Print(&self.current_prompt),
            ResetColor,
            Print(input),
            cursor::MoveToColumn(column as u16),
        )
        .map_err(terminal_error)?;

        stdout().flush().map_err(terminal_error)
    }

    fn read_input(&mut self) -> LabResult<InputResult> {
        loop {
            let Event::Key(KeyEvent {
                code, modifiers, kind, ..
            }) = event::read().map_err(terminal_error)?
            else {
                continue;
            };

            if kind == KeyEventKind::Release {
                continue;
            }

            match (code, modifiers) {
                (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Ok(InputResult::Exit),
                (KeyCode::Char('d'), KeyModifiers::CONTROL) => {
                    if self.input_buffer.is_empty() {
                        return Ok(InputResult::Exit);
                    }
                }
                (KeyCode::Enter, _) => {
                    self.write_raw("\r\n")?;
                    let command: String = self.input_buffer.drain(..).collect();
                    self.cursor_position = 0;
                    return Ok(InputResult::Command(command));
                }
                (KeyCode::Backspace, _) => {
                    if self.cursor_position > 0 {
                        self.input_buffer.remove(self.cursor_position - 1);
                        self.cursor_position -= 1;
                    }
                }
                (KeyCode::Delete, _) => {
                    if self.cursor_position < self.input_buffer.len() {
                        self.input_buffer.remove(self.cursor_position);
                    }
                }
                (KeyCode::Left, _) => {
                    self.cursor_position = self.cursor_position.saturating_sub(1);
                }
                (KeyCode::Right, _) => {
                    if self.cursor_position < self.input_buffer.len() {
                        self.cursor_position += 1;
                    }
                }
                (KeyCode::Up, _) => {
                    if self.history_index > 0 {
                        self.history_index -= 1;
                        self.load_history_entry();
                    }
                }
                (KeyCode::Down, _) => {
                    if self.history_index < self.command_history.len() {
                        self.history_index += 1;
                        self.load_history_entry();
                    }
                }
                (KeyCode::Char(c), _) => {
                    self.input_buffer.insert(self.cursor_position, c);
                    self.cursor_position += 1;
                }
                _ => {}
            }

            return Ok(InputResult::Continue);
        }
    }

    fn load_history_entry(&mut self) {
        self.input_buffer = self
            .command_history
            .get(self.history_index)
            .map(|cmd| cmd.chars().collect())
            .unwrap_or_default();
        self.cursor_position = self.input_buffer.len();
    }

    fn print_status(&self, message: &str) -> LabResult<()> {
        self.print_colored(&format!("[INFO] {}\n", message), Color::Yellow)
    }

    fn print_success(&self, message: &str) -> LabResult<()> {
        self.print_colored(&format!("[SUCCESS] {}\n", message), Color::Green)
    }

    fn print_error(&self, message: &str) -> LabResult<()> {
        self.print_colored(&format!("[ERROR] {}\n", message), Color::Red)
    }

    /// Raw mode does not translate `\n`, so every newline is sent as `\r\n`.
    fn print_colored(&self, message: &str, color: Color) -> LabResult<()> {
        execute!(
            stdout(),
            SetForegroundColor(color),
            Print(to_raw_newlines(message)),
            ResetColor
        )
        .map_err(terminal_error)
    }

    fn write_raw(&self, text: &str) -> LabResult<()> {
        execute!(stdout(), Print(text)).map_err(terminal_error)
    }

    fn cleanup_terminal(&self) -> LabResult<()> {
        terminal::disable_raw_mode().map_err(terminal_error)?;
        execute!(stdout(), ResetColor, cursor::Show).map_err(terminal_error)
    }
}

fn terminal_error(e: std::io::Error) -> LabError {
    LabError::Io(e)
}

fn to_raw_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[derive(Debug)]
enum InputResult {
    Command(String),
    Exit,
    Continue,
}

#[derive(Debug, PartialEq, Eq)]
enum LocalOutcome {
    Handled,
    NotLocal,
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_creation() {
        let terminal = Terminal::new(LabClient::new("127.0.0.1:4242", "7"), "intro-linux");
        assert_eq!(terminal.current_prompt, "$ ");
        assert_eq!(terminal.lab_id, "intro-linux");
        assert!(terminal.command_history.is_empty());
    }

    #[test]
    fn test_raw_newlines() {
        assert_eq!(to_raw_newlines("a\nb\r\nc"), "a\r\nb\r\nc");
    }

    #[tokio::test]
    async fn test_unknown_commands_go_remote() {
        let mut terminal = Terminal::new(LabClient::new("127.0.0.1:4242", "7"), "intro-linux");
        assert_eq!(terminal.handle_local_command("ls -la").await.unwrap(), LocalOutcome::NotLocal);
        assert_eq!(terminal.handle_local_command("help").await.unwrap(), LocalOutcome::NotLocal);
        assert_eq!(terminal.handle_local_command("/exit").await.unwrap(), LocalOutcome::Exit);
    }
}
