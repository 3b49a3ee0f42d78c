//! Line-editor oracle: the user answers the session at a prompt.
//!
//! ```text
//! faultline> 7 wrong-var sum
//! faultline> 4 correct
//! faultline> found
//! ```

use crate::colors::{Color, Palette};
use crate::error::CliError;
use crate::report::render_snapshot;
use faultline_core::{StepOrder, Trace};
use faultline_engine::{
    FeedbackKind, OracleLink, SessionEvent, SessionHandle, SessionOutcome, UserFeedback,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::str::FromStr;
use tracing::debug;

pub const HELP: &str = "\
  <step> correct           the step and everything it touched is right
  <step> wrong-path        the step should not have run
  <step> wrong-var <var>   the value of <var> read at the step is wrong
  <step> root              the step itself is the bug
  <step> unclear           no judgement
  found                    accept the proposed root cause
  stop                     end the session
  help                     show this list";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Feedback(StepOrder, UserFeedback),
    Found,
    Stop,
    Help,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["found" | "accept"] => return Ok(Command::Found),
        ["stop" | "quit" | "q"] => return Ok(Command::Stop),
        ["help" | "?"] => return Ok(Command::Help),
        _ => {}
    }
    let (step, kind, rest) = match words.as_slice() {
        [step, kind, rest @ ..] => (*step, *kind, rest),
        _ => return Err(format!("cannot parse '{}'; type help", line.trim())),
    };
    let step = step
        .trim_start_matches('#')
        .parse::<u32>()
        .map(StepOrder)
        .map_err(|_| format!("'{}' is not a step number", step))?;
    let kind = FeedbackKind::from_str(kind).map_err(|_| format!("unknown feedback '{}'", kind))?;
    let feedback = match (kind, rest) {
        (FeedbackKind::WrongVariableValue, [var]) => UserFeedback::wrong_var(*var),
        (FeedbackKind::WrongVariableValue, _) => {
            return Err("wrong-var takes exactly one variable".into())
        }
        (_, [_, ..]) => return Err(format!("{} takes no arguments", kind)),
        (FeedbackKind::Correct, []) => UserFeedback::Correct,
        (FeedbackKind::WrongPath, []) => UserFeedback::WrongPath,
        (FeedbackKind::RootCause, []) => UserFeedback::RootCause,
        (FeedbackKind::Unclear, []) => UserFeedback::Unclear,
    };
    Ok(Command::Feedback(step, feedback))
}

/// Where answers come from. `None` ends input.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, CliError>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, CliError> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Read commands until one reaches the session. Returns `false` once the
/// session can no longer be answered.
fn answer(
    link: &OracleLink,
    lines: &mut dyn LineSource,
    out: &mut dyn Write,
    palette: &Palette,
) -> Result<bool, CliError> {
    let prompt = palette.paint(Color::Green, "faultline> ");
    loop {
        let Some(line) = lines.read_line(&prompt)? else {
            link.stop();
            return Ok(false);
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Feedback(step, feedback)) => {
                debug!(%step, %feedback, "sending feedback");
                return Ok(link.send_feedback(step, feedback));
            }
            Ok(Command::Found) => return Ok(link.confirm_root_cause()),
            Ok(Command::Stop) => {
                link.stop();
                return Ok(false);
            }
            Ok(Command::Help) => {
                writeln!(out, "{}", HELP)?;
            }
            Err(message) => {
                writeln!(out, "{} {}", palette.paint(Color::Red, "error:"), message)?;
            }
        }
    }
}

/// Render session events to `out` and answer them from `lines` until the
/// session finishes.
pub fn drive(
    handle: SessionHandle,
    trace: &Trace,
    lines: &mut dyn LineSource,
    out: &mut dyn Write,
    palette: &Palette,
) -> Result<SessionOutcome, CliError> {
    let mut answering = true;
    while let Some(event) = handle.oracle().next_event() {
        let wants_answer = match &event {
            SessionEvent::PathProposed(snapshot) => {
                writeln!(
                    out,
                    "{} round {}",
                    palette.status("Proposed"),
                    snapshot.round
                )?;
                write!(out, "{}", render_snapshot(trace, snapshot, palette))?;
                true
            }
            SessionEvent::Query {
                step,
                proposal,
                snapshot,
            } => {
                writeln!(
                    out,
                    "{} step {} (proposed: {})",
                    palette.status("Query"),
                    step,
                    proposal
                )?;
                write!(out, "{}", render_snapshot(trace, snapshot, palette))?;
                true
            }
            SessionEvent::FeedbackRejected { step, reason } => {
                writeln!(
                    out,
                    "{} feedback on step {} rejected: {}",
                    palette.paint(Color::Yellow, "warning:"),
                    step,
                    reason
                )?;
                true
            }
            SessionEvent::OmissionReported(report) => {
                writeln!(out, "{} {}", palette.status("Omission"), report)?;
                false
            }
            SessionEvent::Finished(_) => break,
        };
        if wants_answer && answering {
            answering = answer(handle.oracle(), lines, out, palette)?;
        }
    }
    Ok(handle.join()?)
}

/// Run `handle` against a rustyline prompt on the terminal.
pub fn run_interactive(
    handle: SessionHandle,
    trace: &Trace,
    palette: &Palette,
) -> Result<SessionOutcome, CliError> {
    let mut editor = DefaultEditor::new()?;
    let mut stdout = std::io::stdout();
    writeln!(
        stdout,
        "{}",
        palette.paint(Color::Gray, "Answer with '<step> <feedback>'; type help for the list.")
    )?;
    drive(handle, trace, &mut editor, &mut stdout, palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{TraceStep, VariableValue};
    use faultline_engine::{Boundary, EngineConfig, Session};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>);

    impl LineSource for Scripted {
        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>, CliError> {
            Ok(self.0.pop_front().map(str::to_string))
        }
    }

    #[test]
    fn parses_feedback_commands() {
        assert_eq!(
            parse_command("7 wrong-var sum").unwrap(),
            Command::Feedback(StepOrder(7), UserFeedback::wrong_var("sum"))
        );
        assert_eq!(
            parse_command("#4 Correct").unwrap(),
            Command::Feedback(StepOrder(4), UserFeedback::Correct)
        );
        assert_eq!(
            parse_command("3 wrong-path").unwrap(),
            Command::Feedback(StepOrder(3), UserFeedback::WrongPath)
        );
        assert_eq!(
            parse_command("2 root").unwrap(),
            Command::Feedback(StepOrder(2), UserFeedback::RootCause)
        );
        assert_eq!(parse_command("  found ").unwrap(), Command::Found);
        assert_eq!(parse_command("quit").unwrap(), Command::Stop);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("seven correct").is_err());
        assert!(parse_command("7 maybe").is_err());
        assert!(parse_command("7 wrong-var").is_err());
        assert!(parse_command("7 correct x").is_err());
        assert!(parse_command("7").is_err());
    }

    /// 1: x = n       (reads n, writes x)
    /// 2: print(x)    (reads x)
    fn trace() -> Trace {
        Trace::from_steps(vec![
            TraceStep::new(1)
                .reading(VariableValue::new("n"))
                .writing(VariableValue::new("x")),
            TraceStep::new(2).reading(VariableValue::new("x")),
        ])
        .unwrap()
    }

    fn spawn() -> SessionHandle {
        Session::spawn(
            trace(),
            Boundary::new(StepOrder(2)).with_output_var("x"),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn typed_answers_reach_the_session() {
        let mut lines = Scripted(VecDeque::from(["help", "bogus", "", "found"]));
        let mut out = Vec::new();
        let outcome = drive(spawn(), &trace(), &mut lines, &mut out, &Palette::plain()).unwrap();
        assert_eq!(outcome, SessionOutcome::RootCause { step: StepOrder(1) });
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Proposed round 1"));
        assert!(text.contains("error: cannot parse 'bogus'"));
        assert!(text.contains("wrong-var <var>"));
    }

    #[test]
    fn end_of_input_stops_the_session() {
        let mut lines = Scripted(VecDeque::new());
        let mut out = Vec::new();
        let outcome = drive(spawn(), &trace(), &mut lines, &mut out, &Palette::plain()).unwrap();
        assert_eq!(outcome, SessionOutcome::Stopped);
    }

    struct ClosedTerminal;

    impl Write for ClosedTerminal {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn terminal_write_failure_is_reported() {
        let mut lines = Scripted(VecDeque::from(["found"]));
        let handle = spawn();
        let result = drive(handle, &trace(), &mut lines, &mut ClosedTerminal, &Palette::plain());
        assert!(matches!(result, Err(CliError::Output(_))));
    }

    #[test]
    fn rejected_feedback_prompts_again() {
        let mut lines = Scripted(VecDeque::from(["9 correct", "1 root"]));
        let mut out = Vec::new();
        let outcome = drive(spawn(), &trace(), &mut lines, &mut out, &Palette::plain()).unwrap();
        assert_eq!(outcome, SessionOutcome::RootCause { step: StepOrder(1) });
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("feedback on step 9 rejected"));
    }
}
