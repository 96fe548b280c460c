//! Human confirmation boundary.
//!
//! The confirmation loops in [`crate::confirm`] block on a [`Reviewer`] at
//! every decision point. Tests inject a [`ScriptedReviewer`]; the binary
//! uses [`TerminalReviewer`].
use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::detect::{Detection, Method, RecordingKind};
use crate::error::{ResyncError, Result};

/// A candidate shown to the reviewer.
#[derive(Debug, Clone, Copy)]
pub struct ReviewRequest<'a> {
    pub recording: RecordingKind,
    pub method: Method,
    pub detection: &'a Detection,
    /// Whole channel; render `detection.window`.
    pub channel: &'a [f64],
    pub sfreq: f64,
    /// `true` when this candidate is already the skip-adjusted retry.
    pub is_retry: bool,
}

impl ReviewRequest<'_> {
    /// Samples inside the review window.
    pub fn window_samples(&self) -> &[f64] {
        let end = self.detection.window.end.min(self.channel.len());
        let start = self.detection.window.start.min(end);
        &self.channel[start..end]
    }
}

/// Manual onset selection: every automatic option has been rejected.
#[derive(Debug, Clone, Copy)]
pub struct ManualRequest<'a> {
    pub recording: RecordingKind,
    pub channel: &'a [f64],
    pub sfreq: f64,
    /// Samples before this index were excluded by the reviewer.
    pub start_index: usize,
}

/// Every question returns a `Result`: a reviewer that can no longer answer
/// (closed input) must fail the search instead of answering for the human.
pub trait Reviewer {
    /// Is the candidate the true stimulation onset?
    fn confirm(&mut self, request: &ReviewRequest) -> Result<bool>;

    /// After a rejection: seconds to ignore at the beginning of the
    /// recording, or `None` to move on.
    fn skip_beginning(&mut self, request: &ReviewRequest) -> Result<Option<f64>>;

    /// Pick the onset sample directly. Must be `< request.channel.len()`;
    /// values outside `[request.start_index, len)` are clamped by the caller.
    fn select_onset(&mut self, request: &ManualRequest) -> Result<usize>;

    /// Progress message (method being tried, miss, fallback).
    fn notify(&mut self, _message: &str) {}
}

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Confirm(bool),
    Skip(Option<f64>),
    Onset(usize),
}

/// Deterministic reviewer replaying a FIFO of answers.
///
/// When the script runs dry the reviewer confirms, declines to skip and
/// selects the first allowed sample. Every question asked is recorded in
/// [`ScriptedReviewer::log`].
#[derive(Debug, Default, Clone)]
pub struct ScriptedReviewer {
    answers: VecDeque<Answer>,
    pub log: Vec<String>,
}

impl ScriptedReviewer {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self { answers: answers.into_iter().collect(), log: Vec::new() }
    }

    /// Reviewer that accepts every candidate.
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_matching<T>(&mut self, pick: impl Fn(&Answer) -> Option<T>) -> Option<T> {
        let front = self.answers.front()?;
        let value = pick(front)?;
        self.answers.pop_front();
        Some(value)
    }
}

impl Reviewer for ScriptedReviewer {
    fn confirm(&mut self, request: &ReviewRequest) -> Result<bool> {
        self.log.push(format!(
            "confirm {} {} @ {}",
            request.recording, request.method, request.detection.sample_index
        ));
        let answer = self.next_matching(|a| match a {
            Answer::Confirm(v) => Some(*v),
            _ => None,
        });
        Ok(answer.unwrap_or(true))
    }

    fn skip_beginning(&mut self, request: &ReviewRequest) -> Result<Option<f64>> {
        self.log.push(format!("skip {} {}", request.recording, request.method));
        let answer = self.next_matching(|a| match a {
            Answer::Skip(v) => Some(*v),
            _ => None,
        });
        Ok(answer.flatten())
    }

    fn select_onset(&mut self, request: &ManualRequest) -> Result<usize> {
        self.log.push(format!("manual {} from {}", request.recording, request.start_index));
        let answer = self.next_matching(|a| match a {
            Answer::Onset(v) => Some(*v),
            _ => None,
        });
        Ok(answer.unwrap_or(request.start_index))
    }

    fn notify(&mut self, message: &str) {
        self.log.push(message.to_string());
    }
}

/// Interactive reviewer on stdin/stdout.
///
/// Prints the candidate's time and the amplitude range of its review
/// window; answers are `y`/`n` and seconds. End of input before an answer
/// is an `AlignmentAmbiguity` error, never a default answer.
pub struct TerminalReviewer<R, W> {
    input: R,
    output: W,
}

impl TerminalReviewer<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self { input: std::io::stdin().lock(), output: std::io::stdout() }
    }
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        // a closed stdout only loses the prompt text
        let _ = write!(self.output, "{prompt}");
        let _ = self.output.flush();
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(ResyncError::AlignmentAmbiguity(format!(
                "review input closed before answering: {}",
                prompt.trim()
            )));
        }
        Ok(line.trim().to_string())
    }

    fn yes_no(&mut self, prompt: &str) -> Result<bool> {
        loop {
            match self.ask(&format!("{prompt} [y/n] "))?.as_str() {
                "y" | "Y" => return Ok(true),
                "n" | "N" => return Ok(false),
                _ => continue,
            }
        }
    }

    fn seconds(&mut self, prompt: &str) -> Result<f64> {
        loop {
            match self.ask(prompt)?.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => return Ok(v),
                _ => {
                    let _ = writeln!(self.output, "please enter a non-negative number of seconds");
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn confirm(&mut self, request: &ReviewRequest) -> Result<bool> {
        let window = request.window_samples();
        let (lo, hi) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let _ = writeln!(
            self.output,
            "{} candidate ({}): sample {} = {:.4} s, window [{:.3}, {:.3}] s, \
             range [{lo:.3e}, {hi:.3e}]{}",
            request.recording,
            request.method,
            request.detection.sample_index,
            request.detection.time,
            request.detection.window.start as f64 / request.sfreq,
            request.detection.window.end as f64 / request.sfreq,
            if request.detection.above_threshold { "" } else { " (best effort)" },
        );
        self.yes_no(&format!("Is the {} DBS artifact properly selected?", request.recording))
    }

    fn skip_beginning(&mut self, _request: &ReviewRequest) -> Result<Option<f64>> {
        if !self.yes_no("Do you want to skip the beginning of the recording?")? {
            return Ok(None);
        }
        self.seconds("How many seconds in the beginning should be ignored? ").map(Some)
    }

    fn select_onset(&mut self, request: &ManualRequest) -> Result<usize> {
        let first = request.start_index as f64 / request.sfreq;
        let last = request.channel.len().saturating_sub(1) as f64 / request.sfreq;
        let prompt = format!(
            "Select the {} artifact onset manually, in seconds [{first:.3}, {last:.3}]: ",
            request.recording
        );
        loop {
            let t = self.seconds(&prompt)?;
            if t >= first && t <= last {
                return Ok((t * request.sfreq).round() as usize);
            }
        }
    }

    fn notify(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }
}
