//! Candidate selection
//!
//! The setup flow narrows network -> member -> peer node. Each step asks a
//! [`Selector`]: interactively on a terminal, or from preset ids when running
//! unattended.

use std::fmt;
use std::io::{BufRead, Write};
use thiserror::Error;

use crate::model::{Member, Network, Node};

/// What is being chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Network,
    Member,
    Peer,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Network => write!(f, "network"),
            CandidateKind::Member => write!(f, "member"),
            CandidateKind::Peer => write!(f, "peer"),
        }
    }
}

/// Something that can be offered for selection
pub trait Candidate {
    fn id(&self) -> &str;
    fn label(&self) -> String;
}

impl Candidate for Network {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} (Id: {})", self.name, self.id)
    }
}

impl Candidate for Member {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} (Id: {})", self.name, self.id)
    }
}

impl Candidate for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.id.clone()
    }
}

/// One entry of a selection menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no {kind} available to choose from")]
    NoCandidates { kind: CandidateKind },

    #[error("{kind} selection declined")]
    Declined { kind: CandidateKind },

    #[error("several {kind}s available, pick one of: {}", .candidates.join(", "))]
    Ambiguous {
        kind: CandidateKind,
        candidates: Vec<String>,
    },

    #[error("{kind} {id} not found, available: {}", .candidates.join(", "))]
    UnknownId {
        kind: CandidateKind,
        id: String,
        candidates: Vec<String>,
    },

    #[error("failed to read selection: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Selector {
    /// Return the index of the chosen entry; `choices` is never empty
    fn choose(&mut self, kind: CandidateKind, choices: &[Choice]) -> Result<usize, SelectError>;
}

/// Pick one of `candidates` through `selector`
pub fn select<T: Candidate>(
    selector: &mut dyn Selector,
    kind: CandidateKind,
    mut candidates: Vec<T>,
) -> Result<T, SelectError> {
    if candidates.is_empty() {
        return Err(SelectError::NoCandidates { kind });
    }

    let choices: Vec<Choice> = candidates
        .iter()
        .map(|c| Choice {
            id: c.id().to_string(),
            label: c.label(),
        })
        .collect();

    let index = selector.choose(kind, &choices)?;
    if index >= candidates.len() {
        return Err(SelectError::UnknownId {
            kind,
            id: index.to_string(),
            candidates: choices.into_iter().map(|c| c.id).collect(),
        });
    }
    Ok(candidates.swap_remove(index))
}

/// Non-interactive selection from ids given on the command line
#[derive(Debug, Clone, Default)]
pub struct PresetSelector {
    pub network_id: Option<String>,
    pub member_id: Option<String>,
    pub peer_id: Option<String>,
}

impl PresetSelector {
    fn wanted(&self, kind: CandidateKind) -> Option<&str> {
        match kind {
            CandidateKind::Network => self.network_id.as_deref(),
            CandidateKind::Member => self.member_id.as_deref(),
            CandidateKind::Peer => self.peer_id.as_deref(),
        }
    }
}

impl Selector for PresetSelector {
    fn choose(&mut self, kind: CandidateKind, choices: &[Choice]) -> Result<usize, SelectError> {
        let ids = || choices.iter().map(|c| c.id.clone()).collect::<Vec<_>>();

        match self.wanted(kind) {
            Some(id) => choices
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| SelectError::UnknownId {
                    kind,
                    id: id.to_string(),
                    candidates: ids(),
                }),
            None if choices.len() == 1 => Ok(0),
            None => Err(SelectError::Ambiguous {
                kind,
                candidates: ids(),
            }),
        }
    }
}

/// Numbered menu on a terminal
///
/// A single candidate is confirmed with y/n instead. Invalid input re-prompts.
pub struct TerminalSelector<R, W> {
    input: R,
    output: W,
}

impl TerminalSelector<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Next trimmed input line; `None` at end of input
    fn read_line(&mut self) -> Result<Option<String>, SelectError> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn confirm(&mut self, kind: CandidateKind, choice: &Choice) -> Result<usize, SelectError> {
        writeln!(
            self.output,
            "Only one {kind} to choose from. Would you like to use {kind}: {} [y/n]",
            choice.label
        )?;
        loop {
            match self.read_line()?.as_deref() {
                Some("y") | Some("yes") => return Ok(0),
                Some("n") | Some("no") | None => return Err(SelectError::Declined { kind }),
                Some(_) => writeln!(self.output, "Unexpected input. Please try again!")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Selector for TerminalSelector<R, W> {
    fn choose(&mut self, kind: CandidateKind, choices: &[Choice]) -> Result<usize, SelectError> {
        writeln!(self.output, "--------------------------------------------------------")?;
        writeln!(self.output, "{} selection:", capitalize(&kind.to_string()))?;
        writeln!(self.output, "--------------------------------------------------------")?;

        if let [only] = choices {
            return self.confirm(kind, only);
        }

        for (i, choice) in choices.iter().enumerate() {
            writeln!(self.output, "{}) {}", i + 1, choice.label)?;
        }
        writeln!(self.output, "\nSelect the {kind} to set up this environment for:")?;

        loop {
            let Some(line) = self.read_line()? else {
                return Err(SelectError::Declined { kind });
            };
            match line.parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => {
                    writeln!(self.output, "You have chosen {kind}: {}", choices[n - 1].label)?;
                    return Ok(n - 1);
                }
                _ => writeln!(self.output, "Invalid input. Please try again.")?,
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
