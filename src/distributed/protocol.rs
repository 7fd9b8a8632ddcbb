//! Line protocol between the master and its workers.
//!
//! One message per line, a single letter tag and tab separated fields:
//!
//! | direction | line | meaning |
//! |---|---|---|
//! | master -> worker | `N\t<count>` | node count, followed by `count` node lines |
//! | master -> worker | `E\t<element>` | one node of the shuffled ordering |
//! | master -> worker | `J\t<start>,<end>` | analyze rows `start..end` |
//! | master -> worker | `D` | no more work, drain and quit |
//! | worker -> master | `R` | nodes received, ready for work |
//! | worker -> master | `M` | job finished, send more |
//! | worker -> master | `T\t<pattern>\t<json>` | result batch for a pattern |
//! | worker -> master | `Q` | all results sent, exiting |

use crate::core::ElementId;
use crate::errors::{Error, Result};
use crate::results::ResultBatch;
use std::fmt;

pub const FIELD_DELIMITER: char = '\t';

/// Half-open range of node rows. Row `i` covers the pairs `(i, j)`, `j < i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobRange {
    pub start: usize,
    pub end: usize,
}

impl JobRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn pair_count(&self) -> u64 {
        (self.start..self.end).map(|i| i as u64).sum()
    }

    pub fn rows(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for JobRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MasterCommand {
    NodeCount(usize),
    Element(ElementId),
    Job(JobRange),
    Drain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Ready,
    MoreWork,
    Transfer { pattern: usize, batch: ResultBatch },
    Quit,
}

fn checked_field(field: &str) -> Result<&str> {
    if field.contains(FIELD_DELIMITER) || field.contains('\n') || field.contains('\r') {
        return Err(Error::protocol(format!(
            "field {:?} contains a delimiter or line break",
            field
        )));
    }
    Ok(field)
}

fn parse_number<T: std::str::FromStr>(field: &str, line: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| Error::protocol(format!("invalid number {:?} in line {:?}", field, line)))
}

impl MasterCommand {
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            MasterCommand::NodeCount(count) => format!("N\t{}", count),
            MasterCommand::Element(element) => format!("E\t{}", checked_field(element.as_str())?),
            MasterCommand::Job(range) => format!("J\t{},{}", range.start, range.end),
            MasterCommand::Drain => "D".to_string(),
        })
    }

    pub fn decode(line: &str) -> Result<Self> {
        let (tag, rest) = match line.split_once(FIELD_DELIMITER) {
            Some((tag, rest)) => (tag, Some(rest)),
            None => (line, None),
        };
        match (tag, rest) {
            ("N", Some(count)) => Ok(MasterCommand::NodeCount(parse_number(count, line)?)),
            ("E", Some(element)) if !element.is_empty() => {
                Ok(MasterCommand::Element(ElementId::from(element)))
            }
            ("J", Some(range)) => {
                let (start, end) = range.split_once(',').ok_or_else(|| {
                    Error::protocol(format!("invalid job range in line {:?}", line))
                })?;
                let range = JobRange::new(parse_number(start, line)?, parse_number(end, line)?);
                if range.start > range.end {
                    return Err(Error::protocol(format!("empty job range {}", range)));
                }
                Ok(MasterCommand::Job(range))
            }
            ("D", None) => Ok(MasterCommand::Drain),
            _ => Err(Error::protocol(format!("unexpected master line {:?}", line))),
        }
    }
}

impl WorkerMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            WorkerMessage::Ready => "R".to_string(),
            WorkerMessage::MoreWork => "M".to_string(),
            WorkerMessage::Transfer { pattern, batch } => {
                // serde_json escapes control characters inside strings
                let json = serde_json::to_string(batch)?;
                format!("T\t{}\t{}", pattern, checked_field(&json)?)
            }
            WorkerMessage::Quit => "Q".to_string(),
        })
    }

    pub fn decode(line: &str) -> Result<Self> {
        let mut fields = line.splitn(3, FIELD_DELIMITER);
        let tag = fields.next().unwrap_or_default();
        match (tag, fields.next(), fields.next()) {
            ("R", None, None) => Ok(WorkerMessage::Ready),
            ("M", None, None) => Ok(WorkerMessage::MoreWork),
            ("Q", None, None) => Ok(WorkerMessage::Quit),
            ("T", Some(pattern), Some(json)) => Ok(WorkerMessage::Transfer {
                pattern: parse_number(pattern, line)?,
                batch: serde_json::from_str(json).map_err(|e| {
                    Error::protocol(format!("invalid result batch for pattern {}: {}", pattern, e))
                })?,
            }),
            _ => Err(Error::protocol(format!(
                "unexpected worker line {:?}",
                truncate_for_log(line)
            ))),
        }
    }
}

fn truncate_for_log(line: &str) -> String {
    const LIMIT: usize = 120;
    match line.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{CandidatePayload, ScoredCandidate};

    #[test]
    fn test_master_commands() {
        let cases = [
            (MasterCommand::NodeCount(3), "N\t3"),
            (MasterCommand::Element("a/B.java/B".into()), "E\ta/B.java/B"),
            (MasterCommand::Job(JobRange::new(4, 9)), "J\t4,9"),
            (MasterCommand::Drain, "D"),
        ];
        for (command, line) in cases {
            assert_eq!(command.encode().unwrap(), line);
            assert_eq!(MasterCommand::decode(line).unwrap(), command);
        }
    }

    #[test]
    fn test_element_with_tab_is_rejected() {
        let err = MasterCommand::Element("a\tb".into()).encode().unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(MasterCommand::Element("a\nb".into()).encode().is_err());
    }

    #[test]
    fn test_transfer_batch() {
        let batch = ResultBatch {
            total_amount: 7,
            candidates: vec![ScoredCandidate::new(
                vec![0.5, -0.25],
                CandidatePayload {
                    first: "x/with\ttab".into(),
                    second: "y".into(),
                    coupling: vec![0.5],
                    support: 0.25,
                },
            )],
        };
        let message = WorkerMessage::Transfer { pattern: 2, batch };
        let line = message.encode().unwrap();
        assert!(line.starts_with("T\t2\t{"));
        assert_eq!(line.matches('\t').count(), 2);
        assert_eq!(WorkerMessage::decode(&line).unwrap(), message);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(WorkerMessage::decode("hello").is_err());
        assert!(WorkerMessage::decode("R\textra").is_err());
        assert!(WorkerMessage::decode("T\tx\t{}").is_err());
        assert!(WorkerMessage::decode("T\t0\tnot json").is_err());
        assert!(MasterCommand::decode("J\t5").is_err());
        assert!(MasterCommand::decode("J\t5,2").is_err());
        assert!(MasterCommand::decode("N\tmany").is_err());
    }

    #[test]
    fn test_job_pair_count() {
        assert_eq!(JobRange::new(0, 4).pair_count(), 6);
        assert_eq!(JobRange::new(2, 2).pair_count(), 0);
    }
}
